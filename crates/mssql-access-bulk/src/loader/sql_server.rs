//! SQL Server schema loader.

use async_trait::async_trait;
use tiberius::Row;
use tracing::{debug, info, warn};

use super::catalog::{
    build_database, build_single_table, CatalogSnapshot, ColumnRow, ForeignKeyColumnRow,
    ForeignKeyRow, IndexRow,
};
use super::SchemaLoader;
use crate::defaults::{DefaultValueContext, DefaultValueResolver};
use crate::drivers::{Connection, SqlServerConnection};
use crate::error::{BulkError, Result};
use crate::schema::{ColumnType, DatabaseSchema, SqlDbType, TableSchema};

// Tables are keyed by bare name, so every query reads the caller's default
// schema only. Unqualified names in bulk statements resolve to it as well.

const TABLES_QUERY: &str = r#"
    SELECT TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_TYPE = 'BASE TABLE'
      AND TABLE_SCHEMA = SCHEMA_NAME()
    ORDER BY TABLE_NAME
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT
        TABLE_NAME,
        COLUMN_NAME,
        DATA_TYPE,
        IS_NULLABLE,
        CAST(CHARACTER_MAXIMUM_LENGTH AS int) AS CharLength,
        CAST(NUMERIC_PRECISION AS int) AS NumericPrecision,
        CAST(NUMERIC_SCALE AS int) AS NumericScale,
        CAST(DATETIME_PRECISION AS int) AS DateTimePrecision,
        COLUMN_DEFAULT,
        CAST(CASE
            WHEN COLUMNPROPERTY(OBJECT_ID(QUOTENAME(TABLE_SCHEMA) + '.' + QUOTENAME(TABLE_NAME)), COLUMN_NAME, 'IsIdentity') = 1 THEN 1
            WHEN COLUMNPROPERTY(OBJECT_ID(QUOTENAME(TABLE_SCHEMA) + '.' + QUOTENAME(TABLE_NAME)), COLUMN_NAME, 'IsComputed') = 1 THEN 1
            WHEN DATA_TYPE IN ('timestamp', 'rowversion') THEN 1
            ELSE 0
        END AS bit) AS IsReadOnly
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = SCHEMA_NAME()
    ORDER BY TABLE_NAME, ORDINAL_POSITION
"#;

const INDEXES_QUERY: &str = r#"
    SELECT
        t.name AS TableName,
        i.name AS IndexName,
        c.name AS ColumnName,
        CAST(ic.key_ordinal AS int) AS KeyOrdinal,
        i.is_primary_key AS IsPrimaryKey,
        i.is_unique AS IsUnique,
        i.is_unique_constraint AS IsUniqueConstraint,
        CAST(i.type AS int) AS IndexType,
        ic.is_descending_key AS IsDescending
    FROM sys.indexes i
    INNER JOIN sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id
    INNER JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
    INNER JOIN sys.tables t ON i.object_id = t.object_id
    WHERE i.name IS NOT NULL
      AND ic.key_ordinal > 0
      AND t.is_ms_shipped = 0
      AND t.schema_id = SCHEMA_ID()
    ORDER BY t.name, i.name, ic.key_ordinal
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        fk.object_id AS ForeignKeyId,
        fk.name AS ForeignKeyName,
        OBJECT_NAME(fk.parent_object_id) AS ChildTable,
        OBJECT_NAME(fk.referenced_object_id) AS ParentTable,
        fk.delete_referential_action_desc AS DeleteRule,
        fk.update_referential_action_desc AS UpdateRule
    FROM sys.foreign_keys fk
    WHERE OBJECT_SCHEMA_NAME(fk.parent_object_id) = SCHEMA_NAME()
      AND OBJECT_SCHEMA_NAME(fk.referenced_object_id) = SCHEMA_NAME()
    ORDER BY fk.object_id
"#;

const FOREIGN_KEY_COLUMNS_QUERY: &str = r#"
    SELECT
        fkc.constraint_object_id AS ForeignKeyId,
        cc.name AS ChildColumn,
        pc.name AS ParentColumn
    FROM sys.foreign_key_columns fkc
    INNER JOIN sys.foreign_keys fk ON fkc.constraint_object_id = fk.object_id
    INNER JOIN sys.columns cc
        ON fkc.parent_object_id = cc.object_id AND fkc.parent_column_id = cc.column_id
    INNER JOIN sys.columns pc
        ON fkc.referenced_object_id = pc.object_id AND fkc.referenced_column_id = pc.column_id
    WHERE OBJECT_SCHEMA_NAME(fk.parent_object_id) = SCHEMA_NAME()
      AND OBJECT_SCHEMA_NAME(fk.referenced_object_id) = SCHEMA_NAME()
    ORDER BY fkc.constraint_object_id, fkc.constraint_column_id
"#;

/// `sys.indexes.type` value for a clustered index.
const CLUSTERED_INDEX_TYPE: i32 = 1;

/// Loads SQL Server schemas from the catalog views.
#[derive(Debug, Clone, Default)]
pub struct SqlServerSchemaLoader {
    defaults: DefaultValueResolver,
}

impl SqlServerSchemaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a hook that may override parsed column defaults.
    pub fn with_default_value_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DefaultValueContext<'_>) -> Option<crate::core::SqlValue<'static>>
            + Send
            + Sync
            + 'static,
    {
        self.defaults = self.defaults.with_hook(hook);
        self
    }

    pub fn defaults(&self) -> &DefaultValueResolver {
        &self.defaults
    }

    fn connection<'c>(&self, connection: Connection<'c>) -> Result<&'c mut SqlServerConnection> {
        match connection {
            Connection::SqlServer(conn) => Ok(conn),
            other => Err(BulkError::unsupported_connection(
                self.name(),
                other.type_name(),
            )),
        }
    }
}

#[async_trait]
impl SchemaLoader for SqlServerSchemaLoader {
    fn name(&self) -> &'static str {
        "SqlServerSchemaLoader"
    }

    fn supports_connection(&self, connection: &Connection<'_>) -> bool {
        matches!(connection, Connection::SqlServer(_))
    }

    async fn load_schema(&self, connection: Connection<'_>) -> Result<DatabaseSchema> {
        let conn = self.connection(connection)?;
        let database = conn
            .database()
            .ok_or(BulkError::MissingConnectionAttribute("Initial Catalog"))?
            .to_string();

        let mut session = Session::acquire(conn).await?;
        let snapshot = read_snapshot(session.connection()).await;
        session.release().await;
        let snapshot = snapshot?;

        let schema = build_database(&database, &snapshot, &self.defaults)?;
        info!(
            "Loaded SQL Server schema {} ({} tables)",
            schema.name(),
            schema.tables().len()
        );
        Ok(schema)
    }

    async fn load_table_schema(
        &self,
        connection: Connection<'_>,
        table_name: &str,
    ) -> Result<Option<TableSchema>> {
        crate::error::require_name("table_name", table_name)?;
        let conn = self.connection(connection)?;

        let mut session = Session::acquire(conn).await?;
        let columns = read_columns(session.connection()).await;
        session.release().await;

        build_single_table(table_name, &columns?, &self.defaults)
    }
}

/// Connection used for catalog reads: a private clone when it opens, otherwise
/// the caller's connection.
enum Session<'c> {
    Cloned(SqlServerConnection),
    Borrowed {
        conn: &'c mut SqlServerConnection,
        close_after: bool,
    },
}

impl<'c> Session<'c> {
    async fn acquire(conn: &'c mut SqlServerConnection) -> Result<Session<'c>> {
        let mut clone = conn.try_clone()?;
        match clone.open().await {
            Ok(()) => Ok(Session::Cloned(clone)),
            Err(e) => {
                warn!(
                    "Could not open a separate connection to {} ({}), reading the catalog through the caller's connection",
                    conn.data_source(),
                    e
                );
                let close_after = !conn.is_open();
                conn.open().await?;
                Ok(Session::Borrowed { conn, close_after })
            }
        }
    }

    fn connection(&mut self) -> &mut SqlServerConnection {
        match self {
            Session::Cloned(conn) => conn,
            Session::Borrowed { conn, .. } => &mut **conn,
        }
    }

    async fn release(self) {
        let result = match self {
            Session::Cloned(mut conn) => conn.close().await,
            Session::Borrowed {
                conn,
                close_after: true,
            } => conn.close().await,
            Session::Borrowed { .. } => Ok(()),
        };
        if let Err(e) = result {
            debug!("Error closing catalog connection: {}", e);
        }
    }
}

async fn read_snapshot(conn: &mut SqlServerConnection) -> Result<CatalogSnapshot> {
    let tables = conn
        .query(TABLES_QUERY)
        .await?
        .iter()
        .map(|row| text(row, "TABLE_NAME"))
        .collect::<Result<Vec<_>>>()?;
    let columns = read_columns(conn).await?;
    let indexes = conn
        .query(INDEXES_QUERY)
        .await?
        .iter()
        .map(index_row)
        .collect::<Result<Vec<_>>>()?;
    let foreign_keys = conn
        .query(FOREIGN_KEYS_QUERY)
        .await?
        .iter()
        .map(foreign_key_row)
        .collect::<Result<Vec<_>>>()?;
    let foreign_key_columns = conn
        .query(FOREIGN_KEY_COLUMNS_QUERY)
        .await?
        .iter()
        .map(foreign_key_column_row)
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "SQL Server catalog: {} tables, {} columns, {} index columns, {} foreign keys",
        tables.len(),
        columns.len(),
        indexes.len(),
        foreign_keys.len()
    );

    Ok(CatalogSnapshot {
        tables,
        columns,
        indexes,
        foreign_keys,
        foreign_key_columns,
    })
}

async fn read_columns(conn: &mut SqlServerConnection) -> Result<Vec<ColumnRow>> {
    conn.query(COLUMNS_QUERY)
        .await?
        .iter()
        .map(column_row)
        .collect()
}

fn text(row: &Row, col: &str) -> Result<String> {
    Ok(row.try_get::<&str, _>(col)?.unwrap_or_default().to_string())
}

fn int(row: &Row, col: &str) -> Result<Option<i64>> {
    Ok(row.try_get::<i32, _>(col)?.map(i64::from))
}

fn flag(row: &Row, col: &str) -> Result<bool> {
    Ok(row.try_get::<bool, _>(col)?.unwrap_or(false))
}

/// Map an `INFORMATION_SCHEMA` data type name, falling back to `sql_variant`.
pub(crate) fn column_type_of(type_name: &str) -> ColumnType {
    ColumnType::SqlServer(SqlDbType::from_type_name(type_name).unwrap_or_else(|| {
        warn!("Unknown SQL Server type '{}', treating as sql_variant", type_name);
        SqlDbType::Variant
    }))
}

fn column_row(row: &Row) -> Result<ColumnRow> {
    let type_name = text(row, "DATA_TYPE")?;
    Ok(ColumnRow {
        table: text(row, "TABLE_NAME")?,
        name: text(row, "COLUMN_NAME")?,
        column_type: column_type_of(&type_name),
        nullable: text(row, "IS_NULLABLE")?.eq_ignore_ascii_case("YES"),
        size: int(row, "CharLength")?.or(int(row, "DateTimePrecision")?),
        precision: int(row, "NumericPrecision")?,
        scale: int(row, "NumericScale")?,
        read_only: flag(row, "IsReadOnly")?,
        default: row.try_get::<&str, _>("COLUMN_DEFAULT")?.map(str::to_string),
    })
}

fn index_row(row: &Row) -> Result<IndexRow> {
    Ok(IndexRow {
        table: text(row, "TableName")?,
        index: text(row, "IndexName")?,
        column: text(row, "ColumnName")?,
        is_primary_key: flag(row, "IsPrimaryKey")?,
        is_unique: flag(row, "IsUnique")?,
        is_unique_constraint: flag(row, "IsUniqueConstraint")?,
        clustered: int(row, "IndexType")? == Some(i64::from(CLUSTERED_INDEX_TYPE)),
        descending: flag(row, "IsDescending")?,
    })
}

fn foreign_key_row(row: &Row) -> Result<ForeignKeyRow> {
    Ok(ForeignKeyRow {
        id: int(row, "ForeignKeyId")?.unwrap_or_default(),
        name: text(row, "ForeignKeyName")?,
        child_table: text(row, "ChildTable")?,
        parent_table: text(row, "ParentTable")?,
        delete_rule: text(row, "DeleteRule")?,
        update_rule: text(row, "UpdateRule")?,
    })
}

fn foreign_key_column_row(row: &Row) -> Result<ForeignKeyColumnRow> {
    Ok(ForeignKeyColumnRow {
        id: int(row, "ForeignKeyId")?.unwrap_or_default(),
        child_column: text(row, "ChildColumn")?,
        parent_column: text(row, "ParentColumn")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MsAccessConnection;

    #[test]
    fn test_supports_only_sql_server() {
        let loader = SqlServerSchemaLoader::new();
        let mut sql = SqlServerConnection::new("Server=db01;Database=Sales").unwrap();
        let mut access = MsAccessConnection::from_path("/data/a.accdb").unwrap();

        assert!(loader.supports_connection(&Connection::from(&mut sql)));
        assert!(!loader.supports_connection(&Connection::from(&mut access)));
        let err = loader
            .check_connection(&Connection::from(&mut access))
            .unwrap_err();
        assert!(matches!(err, BulkError::UnsupportedConnection { .. }));
    }

    #[test]
    fn test_catalog_reads_default_schema_only() {
        assert!(TABLES_QUERY.contains("TABLE_SCHEMA = SCHEMA_NAME()"));
        assert!(COLUMNS_QUERY.contains("TABLE_SCHEMA = SCHEMA_NAME()"));
        assert!(INDEXES_QUERY.contains("t.schema_id = SCHEMA_ID()"));
        for query in [FOREIGN_KEYS_QUERY, FOREIGN_KEY_COLUMNS_QUERY] {
            assert!(query.contains("OBJECT_SCHEMA_NAME(fk.parent_object_id) = SCHEMA_NAME()"));
            assert!(query.contains("OBJECT_SCHEMA_NAME(fk.referenced_object_id) = SCHEMA_NAME()"));
        }
    }

    #[test]
    fn test_unknown_type_is_variant() {
        assert_eq!(
            column_type_of("geography"),
            ColumnType::SqlServer(SqlDbType::Variant)
        );
        assert_eq!(
            column_type_of("nvarchar"),
            ColumnType::SqlServer(SqlDbType::NVarChar)
        );
    }

    #[tokio::test]
    async fn test_missing_database_attribute() {
        let loader = SqlServerSchemaLoader::new();
        let mut conn = SqlServerConnection::new("Server=db01;User Id=sa;Password=x").unwrap();
        let err = loader.load_schema(Connection::from(&mut conn)).await.unwrap_err();
        assert!(matches!(
            err,
            BulkError::MissingConnectionAttribute("Initial Catalog")
        ));
    }

    #[tokio::test]
    async fn test_wrong_connection_rejected() {
        let loader = SqlServerSchemaLoader::new();
        let mut access = MsAccessConnection::from_path("/data/a.accdb").unwrap();
        let err = loader
            .load_table_schema(Connection::from(&mut access), "Orders")
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::UnsupportedConnection { .. }));
    }
}
