//! Microsoft Access schema loader.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::catalog::{build_database, build_single_table, CatalogSnapshot, ColumnRow, IndexRow};
use super::SchemaLoader;
use crate::defaults::{DefaultValueContext, DefaultValueResolver};
use crate::drivers::{Connection, MsAccessConnection};
use crate::error::{BulkError, Result};
use crate::schema::{name_key, names_eq, ColumnType, DatabaseSchema, OleDbType, TableSchema};

// Result set positions (0-based) of the ODBC catalog functions.
const TABLES_TABLE_NAME: usize = 2;

const COLUMNS_TABLE_NAME: usize = 2;
const COLUMNS_COLUMN_NAME: usize = 3;
const COLUMNS_TYPE_NAME: usize = 5;
const COLUMNS_COLUMN_SIZE: usize = 6;
const COLUMNS_DECIMAL_DIGITS: usize = 8;
const COLUMNS_NULLABLE: usize = 10;
const COLUMNS_COLUMN_DEF: usize = 12;
const COLUMNS_ORDINAL_POSITION: usize = 16;

const PK_NAME: usize = 5;

const STAT_TABLE_NAME: usize = 2;
const STAT_NON_UNIQUE: usize = 3;
const STAT_INDEX_NAME: usize = 5;
const STAT_TYPE: usize = 6;
const STAT_ORDINAL_POSITION: usize = 7;
const STAT_COLUMN_NAME: usize = 8;
const STAT_ASC_OR_DESC: usize = 9;

/// `SQLStatistics` TYPE of the per-table cardinality row.
const SQL_TABLE_STAT: i64 = 0;

/// Name Access gives a table's primary key index.
const PRIMARY_KEY_INDEX: &str = "PrimaryKey";

/// Loads Access schemas through the ODBC catalog functions.
///
/// Indexes come from `SQLStatistics`. The Access driver does not implement
/// `SQLPrimaryKeys`, so the primary key is the index Access names
/// `PrimaryKey` unless the driver reports another name. Foreign keys are not
/// exposed by the driver and are not loaded.
#[derive(Debug, Clone, Default)]
pub struct MsAccessSchemaLoader {
    defaults: DefaultValueResolver,
}

impl MsAccessSchemaLoader {
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

    fn connection<'c>(&self, connection: Connection<'c>) -> Result<&'c mut MsAccessConnection> {
        match connection {
            Connection::MsAccess(conn) => Ok(conn),
            other => Err(BulkError::unsupported_connection(
                self.name(),
                other.type_name(),
            )),
        }
    }
}

#[async_trait]
impl SchemaLoader for MsAccessSchemaLoader {
    fn name(&self) -> &'static str {
        "MsAccessSchemaLoader"
    }

    fn supports_connection(&self, connection: &Connection<'_>) -> bool {
        matches!(connection, Connection::MsAccess(_))
    }

    async fn load_schema(&self, connection: Connection<'_>) -> Result<DatabaseSchema> {
        let conn = self.connection(connection)?;
        let database = database_name(conn);

        let mut session = Session::acquire(conn)?;
        let snapshot = read_snapshot(session.connection());
        session.release();
        let snapshot = snapshot?;

        let schema = build_database(&database, &snapshot, &self.defaults)?;
        info!(
            "Loaded Access schema {} ({} tables)",
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

        let mut session = Session::acquire(conn)?;
        let columns = session
            .connection()
            .catalog_columns(Some(table_name))
            .map(|rows| column_rows(&rows));
        session.release();

        build_single_table(table_name, &columns?, &self.defaults)
    }
}

/// Database name of an Access connection: the file stem.
fn database_name(conn: &MsAccessConnection) -> String {
    conn.database_path()
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| conn.database_path().display().to_string())
}

/// Connection used for catalog reads: a private clone when it opens, otherwise
/// the caller's connection.
enum Session<'c> {
    Cloned(MsAccessConnection),
    Borrowed {
        conn: &'c mut MsAccessConnection,
        close_after: bool,
    },
}

impl<'c> Session<'c> {
    fn acquire(conn: &'c mut MsAccessConnection) -> Result<Session<'c>> {
        let mut clone = conn.try_clone()?;
        match clone.open() {
            Ok(()) => Ok(Session::Cloned(clone)),
            Err(e) => {
                warn!(
                    "Could not open a separate connection to {} ({}), reading the catalog through the caller's connection",
                    conn.database_path().display(),
                    e
                );
                let close_after = !conn.is_open();
                conn.open()?;
                Ok(Session::Borrowed { conn, close_after })
            }
        }
    }

    fn connection(&mut self) -> &mut MsAccessConnection {
        match self {
            Session::Cloned(conn) => conn,
            Session::Borrowed { conn, .. } => &mut **conn,
        }
    }

    fn release(self) {
        let result = match self {
            Session::Cloned(mut conn) => conn.close(),
            Session::Borrowed {
                conn,
                close_after: true,
            } => conn.close(),
            Session::Borrowed { .. } => Ok(()),
        };
        if let Err(e) = result {
            debug!("Error closing catalog connection: {}", e);
        }
    }
}

fn read_snapshot(conn: &MsAccessConnection) -> Result<CatalogSnapshot> {
    let tables: Vec<String> = conn
        .catalog_tables()?
        .iter()
        .filter_map(|row| cell(row, TABLES_TABLE_NAME).map(str::to_string))
        .collect();
    let columns = column_rows(&conn.catalog_columns(None)?);

    let mut indexes = Vec::new();
    for table in &tables {
        let primary_key = match conn.catalog_primary_keys(table) {
            Ok(rows) => primary_key_name(&rows),
            Err(e) => {
                debug!("SQLPrimaryKeys unavailable for {}: {}", table, e);
                None
            }
        };
        let rows = conn.catalog_statistics(table)?;
        indexes.extend(index_rows(&rows, primary_key.as_deref()));
    }

    debug!(
        "Access catalog: {} tables, {} columns, {} index columns",
        tables.len(),
        columns.len(),
        indexes.len()
    );

    Ok(CatalogSnapshot {
        tables,
        columns,
        indexes,
        ..Default::default()
    })
}

fn cell(row: &[Option<String>], idx: usize) -> Option<&str> {
    row.get(idx).and_then(|v| v.as_deref())
}

fn cell_int(row: &[Option<String>], idx: usize) -> Option<i64> {
    cell(row, idx).and_then(|v| v.trim().parse().ok())
}

/// Map an Access `TYPE_NAME`, falling back to `Variant`.
pub(crate) fn column_type_of(type_name: &str) -> ColumnType {
    ColumnType::MsAccess(OleDbType::from_access_type_name(type_name).unwrap_or_else(|| {
        warn!("Unknown Access type '{}', treating as Variant", type_name);
        OleDbType::Variant
    }))
}

/// Convert `SQLColumns` rows, ordered by table and ordinal position.
fn column_rows(rows: &[Vec<Option<String>>]) -> Vec<ColumnRow> {
    let mut ordered: Vec<(String, i64, ColumnRow)> = rows
        .iter()
        .filter_map(|row| {
            let table = cell(row, COLUMNS_TABLE_NAME)?.to_string();
            let name = cell(row, COLUMNS_COLUMN_NAME)?.to_string();
            let column_type = column_type_of(cell(row, COLUMNS_TYPE_NAME).unwrap_or_default());
            let column_size = cell_int(row, COLUMNS_COLUMN_SIZE);
            let digits = cell_int(row, COLUMNS_DECIMAL_DIGITS);

            let (size, precision, scale) = match column_type {
                ColumnType::MsAccess(OleDbType::Numeric | OleDbType::Decimal) => {
                    (None, column_size, digits)
                }
                ColumnType::MsAccess(
                    OleDbType::WChar | OleDbType::Binary | OleDbType::VarBinary,
                ) => (column_size, None, None),
                _ => (None, None, None),
            };

            let ordinal = cell_int(row, COLUMNS_ORDINAL_POSITION).unwrap_or(i64::MAX);
            Some((
                name_key(&table),
                ordinal,
                ColumnRow {
                    table,
                    name,
                    column_type,
                    nullable: cell_int(row, COLUMNS_NULLABLE) != Some(0),
                    size,
                    precision,
                    scale,
                    read_only: false,
                    default: cell(row, COLUMNS_COLUMN_DEF).map(str::to_string),
                },
            ))
        })
        .collect();

    ordered.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
    ordered.into_iter().map(|(_, _, row)| row).collect()
}

/// Primary key name reported by `SQLPrimaryKeys`, if any.
fn primary_key_name(rows: &[Vec<Option<String>>]) -> Option<String> {
    rows.iter()
        .find_map(|row| cell(row, PK_NAME))
        .map(str::to_string)
}

/// Convert `SQLStatistics` rows into index rows ordered by index name and key
/// ordinal. `primary_key` overrides the default primary key index name.
fn index_rows(rows: &[Vec<Option<String>>], primary_key: Option<&str>) -> Vec<IndexRow> {
    let primary_key = primary_key.unwrap_or(PRIMARY_KEY_INDEX);
    let mut ordered: Vec<(String, i64, IndexRow)> = rows
        .iter()
        .filter(|row| cell_int(row, STAT_TYPE) != Some(SQL_TABLE_STAT))
        .filter_map(|row| {
            let table = cell(row, STAT_TABLE_NAME)?.to_string();
            let index = cell(row, STAT_INDEX_NAME)?.to_string();
            let column = cell(row, STAT_COLUMN_NAME)?.to_string();
            let is_primary_key = names_eq(&index, primary_key);
            Some((
                name_key(&index),
                cell_int(row, STAT_ORDINAL_POSITION).unwrap_or(i64::MAX),
                IndexRow {
                    table,
                    index,
                    column,
                    is_primary_key,
                    is_unique: is_primary_key || cell_int(row, STAT_NON_UNIQUE) == Some(0),
                    is_unique_constraint: false,
                    clustered: false,
                    descending: cell(row, STAT_ASC_OR_DESC) == Some("D"),
                },
            ))
        })
        .collect();

    ordered.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
    ordered.into_iter().map(|(_, _, row)| row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use crate::drivers::SqlServerConnection;
    use crate::schema::SortOrder;

    fn column(table: &str, name: &str, type_name: &str, size: &str, nullable: &str, def: Option<&str>, ordinal: &str) -> Vec<Option<String>> {
        let mut row = vec![None; 18];
        row[COLUMNS_TABLE_NAME] = Some(table.into());
        row[COLUMNS_COLUMN_NAME] = Some(name.into());
        row[COLUMNS_TYPE_NAME] = Some(type_name.into());
        row[COLUMNS_COLUMN_SIZE] = Some(size.into());
        row[COLUMNS_NULLABLE] = Some(nullable.into());
        row[COLUMNS_COLUMN_DEF] = def.map(str::to_string);
        row[COLUMNS_ORDINAL_POSITION] = Some(ordinal.into());
        row
    }

    #[test]
    fn test_column_rows_map_types_and_order() {
        let rows = vec![
            column("Customers", "Name", "VARCHAR", "50", "1", Some("\"n/a\""), "2"),
            column("Customers", "ID", "COUNTER", "10", "0", None, "1"),
            column("Customers", "Notes", "LONGCHAR", "1073741823", "1", None, "3"),
        ];
        let cols = column_rows(&rows);

        assert_eq!(
            cols.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["ID", "Name", "Notes"]
        );
        assert_eq!(cols[0].column_type, ColumnType::MsAccess(OleDbType::Integer));
        assert!(!cols[0].nullable);
        assert_eq!(cols[1].size, Some(50));
        assert_eq!(cols[2].column_type, ColumnType::MsAccess(OleDbType::LongVarWChar));
        assert_eq!(cols[2].size, None);
    }

    fn stat(index: &str, ordinal: &str, column: &str, non_unique: &str, order: &str) -> Vec<Option<String>> {
        let mut row = vec![None; 13];
        row[STAT_TABLE_NAME] = Some("Lines".into());
        row[STAT_NON_UNIQUE] = Some(non_unique.into());
        row[STAT_INDEX_NAME] = Some(index.into());
        row[STAT_TYPE] = Some("3".into());
        row[STAT_ORDINAL_POSITION] = Some(ordinal.into());
        row[STAT_COLUMN_NAME] = Some(column.into());
        row[STAT_ASC_OR_DESC] = Some(order.into());
        row
    }

    fn table_stat() -> Vec<Option<String>> {
        let mut row = vec![None; 13];
        row[STAT_TABLE_NAME] = Some("Lines".into());
        row[STAT_TYPE] = Some("0".into());
        row
    }

    #[test]
    fn test_index_rows_classify_and_order() {
        let rows = vec![
            table_stat(),
            stat("PrimaryKey", "2", "LineNo", "0", "A"),
            stat("ByProduct", "1", "Product", "1", "A"),
            stat("PrimaryKey", "1", "OrderId", "0", "A"),
            stat("UniqueSku", "1", "Sku", "0", "D"),
        ];
        let indexes = index_rows(&rows, None);

        let summary: Vec<_> = indexes
            .iter()
            .map(|r| (r.index.as_str(), r.column.as_str(), r.is_primary_key, r.is_unique, r.descending))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("ByProduct", "Product", false, false, false),
                ("PrimaryKey", "OrderId", true, true, false),
                ("PrimaryKey", "LineNo", true, true, false),
                ("UniqueSku", "Sku", false, true, true),
            ]
        );
    }

    #[test]
    fn test_reported_primary_key_name_wins() {
        let pk = vec![vec![
            None,
            None,
            Some("Lines".to_string()),
            Some("OrderId".to_string()),
            Some("1".to_string()),
            Some("pk_lines".to_string()),
        ]];
        let name = primary_key_name(&pk);
        assert_eq!(name.as_deref(), Some("pk_lines"));

        let rows = vec![
            stat("PK_Lines", "1", "OrderId", "0", "A"),
            stat("PrimaryKey", "1", "Legacy", "0", "A"),
        ];
        let indexes = index_rows(&rows, name.as_deref());
        assert!(indexes[0].is_primary_key);
        assert!(!indexes[1].is_primary_key);
        assert!(primary_key_name(&[]).is_none());
    }

    #[test]
    fn test_build_table_from_access_rows() {
        let rows = vec![
            column("Customers", "ID", "COUNTER", "10", "0", None, "1"),
            column("Customers", "Name", "VARCHAR", "50", "1", Some("\"n/a\""), "2"),
            column("Customers", "Active", "BIT", "1", "0", Some("=True"), "3"),
        ];
        let mut pk = stat("PrimaryKey", "1", "ID", "0", "A");
        pk[STAT_TABLE_NAME] = Some("Customers".into());
        let mut by_name = stat("ByName", "1", "Name", "1", "D");
        by_name[STAT_TABLE_NAME] = Some("Customers".into());
        let snapshot = CatalogSnapshot {
            tables: vec!["Customers".into()],
            columns: column_rows(&rows),
            indexes: index_rows(&[pk, by_name], None),
            ..Default::default()
        };
        let db = build_database("shop", &snapshot, &DefaultValueResolver::new()).unwrap();
        let customers = db.table("customers").unwrap();

        assert_eq!(customers.primary_key_columns(), vec!["ID"]);
        let by_name = &customers.indexes()["ByName"];
        assert!(!by_name.is_unique());
        assert_eq!(by_name.columns()["Name"].sort_order, SortOrder::Descending);
        assert_eq!(
            customers.columns()["Name"].default_value,
            SqlValue::text_owned("n/a".into())
        );
        assert_eq!(customers.columns()["Active"].default_value, SqlValue::Bool(true));
        assert_eq!(customers.columns()["ID"].default_value, SqlValue::I32(0));
    }

    #[test]
    fn test_database_name_is_file_stem() {
        let conn = MsAccessConnection::from_path("/data/Northwind.accdb").unwrap();
        assert_eq!(database_name(&conn), "Northwind");
    }

    #[tokio::test]
    async fn test_wrong_connection_rejected() {
        let loader = MsAccessSchemaLoader::new();
        let mut sql = SqlServerConnection::new("Server=db01;Database=Sales").unwrap();
        let err = loader.load_schema(Connection::from(&mut sql)).await.unwrap_err();
        assert!(matches!(err, BulkError::UnsupportedConnection { .. }));
    }
}
