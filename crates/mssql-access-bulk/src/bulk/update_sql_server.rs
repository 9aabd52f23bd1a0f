//! SQL Server bulk update through a session temp table.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::BulkOptions;
use crate::drivers::{quote_ident, Connection, SqlServerConnection};
use crate::error::{require_name, BulkError, Result};
use crate::loader::SchemaCache;
use crate::reader::{BulkActionDataReader, DataReaderAdapter};
use crate::schema::{
    names_eq, ColumnSchema, ColumnType, CommandParameter, SqlDbType, TableSchema,
};

use super::sql_server::{bulk_target, load_destination, SqlServerBulkInsert};
use super::update::{BulkUpdate, BulkUpdateRun, TempTableAction, TempTableContext, UpdatePlan};

/// Bulk update for SQL Server tables.
#[derive(Clone)]
pub struct SqlServerBulkUpdate {
    destination_table_name: String,
    primary_key_column: String,
    insert: SqlServerBulkInsert,
    schema_cache: Option<Arc<SchemaCache>>,
    action: Option<Arc<dyn TempTableAction>>,
}

impl fmt::Debug for SqlServerBulkUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlServerBulkUpdate")
            .field("destination_table_name", &self.destination_table_name)
            .field("primary_key_column", &self.primary_key_column)
            .field("insert", &self.insert)
            .field("has_action", &self.action.is_some())
            .finish()
    }
}

impl SqlServerBulkUpdate {
    pub fn new(
        destination_table_name: impl Into<String>,
        primary_key_column: impl Into<String>,
    ) -> Result<Self> {
        let destination_table_name = destination_table_name.into();
        let primary_key_column = primary_key_column.into();
        require_name("primary_key_column", &primary_key_column)?;
        Ok(Self {
            insert: SqlServerBulkInsert::new(&destination_table_name)?,
            destination_table_name,
            primary_key_column,
            schema_cache: None,
            action: None,
        })
    }

    pub fn from_options(
        destination_table_name: impl Into<String>,
        primary_key_column: impl Into<String>,
        options: &BulkOptions,
    ) -> Result<Self> {
        let mut update = Self::new(destination_table_name, primary_key_column)?;
        update.insert = SqlServerBulkInsert::from_options(&update.destination_table_name, options)?;
        Ok(update)
    }

    /// Settings of the load into the temp table (batch size, timeout, options).
    pub fn with_bulk_insert(
        mut self,
        configure: impl FnOnce(SqlServerBulkInsert) -> SqlServerBulkInsert,
    ) -> Self {
        self.insert = configure(self.insert);
        self
    }

    pub fn with_schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.schema_cache = Some(cache);
        self
    }

    /// Action run on the staged rows before the merge.
    pub fn with_temp_table_action(mut self, action: Arc<dyn TempTableAction>) -> Self {
        self.action = Some(action);
        self
    }
}

#[async_trait]
impl BulkUpdate for SqlServerBulkUpdate {
    fn destination_table_name(&self) -> &str {
        &self.destination_table_name
    }

    fn primary_key_column(&self) -> &str {
        &self.primary_key_column
    }

    async fn update_async(
        &self,
        connection: Connection<'_>,
        reader: &mut dyn BulkActionDataReader,
    ) -> Result<u64> {
        let connection = match connection {
            Connection::SqlServer(c) => c,
            other => {
                return Err(BulkError::unsupported_connection(
                    "SqlServerBulkUpdate",
                    other.type_name(),
                ))
            }
        };

        let opened_here = !connection.is_open();
        if opened_here {
            connection.open().await?;
        }

        let result = self.run(connection, reader).await;

        if opened_here {
            if let Err(e) = connection.close().await {
                warn!("Failed to close connection after bulk update: {}", e);
            }
        }
        result
    }
}

impl SqlServerBulkUpdate {
    async fn run(
        &self,
        connection: &mut SqlServerConnection,
        reader: &mut dyn BulkActionDataReader,
    ) -> Result<u64> {
        let destination = load_destination(
            connection,
            self.schema_cache.as_deref(),
            &self.destination_table_name,
        )
        .await?;
        let plan = UpdatePlan::new(&*reader, &self.primary_key_column, &destination)?;

        let temp_table = format!("#BulkUpdate_{}", Uuid::new_v4().simple());
        let temp_schema = temp_table_schema(&temp_table, &destination, &plan)?;
        let mut insert = self.insert.clone().with_destination_schema(temp_schema.clone());
        insert.set_destination_table_name(&temp_table)?;

        let mut run = SqlServerUpdateRun {
            connection,
            destination: bulk_target(&self.destination_table_name),
            temp_schema,
            plan,
            insert,
            temp_table,
            created: false,
        };
        run.execute(reader, self.action.as_deref()).await
    }
}

struct SqlServerUpdateRun<'a> {
    connection: &'a mut SqlServerConnection,
    destination: String,
    temp_schema: TableSchema,
    plan: UpdatePlan,
    insert: SqlServerBulkInsert,
    temp_table: String,
    created: bool,
}

#[async_trait]
impl<'a> BulkUpdateRun for SqlServerUpdateRun<'a> {
    fn temp_table_name(&self) -> &str {
        &self.temp_table
    }

    async fn create_temp_table(&mut self) -> Result<()> {
        let create = create_table_statement(&self.temp_schema)?;
        debug!("Creating temp table: {}", create);
        self.connection.execute(&create).await?;
        self.created = true;

        let key = primary_key_statement(&self.temp_table, &self.plan.primary_key);
        self.connection.execute(&key).await
    }

    async fn insert_into_temp_table(
        &mut self,
        reader: &mut dyn BulkActionDataReader,
    ) -> Result<u64> {
        let mut reader = DataReaderAdapter::new(reader);
        self.insert.write_to_server(self.connection, &mut reader).await
    }

    async fn invoke_action(&mut self, action: &dyn TempTableAction) -> Result<()> {
        action
            .invoke(TempTableContext {
                connection: Connection::SqlServer(&mut *self.connection),
                table_name: &self.temp_table,
            })
            .await
    }

    async fn update_destination_table(&mut self) -> Result<u64> {
        let Some(sql) = update_statement(&self.destination, &self.temp_table, &self.plan) else {
            debug!("Only the key column was supplied, nothing to merge");
            return Ok(0);
        };
        debug!("Merging temp table: {}", sql);
        self.connection.execute_count(&sql).await
    }

    async fn done_temp_table(&mut self) -> Result<()> {
        if !self.created {
            return Ok(());
        }
        self.connection
            .execute(&format!("DROP TABLE {}", quote_ident(&self.temp_table)))
            .await?;
        self.created = false;
        Ok(())
    }
}

/// Layout of the temp table: the reader's columns typed as in the destination.
///
/// Identity and computed properties are not carried over so the bulk load can
/// write every staged column; rowversion values are staged as `binary(8)`.
fn temp_table_schema(name: &str, destination: &TableSchema, plan: &UpdatePlan) -> Result<TableSchema> {
    let mut temp = TableSchema::new(name)?;
    for column_name in &plan.columns {
        let source = destination.columns().get(column_name).ok_or_else(|| {
            BulkError::ColumnNotInDestination {
                table: destination.name().to_string(),
                column: column_name.clone(),
            }
        })?;
        let mut column = source.detached();
        column.is_read_only = false;
        column.allow_null = !names_eq(column_name, &plan.primary_key);
        if column.sql_db_type() == Some(SqlDbType::Timestamp) {
            column.column_type = ColumnType::SqlServer(SqlDbType::Binary);
            column.size = 8;
        }
        temp.columns_mut().add(column)?;
    }
    Ok(temp)
}

fn column_definition(column: &ColumnSchema) -> Result<String> {
    let mut parameter = CommandParameter::sql_server(column.name());
    column.setup_parameter(&mut parameter)?;
    let mut definition = format!("{} {}", quote_ident(column.name()), parameter.declaration()?);
    if column
        .sql_db_type()
        .is_some_and(|t| t.is_text() && t != SqlDbType::Xml)
    {
        definition.push_str(" COLLATE DATABASE_DEFAULT");
    }
    definition.push_str(if column.allow_null { " NULL" } else { " NOT NULL" });
    Ok(definition)
}

fn create_table_statement(temp: &TableSchema) -> Result<String> {
    let columns = temp
        .columns()
        .iter()
        .map(column_definition)
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "CREATE TABLE {} ({})",
        quote_ident(temp.name()),
        columns.join(", ")
    ))
}

fn primary_key_statement(temp_table: &str, primary_key: &str) -> String {
    format!(
        "ALTER TABLE {} ADD PRIMARY KEY NONCLUSTERED ({})",
        quote_ident(temp_table),
        quote_ident(primary_key)
    )
}

/// Join update from the temp table, or `None` when only the key was staged.
fn update_statement(destination: &str, temp_table: &str, plan: &UpdatePlan) -> Option<String> {
    if !plan.has_set_columns() {
        return None;
    }
    let assignments: Vec<String> = plan
        .set_columns()
        .map(|c| {
            let c = quote_ident(c);
            format!("d.{c} = t.{c}")
        })
        .collect();
    let key = quote_ident(&plan.primary_key);
    Some(format!(
        "UPDATE d SET {} FROM {} AS d INNER JOIN {} AS t ON d.{key} = t.{key}",
        assignments.join(", "),
        destination,
        quote_ident(temp_table),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination() -> TableSchema {
        let mut t = TableSchema::new("Items").unwrap();
        let mut id = ColumnSchema::sql_server("Id", SqlDbType::Int).unwrap();
        id.allow_null = false;
        id.is_read_only = true;
        let mut val = ColumnSchema::sql_server("Val", SqlDbType::NVarChar).unwrap();
        val.size = 50;
        let version = ColumnSchema::sql_server("Version", SqlDbType::Timestamp).unwrap();
        for c in [id, val, version] {
            t.columns_mut().add(c).unwrap();
        }
        t
    }

    fn plan(columns: &[&str]) -> UpdatePlan {
        UpdatePlan {
            primary_key: "Id".into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_temp_table_statements() {
        let plan = plan(&["Id", "Val", "Version"]);
        let temp = temp_table_schema("#BulkUpdate_1", &destination(), &plan).unwrap();
        assert!(temp.columns().iter().all(|c| !c.is_read_only));

        assert_eq!(
            create_table_statement(&temp).unwrap(),
            "CREATE TABLE [#BulkUpdate_1] ([Id] int NOT NULL, \
             [Val] nvarchar(50) COLLATE DATABASE_DEFAULT NULL, [Version] binary(8) NULL)"
        );
        assert_eq!(
            primary_key_statement("#BulkUpdate_1", "Id"),
            "ALTER TABLE [#BulkUpdate_1] ADD PRIMARY KEY NONCLUSTERED ([Id])"
        );
    }

    #[test]
    fn test_update_statement() {
        let sql = update_statement("[Items]", "#BulkUpdate_1", &plan(&["Val", "Id"])).unwrap();
        assert_eq!(
            sql,
            "UPDATE d SET d.[Val] = t.[Val] FROM [Items] AS d \
             INNER JOIN [#BulkUpdate_1] AS t ON d.[Id] = t.[Id]"
        );
        assert!(update_statement("[Items]", "#BulkUpdate_1", &plan(&["Id"])).is_none());
    }

    #[test]
    fn test_constructor_validation() {
        assert!(SqlServerBulkUpdate::new("Items", " ").is_err());
        assert!(SqlServerBulkUpdate::new("", "Id").is_err());
        let update = SqlServerBulkUpdate::new("Items", "Id")
            .unwrap()
            .with_bulk_insert(|b| b.with_batch_size(100));
        assert_eq!(update.primary_key_column(), "Id");
        assert_eq!(update.insert.batch_size(), 100);
    }
}
