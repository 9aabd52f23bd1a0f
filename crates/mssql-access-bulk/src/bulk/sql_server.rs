//! SQL Server bulk insert over the TDS bulk load protocol.
//!
//! Rows are streamed through `Client::bulk_insert`, one `TokenRow` per reader
//! row. The token row covers every writable destination column in ordinal
//! order; columns no mapping feeds are sent as NULL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tiberius::{ColumnData, TokenRow};
use tracing::{debug, info, warn};

use crate::config::BulkOptions;
use crate::core::{SqlNullType, SqlValue};
use crate::drivers::mssql::tds;
use crate::drivers::{quote_ident, Connection, SqlServerConnection};
use crate::error::{require_name, BulkError, Result};
use crate::loader::{SchemaCache, SchemaLoader, SqlServerSchemaLoader};
use crate::reader::{BulkActionDataReader, DataReader, DataReaderAdapter};
use crate::schema::{names_eq, ColumnSchema, TableSchema};

use super::mapping::{resolve_mappings, ColumnMappings, ResolvedMapping};
use super::BulkInsert;

/// Vendor options of the bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlServerBulkCopyOptions {
    /// Take an exclusive table lock for the duration of each batch.
    pub table_lock: bool,
    /// Run each batch in its own transaction. Never combined with a
    /// transaction the caller already holds.
    pub use_internal_transaction: bool,
}

impl Default for SqlServerBulkCopyOptions {
    fn default() -> Self {
        Self {
            table_lock: true,
            use_internal_transaction: true,
        }
    }
}

impl SqlServerBulkCopyOptions {
    /// Options actually applied given whether the caller holds a transaction.
    pub fn effective(self, external_transaction: bool) -> Self {
        if external_transaction && self.use_internal_transaction {
            debug!("External transaction present, internal batch transactions disabled");
        }
        Self {
            table_lock: self.table_lock,
            use_internal_transaction: self.use_internal_transaction && !external_transaction,
        }
    }
}

/// Bulk insert engine for SQL Server.
#[derive(Debug, Clone)]
pub struct SqlServerBulkInsert {
    destination_table_name: String,
    batch_size: usize,
    bulk_insert_timeout: u64,
    column_mappings: ColumnMappings,
    options: SqlServerBulkCopyOptions,
    schema_cache: Option<Arc<SchemaCache>>,
    destination_schema: Option<TableSchema>,
}

impl SqlServerBulkInsert {
    pub fn new(destination_table_name: impl Into<String>) -> Result<Self> {
        let destination_table_name = destination_table_name.into();
        require_name("destination_table_name", &destination_table_name)?;
        Ok(Self {
            destination_table_name,
            batch_size: 0,
            bulk_insert_timeout: 0,
            column_mappings: ColumnMappings::new(),
            options: SqlServerBulkCopyOptions::default(),
            schema_cache: None,
            destination_schema: None,
        })
    }

    /// Engine configured from `options`. Negative sizes are rejected.
    pub fn from_options(
        destination_table_name: impl Into<String>,
        options: &BulkOptions,
    ) -> Result<Self> {
        let batch_size = usize::try_from(options.batch_size).map_err(|_| {
            BulkError::out_of_range("batch_size", format!("{} is negative", options.batch_size))
        })?;
        let timeout = u64::try_from(options.bulk_insert_timeout_secs).map_err(|_| {
            BulkError::out_of_range(
                "bulk_insert_timeout_secs",
                format!("{} is negative", options.bulk_insert_timeout_secs),
            )
        })?;
        Ok(Self::new(destination_table_name)?
            .with_batch_size(batch_size)
            .with_bulk_insert_timeout(timeout)
            .with_options(SqlServerBulkCopyOptions {
                table_lock: options.table_lock,
                use_internal_transaction: options.use_internal_transaction,
            }))
    }

    /// Rows per batch; 0 sends everything in one batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Timeout in seconds for the whole load; 0 waits forever.
    pub fn with_bulk_insert_timeout(mut self, seconds: u64) -> Self {
        self.bulk_insert_timeout = seconds;
        self
    }

    pub fn with_column_mappings(mut self, mappings: ColumnMappings) -> Self {
        self.column_mappings = mappings;
        self
    }

    pub fn with_options(mut self, options: SqlServerBulkCopyOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve the destination schema through `cache` instead of a fresh load.
    pub fn with_schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.schema_cache = Some(cache);
        self
    }

    /// Use `schema` as the destination layout without querying the catalog.
    /// Needed for session temp tables, which the catalog of another session
    /// cannot see.
    pub fn with_destination_schema(mut self, schema: TableSchema) -> Self {
        self.destination_schema = Some(schema);
        self
    }

    pub fn set_destination_table_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        require_name("destination_table_name", &name)?;
        self.destination_table_name = name;
        Ok(())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn bulk_insert_timeout(&self) -> u64 {
        self.bulk_insert_timeout
    }

    pub fn options(&self) -> SqlServerBulkCopyOptions {
        self.options
    }

    pub fn column_mappings_mut(&mut self) -> &mut ColumnMappings {
        &mut self.column_mappings
    }

    /// Load every row of `reader` into the destination table.
    ///
    /// The connection is opened when needed unless the caller holds a
    /// transaction on it. Returns the number of rows sent.
    pub async fn write_to_server<R>(
        &self,
        connection: &mut SqlServerConnection,
        reader: &mut R,
    ) -> Result<u64>
    where
        R: DataReader + ?Sized,
    {
        let external = connection.in_transaction();
        if !external && !connection.is_open() {
            connection.open().await?;
        }

        let table = self.destination_schema(connection).await?;
        let mappings = resolve_mappings(&*reader, &self.column_mappings, &table)?;
        let plan = column_plan(&table, &mappings);
        let options = self.options.effective(external);
        let target = bulk_target(&self.destination_table_name);

        let writer = BatchWriter {
            target: &target,
            plan: &plan,
            // The lock only outlives its statement inside a transaction.
            table_lock: options.table_lock && (external || options.use_internal_transaction),
            batch_size: if self.batch_size == 0 {
                usize::MAX
            } else {
                self.batch_size
            },
        };

        let started = Instant::now();
        let load = writer.load(connection, reader, options.use_internal_transaction);
        let rows = if self.bulk_insert_timeout == 0 {
            load.await?
        } else {
            tokio::time::timeout(Duration::from_secs(self.bulk_insert_timeout), load)
                .await
                .map_err(|_| BulkError::Timeout {
                    table: self.destination_table_name.clone(),
                    seconds: self.bulk_insert_timeout,
                })??
        };

        info!(
            "Bulk inserted {} rows into {} in {:.2}s",
            rows,
            target,
            started.elapsed().as_secs_f64()
        );
        Ok(rows)
    }

    async fn destination_schema(&self, connection: &mut SqlServerConnection) -> Result<TableSchema> {
        match &self.destination_schema {
            Some(schema) => Ok(schema.clone()),
            None => {
                load_destination(
                    connection,
                    self.schema_cache.as_deref(),
                    &self.destination_table_name,
                )
                .await
            }
        }
    }
}

/// Destination table schema, through `cache` when one is configured.
pub(crate) async fn load_destination(
    connection: &mut SqlServerConnection,
    cache: Option<&SchemaCache>,
    table_name: &str,
) -> Result<TableSchema> {
    let name = unqualified_name(table_name);
    let table = match cache {
        Some(cache) => {
            cache
                .get_table_schema(Connection::SqlServer(connection), name)
                .await?
        }
        None => {
            SqlServerSchemaLoader::new()
                .load_table_schema(Connection::SqlServer(connection), name)
                .await?
        }
    };
    table.ok_or_else(|| BulkError::TableNotFound(table_name.to_string()))
}

#[async_trait]
impl BulkInsert for SqlServerBulkInsert {
    fn destination_table_name(&self) -> &str {
        &self.destination_table_name
    }

    fn column_mappings(&self) -> &ColumnMappings {
        &self.column_mappings
    }

    async fn insert_async(
        &self,
        connection: Connection<'_>,
        reader: &mut dyn BulkActionDataReader,
    ) -> Result<u64> {
        let connection = match connection {
            Connection::SqlServer(c) => c,
            other => {
                return Err(BulkError::unsupported_connection(
                    "SqlServerBulkInsert",
                    other.type_name(),
                ))
            }
        };
        let mut reader = DataReaderAdapter::new(reader);
        self.write_to_server(connection, &mut reader).await
    }
}

/// Destination column and the reader field feeding it.
type PlannedColumn<'t> = (&'t ColumnSchema, Option<usize>);

/// Writable destination columns in ordinal order, each paired with its source.
fn column_plan<'t>(table: &'t TableSchema, mappings: &[ResolvedMapping]) -> Vec<PlannedColumn<'t>> {
    let mut plan: Vec<PlannedColumn<'t>> = table
        .columns()
        .iter()
        .filter(|c| !c.is_read_only)
        .map(|c| (c, None))
        .collect();

    for m in mappings {
        match plan
            .iter_mut()
            .find(|(c, _)| names_eq(c.name(), &m.destination))
        {
            Some(slot) => slot.1 = Some(m.source_ordinal),
            None => warn!(
                "Column {} of {} is generated by the server; mapped values are ignored",
                m.destination,
                table.name()
            ),
        }
    }
    plan
}

/// Table name as the catalog knows it: the last part, without brackets.
pub(crate) fn unqualified_name(name: &str) -> &str {
    let name = name.trim();
    if let Some(inner) = name.strip_suffix(']') {
        if let Some(start) = inner.rfind('[') {
            return &inner[start + 1..];
        }
    }
    name.rsplit('.').next().unwrap_or(name)
}

/// Name handed to the bulk load. Already qualified or quoted names pass through.
pub(crate) fn bulk_target(name: &str) -> String {
    let name = name.trim();
    if name.contains('[') || name.contains('.') {
        name.to_string()
    } else {
        quote_ident(name)
    }
}

fn row_values(plan: &[PlannedColumn<'_>], values: &[SqlValue<'static>]) -> Result<Vec<ColumnData<'static>>> {
    plan.iter()
        .map(|(column, source)| match source {
            Some(i) => {
                let value = values.get(*i).ok_or(BulkError::OrdinalOutOfRange {
                    ordinal: *i,
                    field_count: values.len(),
                })?;
                tds::to_column_data(value, column)
            }
            None => tds::to_column_data(&SqlValue::Null(SqlNullType::Unknown), column),
        })
        .collect()
}

struct BatchWriter<'a> {
    target: &'a str,
    plan: &'a [PlannedColumn<'a>],
    table_lock: bool,
    batch_size: usize,
}

impl BatchWriter<'_> {
    async fn load<R>(
        &self,
        connection: &mut SqlServerConnection,
        reader: &mut R,
        internal_transaction: bool,
    ) -> Result<u64>
    where
        R: DataReader + ?Sized,
    {
        let mut total = 0u64;
        let mut batch = 0u32;
        let mut has_row = reader.read()?;

        while has_row {
            batch += 1;
            if internal_transaction {
                connection.execute("BEGIN TRANSACTION").await?;
            }

            let sent = match self.send(connection, reader, &mut has_row).await {
                Ok(sent) => sent,
                Err(e) => {
                    if internal_transaction {
                        if let Err(rollback) = connection
                            .execute("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
                            .await
                        {
                            warn!("Rollback of batch {} on {} failed: {}", batch, self.target, rollback);
                        }
                    }
                    return Err(e);
                }
            };

            if internal_transaction {
                connection.execute("COMMIT TRANSACTION").await?;
            }
            total += sent;
            debug!(
                "{}: batch {} sent {} rows ({} total)",
                self.target, batch, sent, total
            );
        }
        Ok(total)
    }

    /// Send rows until the batch is full or the reader is exhausted.
    async fn send<R>(
        &self,
        connection: &mut SqlServerConnection,
        reader: &mut R,
        has_row: &mut bool,
    ) -> Result<u64>
    where
        R: DataReader + ?Sized,
    {
        if self.table_lock {
            connection
                .execute(&format!(
                    "SELECT TOP 0 1 FROM {} WITH (TABLOCKX, HOLDLOCK)",
                    self.target
                ))
                .await?;
        }

        let mut values = Vec::with_capacity(reader.field_count());
        let mut bulk_load = connection
            .client_mut()?
            .bulk_insert(self.target)
            .await
            .map_err(|e| BulkError::bulk_load(self.target, format!("bulk insert init: {}", e)))?;

        let mut sent = 0usize;
        while *has_row && sent < self.batch_size {
            reader.get_values(&mut values)?;
            let mut token_row = TokenRow::new();
            for data in row_values(self.plan, &values)? {
                token_row.push(data);
            }
            bulk_load.send(token_row).await.map_err(|e| {
                BulkError::bulk_load(self.target, format!("bulk insert send: {}", e))
            })?;
            sent += 1;
            *has_row = reader.read()?;
        }

        bulk_load.finalize().await.map_err(|e| {
            BulkError::bulk_load(self.target, format!("bulk insert finalize: {}", e))
        })?;
        Ok(sent as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MsAccessConnection;
    use crate::reader::EnumerableDataReader;
    use crate::schema::SqlDbType;

    fn orders() -> TableSchema {
        let mut table = TableSchema::new("Orders").unwrap();
        let mut id = ColumnSchema::sql_server("Id", SqlDbType::Int).unwrap();
        id.is_read_only = true;
        table.columns_mut().add(id).unwrap();
        table
            .columns_mut()
            .add(ColumnSchema::sql_server("Customer", SqlDbType::NVarChar).unwrap())
            .unwrap();
        table
            .columns_mut()
            .add(ColumnSchema::sql_server("Total", SqlDbType::Int).unwrap())
            .unwrap();
        table
    }

    #[test]
    fn test_effective_options() {
        let defaults = SqlServerBulkCopyOptions::default();
        assert_eq!(defaults.effective(false), defaults);
        let external = defaults.effective(true);
        assert!(external.table_lock);
        assert!(!external.use_internal_transaction);
    }

    #[test]
    fn test_from_options_rejects_negative_sizes() {
        let mut options = BulkOptions {
            batch_size: 500,
            bulk_insert_timeout_secs: 30,
            ..BulkOptions::default()
        };
        let engine = SqlServerBulkInsert::from_options("Orders", &options).unwrap();
        assert_eq!(engine.batch_size(), 500);
        assert_eq!(engine.bulk_insert_timeout(), 30);

        options.batch_size = -1;
        let err = SqlServerBulkInsert::from_options("Orders", &options).unwrap_err();
        assert!(matches!(err, BulkError::OutOfRange { param: "batch_size", .. }));
        assert!(SqlServerBulkInsert::new("  ").is_err());
    }

    #[test]
    fn test_table_names() {
        assert_eq!(unqualified_name("Orders"), "Orders");
        assert_eq!(unqualified_name("dbo.Orders"), "Orders");
        assert_eq!(unqualified_name("[dbo].[Order.Lines]"), "Order.Lines");
        assert_eq!(bulk_target("Orders"), "[Orders]");
        assert_eq!(bulk_target("#BulkUpdate_1"), "[#BulkUpdate_1]");
        assert_eq!(bulk_target("[dbo].[Orders]"), "[dbo].[Orders]");
    }

    #[test]
    fn test_plan_skips_read_only_and_nulls_unmapped() {
        let table = orders();
        let mappings = vec![
            ResolvedMapping {
                source_ordinal: 0,
                destination: "Id".into(),
            },
            ResolvedMapping {
                source_ordinal: 1,
                destination: "Customer".into(),
            },
        ];
        let plan = column_plan(&table, &mappings);
        let names: Vec<_> = plan.iter().map(|(c, s)| (c.name(), *s)).collect();
        assert_eq!(names, vec![("Customer", Some(1)), ("Total", None)]);

        let values = vec![SqlValue::I32(7), SqlValue::text_owned("Ann".into())];
        let row = row_values(&plan, &values).unwrap();
        assert_eq!(row.len(), 2);
        assert!(matches!(&row[0], ColumnData::String(Some(s)) if s == "Ann"));
        assert!(matches!(row[1], ColumnData::I32(None)));
    }

    #[tokio::test]
    async fn test_rejects_access_connection() {
        let engine = SqlServerBulkInsert::new("Orders").unwrap();
        let mut access = MsAccessConnection::from_path("/tmp/none.accdb").unwrap();
        let mut reader = EnumerableDataReader::from_values("Id", vec![1i32]);
        let err = engine
            .insert_async(Connection::from(&mut access), &mut reader)
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::UnsupportedConnection { .. }));
    }
}
