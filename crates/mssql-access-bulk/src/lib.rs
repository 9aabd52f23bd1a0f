//! # mssql-access-bulk
//!
//! Schema loading and bulk data loading for Microsoft SQL Server and
//! Microsoft Access.
//!
//! This library provides:
//!
//! - **Schema loading** from vendor catalogs into a vendor-neutral model,
//!   with typed column defaults
//! - **Schema caching** keyed by server and database
//! - **Bulk insert** over the TDS bulk load protocol (SQL Server) or a staged
//!   CSV import through the text driver (Access)
//! - **Bulk update** by staging rows into a temp table and merging on the
//!   primary key
//! - **Vendor dispatch** through [`BulkActionRegistry`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_access_bulk::{
//!     BulkInsert, Config, Connection, DataTable, SchemaCache, SqlNullType, SqlValue,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> mssql_access_bulk::Result<()> {
//!     let config = Config::load("bulk.yaml")?;
//!     let cache = Arc::new(SchemaCache::with_builtins());
//!     let registry = config.bulk_action_registry(Some(cache));
//!
//!     let mut table = DataTable::new("Customers");
//!     table.add_column("Id", SqlNullType::I32)?;
//!     table.add_column("Name", SqlNullType::String)?;
//!     table.add_row(vec![SqlValue::I32(1), SqlValue::Text("Ann".into())])?;
//!
//!     let mut sql = config.sql_server_connection()?;
//!     sql.open().await?;
//!     let mut conn = Connection::from(&mut sql);
//!     let insert = registry.create_bulk_insert(&conn, "Customers")?;
//!     let rows = insert.insert_table_async(conn.reborrow(), &table).await?;
//!     println!("Inserted {} rows", rows);
//!     Ok(())
//! }
//! ```

pub mod bulk;
pub mod config;
pub mod core;
pub mod defaults;
pub mod drivers;
pub mod error;
pub mod loader;
pub mod reader;
pub mod runtime;
pub mod schema;

// Re-exports for convenient access
pub use bulk::{
    BulkActionFactory, BulkActionRegistry, BulkInsert, BulkInsertColumnMapping, BulkUpdate,
    ColumnMappings, MsAccessBulkInsert, MsAccessBulkUpdate, SqlServerBulkCopyOptions,
    SqlServerBulkInsert, SqlServerBulkUpdate, TempTableAction, TempTableContext,
};
pub use config::{BulkOptions, Config, MsAccessConfig, SqlServerConfig};
pub use crate::core::{SqlNullType, SqlValue};
pub use defaults::{DefaultValueHook, DefaultValueResolver};
pub use drivers::{Connection, MsAccessConnection, SqlServerConnection};
pub use error::{BulkError, Result};
pub use loader::{SchemaCache, SchemaLoader, SchemaLoaders};
pub use reader::{
    BulkActionDataReader, BulkRecord, DataColumn, DataReader, DataReaderAdapter, DataTable,
    EnumerableDataReader,
};
pub use schema::{
    ColumnSchema, ColumnType, DatabaseSchema, ForeignKeySchema, IndexSchema, TableSchema,
};
