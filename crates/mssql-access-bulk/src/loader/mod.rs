//! Schema loaders: read vendor catalogs into a [`DatabaseSchema`].
//!
//! - [`SqlServerSchemaLoader`]: `INFORMATION_SCHEMA` and `sys.*` views over tiberius
//! - [`MsAccessSchemaLoader`]: ODBC catalog functions
//! - [`SchemaLoaders`]: pick a loader for a connection, no caching
//! - [`SchemaCache`]: memoize loaded schemas per server/database
//!
//! Loaders read through a fresh clone of the caller's connection so catalog
//! queries never run inside the caller's transaction. When the clone cannot
//! be opened they fall back to the caller's connection.

use async_trait::async_trait;

use crate::drivers::Connection;
use crate::error::{BulkError, Result};
use crate::schema::{DatabaseSchema, TableSchema};

mod cache;
pub mod catalog;
mod facade;
mod ms_access;
mod sql_server;

pub use cache::{
    ms_access_cache_key, sql_server_cache_key, CacheKeyGenerator, SchemaCache,
};
pub use facade::SchemaLoaders;
pub use ms_access::MsAccessSchemaLoader;
pub use sql_server::SqlServerSchemaLoader;

/// Load database schemas for one vendor.
///
/// Implementations check the connection variant and read the catalog. The
/// caller's connection is left in the open/closed state it was passed in.
#[async_trait]
pub trait SchemaLoader: Send + Sync {
    /// Loader name for logging.
    fn name(&self) -> &'static str;

    /// True if this loader can read through `connection`.
    fn supports_connection(&self, connection: &Connection<'_>) -> bool;

    /// Load every user table with columns, indexes and foreign keys.
    async fn load_schema(&self, connection: Connection<'_>) -> Result<DatabaseSchema>;

    /// Load one table's columns. `None` when the table does not exist.
    async fn load_table_schema(
        &self,
        connection: Connection<'_>,
        table_name: &str,
    ) -> Result<Option<TableSchema>>;

    /// Fail with [`BulkError::UnsupportedConnection`] unless supported.
    fn check_connection(&self, connection: &Connection<'_>) -> Result<()> {
        if self.supports_connection(connection) {
            Ok(())
        } else {
            Err(BulkError::unsupported_connection(
                self.name(),
                connection.type_name(),
            ))
        }
    }
}
