//! Bulk insert and bulk update engines.
//!
//! - [`SqlServerBulkInsert`]: TDS bulk load with batching and a timeout
//! - [`MsAccessBulkInsert`]: CSV and `schema.ini` staging imported through the
//!   Access text driver
//! - [`SqlServerBulkUpdate`] / [`MsAccessBulkUpdate`]: stage into a temp table,
//!   merge by primary key
//!
//! Both insert engines read rows through [`BulkActionDataReader`] and resolve
//! [`ColumnMappings`] against the destination schema the same way.

use async_trait::async_trait;

use crate::drivers::Connection;
use crate::error::Result;
use crate::reader::{BulkActionDataReader, DataTable};

pub mod csv;
pub mod mapping;
mod ms_access;
mod registry;
pub mod schema_ini;
mod sql_server;
mod update;
mod update_ms_access;
mod update_sql_server;

pub use mapping::{resolve_mappings, BulkInsertColumnMapping, ColumnMappings, ResolvedMapping};
pub use ms_access::{MsAccessBulkInsert, DEFAULT_DELIMITER};
pub use registry::{
    BulkActionFactory, BulkActionRegistry, MsAccessBulkActionFactory, SqlServerBulkActionFactory,
};
pub use schema_ini::CharacterSet;
pub use sql_server::{SqlServerBulkCopyOptions, SqlServerBulkInsert};
pub use update::{BulkUpdate, BulkUpdateRun, TempTableAction, TempTableContext, UpdatePlan};
pub use update_ms_access::MsAccessBulkUpdate;
pub use update_sql_server::SqlServerBulkUpdate;

/// Append rows from a reader to a destination table.
#[async_trait]
pub trait BulkInsert: Send + Sync {
    fn destination_table_name(&self) -> &str;

    /// Explicit mappings; empty means every reader column maps to the
    /// destination column of the same name.
    fn column_mappings(&self) -> &ColumnMappings;

    /// Returns the number of rows inserted.
    async fn insert_async(
        &self,
        connection: Connection<'_>,
        reader: &mut dyn BulkActionDataReader,
    ) -> Result<u64>;

    fn insert(&self, connection: Connection<'_>, reader: &mut dyn BulkActionDataReader) -> Result<u64> {
        crate::runtime::block_on(self.insert_async(connection, reader))
    }

    async fn insert_table_async(&self, connection: Connection<'_>, table: &DataTable) -> Result<u64> {
        let mut reader = table.create_reader();
        self.insert_async(connection, &mut reader).await
    }

    fn insert_table(&self, connection: Connection<'_>, table: &DataTable) -> Result<u64> {
        crate::runtime::block_on(self.insert_table_async(connection, table))
    }
}
