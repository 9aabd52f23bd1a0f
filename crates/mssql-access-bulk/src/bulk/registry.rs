//! Vendor dispatch for bulk actions.
//!
//! A [`BulkActionRegistry`] is built once and passed to whatever needs to
//! create bulk insert or update objects for a connection it only knows as a
//! [`Connection`].

use std::fmt;
use std::sync::Arc;

use crate::config::BulkOptions;
use crate::drivers::Connection;
use crate::error::{BulkError, Result};
use crate::loader::SchemaCache;

use super::update::BulkUpdate;
use super::{
    BulkInsert, MsAccessBulkInsert, MsAccessBulkUpdate, SqlServerBulkInsert, SqlServerBulkUpdate,
};

/// Creates bulk actions for one vendor.
pub trait BulkActionFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports_connection(&self, connection: &Connection<'_>) -> bool;

    fn create_bulk_insert(&self, destination_table_name: &str) -> Result<Box<dyn BulkInsert>>;

    fn create_bulk_update(
        &self,
        destination_table_name: &str,
        primary_key_column: &str,
    ) -> Result<Box<dyn BulkUpdate>>;
}

/// SQL Server actions configured from shared [`BulkOptions`].
#[derive(Debug, Clone, Default)]
pub struct SqlServerBulkActionFactory {
    options: BulkOptions,
    schema_cache: Option<Arc<SchemaCache>>,
}

impl SqlServerBulkActionFactory {
    pub fn new(options: BulkOptions, schema_cache: Option<Arc<SchemaCache>>) -> Self {
        Self {
            options,
            schema_cache,
        }
    }
}

impl BulkActionFactory for SqlServerBulkActionFactory {
    fn name(&self) -> &'static str {
        "SqlServerBulkActionFactory"
    }

    fn supports_connection(&self, connection: &Connection<'_>) -> bool {
        matches!(connection, Connection::SqlServer(_))
    }

    fn create_bulk_insert(&self, destination_table_name: &str) -> Result<Box<dyn BulkInsert>> {
        let mut insert = SqlServerBulkInsert::from_options(destination_table_name, &self.options)?;
        if let Some(cache) = &self.schema_cache {
            insert = insert.with_schema_cache(Arc::clone(cache));
        }
        Ok(Box::new(insert))
    }

    fn create_bulk_update(
        &self,
        destination_table_name: &str,
        primary_key_column: &str,
    ) -> Result<Box<dyn BulkUpdate>> {
        let mut update = SqlServerBulkUpdate::from_options(
            destination_table_name,
            primary_key_column,
            &self.options,
        )?;
        if let Some(cache) = &self.schema_cache {
            update = update.with_schema_cache(Arc::clone(cache));
        }
        Ok(Box::new(update))
    }
}

/// Access actions configured from shared [`BulkOptions`].
#[derive(Debug, Clone, Default)]
pub struct MsAccessBulkActionFactory {
    options: BulkOptions,
    schema_cache: Option<Arc<SchemaCache>>,
}

impl MsAccessBulkActionFactory {
    pub fn new(options: BulkOptions, schema_cache: Option<Arc<SchemaCache>>) -> Self {
        Self {
            options,
            schema_cache,
        }
    }
}

impl BulkActionFactory for MsAccessBulkActionFactory {
    fn name(&self) -> &'static str {
        "MsAccessBulkActionFactory"
    }

    fn supports_connection(&self, connection: &Connection<'_>) -> bool {
        matches!(connection, Connection::MsAccess(_))
    }

    fn create_bulk_insert(&self, destination_table_name: &str) -> Result<Box<dyn BulkInsert>> {
        let mut insert = MsAccessBulkInsert::from_options(destination_table_name, &self.options)?;
        if let Some(cache) = &self.schema_cache {
            insert = insert.with_schema_cache(Arc::clone(cache));
        }
        Ok(Box::new(insert))
    }

    fn create_bulk_update(
        &self,
        destination_table_name: &str,
        primary_key_column: &str,
    ) -> Result<Box<dyn BulkUpdate>> {
        let mut update = MsAccessBulkUpdate::from_options(
            destination_table_name,
            primary_key_column,
            &self.options,
        )?;
        if let Some(cache) = &self.schema_cache {
            update = update.with_schema_cache(Arc::clone(cache));
        }
        Ok(Box::new(update))
    }
}

/// Registered factories. The most recently registered factory supporting a
/// connection wins, so callers can override the built-in ones.
#[derive(Clone, Default)]
pub struct BulkActionRegistry {
    factories: Vec<Arc<dyn BulkActionFactory>>,
}

impl fmt::Debug for BulkActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.factories.iter().map(|f| f.name()))
            .finish()
    }
}

impl BulkActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// SQL Server and Access factories with default options.
    pub fn with_builtins() -> Self {
        Self::with_options(BulkOptions::default(), None)
    }

    /// SQL Server and Access factories sharing `options` and `schema_cache`.
    pub fn with_options(options: BulkOptions, schema_cache: Option<Arc<SchemaCache>>) -> Self {
        let mut registry = Self::new();
        registry.register(SqlServerBulkActionFactory::new(
            options.clone(),
            schema_cache.clone(),
        ));
        registry.register(MsAccessBulkActionFactory::new(options, schema_cache));
        registry
    }

    pub fn register(&mut self, factory: impl BulkActionFactory + 'static) -> &mut Self {
        self.factories.push(Arc::new(factory));
        self
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn find_factory(&self, connection: &Connection<'_>) -> Result<&dyn BulkActionFactory> {
        self.factories
            .iter()
            .rev()
            .find(|f| f.supports_connection(connection))
            .map(|f| f.as_ref())
            .ok_or_else(|| {
                BulkError::unsupported_connection("BulkActionRegistry", connection.type_name())
            })
    }

    pub fn create_bulk_insert(
        &self,
        connection: &Connection<'_>,
        destination_table_name: &str,
    ) -> Result<Box<dyn BulkInsert>> {
        self.find_factory(connection)?
            .create_bulk_insert(destination_table_name)
    }

    pub fn create_bulk_update(
        &self,
        connection: &Connection<'_>,
        destination_table_name: &str,
        primary_key_column: &str,
    ) -> Result<Box<dyn BulkUpdate>> {
        self.find_factory(connection)?
            .create_bulk_update(destination_table_name, primary_key_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{MsAccessConnection, SqlServerConnection};

    #[test]
    fn test_builtins_dispatch_by_connection() {
        let registry = BulkActionRegistry::with_builtins();
        assert_eq!(registry.len(), 2);

        let mut sql = SqlServerConnection::new("Server=db01;Database=Sales").unwrap();
        let conn = Connection::from(&mut sql);
        assert_eq!(
            registry.find_factory(&conn).unwrap().name(),
            "SqlServerBulkActionFactory"
        );
        let insert = registry.create_bulk_insert(&conn, "Orders").unwrap();
        assert_eq!(insert.destination_table_name(), "Orders");

        let mut access = MsAccessConnection::from_path("/data/a.accdb").unwrap();
        let conn = Connection::from(&mut access);
        let update = registry.create_bulk_update(&conn, "Items", "Id").unwrap();
        assert_eq!(update.primary_key_column(), "Id");
    }

    #[test]
    fn test_empty_registry_rejects_connection() {
        let registry = BulkActionRegistry::new();
        let mut sql = SqlServerConnection::new("Server=db01;Database=Sales").unwrap();
        let err = registry
            .create_bulk_insert(&Connection::from(&mut sql), "Orders")
            .err()
            .unwrap();
        assert!(matches!(err, BulkError::UnsupportedConnection { ref actual, .. } if actual == "SqlServerConnection"));
    }

    #[test]
    fn test_invalid_options_surface_on_create() {
        let options = BulkOptions {
            delimiter: '"',
            ..BulkOptions::default()
        };
        let registry = BulkActionRegistry::with_options(options, None);
        let mut access = MsAccessConnection::from_path("/data/a.accdb").unwrap();
        assert!(registry
            .create_bulk_insert(&Connection::from(&mut access), "Items")
            .is_err());
    }
}
