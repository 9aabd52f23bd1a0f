//! Loader dispatch without caching.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{MsAccessSchemaLoader, SchemaLoader, SqlServerSchemaLoader};
use crate::drivers::Connection;
use crate::error::{BulkError, Result};
use crate::schema::{DatabaseSchema, TableSchema};

/// Ordered list of schema loaders. The first loader that supports a
/// connection handles it.
#[derive(Clone, Default)]
pub struct SchemaLoaders {
    loaders: Vec<Arc<dyn SchemaLoader>>,
}

impl fmt::Debug for SchemaLoaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.loaders.iter().map(|l| l.name()))
            .finish()
    }
}

impl SchemaLoaders {
    /// Empty facade; register loaders with [`register`](Self::register).
    pub fn new() -> Self {
        Self::default()
    }

    /// SQL Server and Access loaders with default settings.
    pub fn with_builtins() -> Self {
        let mut loaders = Self::new();
        loaders.register(SqlServerSchemaLoader::new());
        loaders.register(MsAccessSchemaLoader::new());
        loaders
    }

    pub fn register(&mut self, loader: impl SchemaLoader + 'static) -> &mut Self {
        self.loaders.push(Arc::new(loader));
        self
    }

    pub fn register_shared(&mut self, loader: Arc<dyn SchemaLoader>) -> &mut Self {
        self.loaders.push(loader);
        self
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// First loader supporting `connection`.
    pub fn find_loader(&self, connection: &Connection<'_>) -> Result<&dyn SchemaLoader> {
        self.loaders
            .iter()
            .find(|l| l.supports_connection(connection))
            .map(|l| l.as_ref())
            .ok_or_else(|| BulkError::NoLoaderRegistered(connection.type_name().to_string()))
    }

    pub async fn load_schema(&self, connection: Connection<'_>) -> Result<DatabaseSchema> {
        let loader = self.find_loader(&connection)?;
        debug!("Loading schema with {}", loader.name());
        loader.load_schema(connection).await
    }

    pub async fn load_table_schema(
        &self,
        connection: Connection<'_>,
        table_name: &str,
    ) -> Result<Option<TableSchema>> {
        let loader = self.find_loader(&connection)?;
        debug!("Loading table {} with {}", table_name, loader.name());
        loader.load_table_schema(connection, table_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{MsAccessConnection, SqlServerConnection};

    #[test]
    fn test_find_loader_in_registration_order() {
        let loaders = SchemaLoaders::with_builtins();
        let mut sql = SqlServerConnection::new("Server=db01;Database=Sales").unwrap();
        let mut access = MsAccessConnection::from_path("/data/a.accdb").unwrap();

        assert_eq!(
            loaders.find_loader(&Connection::from(&mut sql)).unwrap().name(),
            "SqlServerSchemaLoader"
        );
        assert_eq!(
            loaders.find_loader(&Connection::from(&mut access)).unwrap().name(),
            "MsAccessSchemaLoader"
        );
    }

    #[test]
    fn test_no_loader_registered() {
        let mut loaders = SchemaLoaders::new();
        loaders.register(MsAccessSchemaLoader::new());
        let mut sql = SqlServerConnection::new("Server=db01;Database=Sales").unwrap();

        let err = loaders.find_loader(&Connection::from(&mut sql)).unwrap_err();
        assert!(matches!(err, BulkError::NoLoaderRegistered(ref t) if t == "SqlServerConnection"));
    }
}
