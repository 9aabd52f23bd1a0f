//! Process-wide schema cache keyed per server and database.

use std::fmt;
use std::fs;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::{MsAccessSchemaLoader, SchemaLoader, SqlServerSchemaLoader};
use crate::drivers::Connection;
use crate::error::{BulkError, Result};
use crate::schema::{DatabaseSchema, TableSchema};

/// Computes the cache key of a connection.
///
/// Two connections to the same database must produce the same key.
pub trait CacheKeyGenerator: Send + Sync {
    fn cache_key(&self, connection: &Connection<'_>) -> Result<String>;
}

impl<F> CacheKeyGenerator for F
where
    F: Fn(&Connection<'_>) -> Result<String> + Send + Sync,
{
    fn cache_key(&self, connection: &Connection<'_>) -> Result<String> {
        self(connection)
    }
}

/// `SqlServer:SERVER\database`.
pub fn sql_server_cache_key(connection: &Connection<'_>) -> Result<String> {
    match connection {
        Connection::SqlServer(conn) => {
            let database = conn
                .database()
                .ok_or(BulkError::MissingConnectionAttribute("Initial Catalog"))?;
            Ok(format!(
                "SqlServer:{}\\{}",
                conn.data_source().to_uppercase(),
                database.to_lowercase()
            ))
        }
        other => Err(BulkError::unsupported_connection(
            "sql_server_cache_key",
            other.type_name(),
        )),
    }
}

/// `MsAccess:<lowercase database path>`. The path is canonicalized when the
/// file exists, so relative and absolute spellings share a key.
pub fn ms_access_cache_key(connection: &Connection<'_>) -> Result<String> {
    match connection {
        Connection::MsAccess(conn) => {
            let path = conn.database_path();
            let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            Ok(format!(
                "MsAccess:{}",
                path.display().to_string().to_lowercase()
            ))
        }
        other => Err(BulkError::unsupported_connection(
            "ms_access_cache_key",
            other.type_name(),
        )),
    }
}

struct Registration {
    loader: Arc<dyn SchemaLoader>,
    keys: Arc<dyn CacheKeyGenerator>,
}

/// Caches loaded schemas until explicitly cleared.
///
/// Shared through an `Arc`; concurrent misses for the same key may each load,
/// but only the first stored schema is kept and returned to every caller.
#[derive(Default)]
pub struct SchemaCache {
    registrations: Vec<Registration>,
    schemas: DashMap<String, Arc<DatabaseSchema>>,
}

impl fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaCache")
            .field(
                "loaders",
                &self
                    .registrations
                    .iter()
                    .map(|r| r.loader.name())
                    .collect::<Vec<_>>(),
            )
            .field("cached", &self.schemas.len())
            .finish()
    }
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache with the SQL Server and Access loaders and key generators.
    pub fn with_builtins() -> Self {
        let mut cache = Self::new();
        cache.register(SqlServerSchemaLoader::new(), sql_server_cache_key);
        cache.register(MsAccessSchemaLoader::new(), ms_access_cache_key);
        cache
    }

    /// Add a loader and the key generator for the connections it supports.
    pub fn register(
        &mut self,
        loader: impl SchemaLoader + 'static,
        keys: impl CacheKeyGenerator + 'static,
    ) -> &mut Self {
        self.registrations.push(Registration {
            loader: Arc::new(loader),
            keys: Arc::new(keys),
        });
        self
    }

    fn resolve(&self, connection: &Connection<'_>) -> Result<(&dyn SchemaLoader, String)> {
        let registration = self
            .registrations
            .iter()
            .find(|r| r.loader.supports_connection(connection))
            .ok_or_else(|| BulkError::NoLoaderRegistered(connection.type_name().to_string()))?;
        let key = registration.keys.cache_key(connection)?;
        Ok((registration.loader.as_ref(), key))
    }

    /// Cache key `connection` resolves to.
    pub fn cache_key(&self, connection: &Connection<'_>) -> Result<String> {
        self.resolve(connection).map(|(_, key)| key)
    }

    /// Cached schema for `connection`, loading it on a miss.
    pub async fn get_schema(&self, connection: Connection<'_>) -> Result<Arc<DatabaseSchema>> {
        let (loader, key) = self.resolve(&connection)?;

        let cached = self.schemas.get(&key).map(|s| Arc::clone(s.value()));
        if let Some(schema) = cached {
            debug!("Schema cache hit for {}", key);
            return Ok(schema);
        }

        debug!("Schema cache miss for {}, loading with {}", key, loader.name());
        let loaded = Arc::new(loader.load_schema(connection).await?);
        let stored = Arc::clone(self.schemas.entry(key).or_insert(loaded).value());
        Ok(stored)
    }

    /// One table of the cached schema, cloned.
    pub async fn get_table_schema(
        &self,
        connection: Connection<'_>,
        table_name: &str,
    ) -> Result<Option<TableSchema>> {
        let schema = self.get_schema(connection).await?;
        Ok(schema.table(table_name).cloned())
    }

    /// Drop the cached schema for `connection`. Returns true if one was cached.
    pub fn clear_schema(&self, connection: &Connection<'_>) -> Result<bool> {
        let (_, key) = self.resolve(connection)?;
        let removed = self.schemas.remove(&key).is_some();
        if removed {
            info!("Cleared cached schema {}", key);
        }
        Ok(removed)
    }

    /// Reload the schema for `connection` and replace the cached copy.
    pub async fn refresh_schema(&self, connection: Connection<'_>) -> Result<Arc<DatabaseSchema>> {
        let (loader, key) = self.resolve(&connection)?;
        let loaded = Arc::new(loader.load_schema(connection).await?);
        self.schemas.insert(key.clone(), Arc::clone(&loaded));
        info!("Refreshed cached schema {}", key);
        Ok(loaded)
    }

    pub fn clear_all_schemas(&self) {
        let count = self.schemas.len();
        self.schemas.clear();
        info!("Cleared {} cached schemas", count);
    }

    /// Number of cached schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::drivers::{MsAccessConnection, SqlServerConnection};
    use crate::schema::ColumnSchema;
    use crate::schema::SqlDbType;

    #[derive(Default)]
    struct CountingLoader {
        loads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SchemaLoader for CountingLoader {
        fn name(&self) -> &'static str {
            "CountingLoader"
        }

        fn supports_connection(&self, connection: &Connection<'_>) -> bool {
            matches!(connection, Connection::SqlServer(_))
        }

        async fn load_schema(&self, _connection: Connection<'_>) -> Result<DatabaseSchema> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let mut db = DatabaseSchema::new("Sales")?;
            let mut table = TableSchema::new("Orders")?;
            table
                .columns_mut()
                .add(ColumnSchema::sql_server("Id", SqlDbType::Int)?)?;
            db.tables_mut().add(table)?;
            Ok(db)
        }

        async fn load_table_schema(
            &self,
            _connection: Connection<'_>,
            _table_name: &str,
        ) -> Result<Option<TableSchema>> {
            Ok(None)
        }
    }

    fn counting_cache() -> (SchemaCache, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let mut cache = SchemaCache::new();
        cache.register(
            CountingLoader {
                loads: Arc::clone(&loads),
            },
            sql_server_cache_key,
        );
        (cache, loads)
    }

    #[test]
    fn test_sql_server_key_normalizes_case() {
        let mut a = SqlServerConnection::new("Server=db01\\SQL2019;Database=Sales").unwrap();
        let mut b = SqlServerConnection::new("Data Source=DB01\\sql2019;Initial Catalog=SALES;User Id=x")
            .unwrap();
        let ka = sql_server_cache_key(&Connection::from(&mut a)).unwrap();
        let kb = sql_server_cache_key(&Connection::from(&mut b)).unwrap();
        assert_eq!(ka, "SqlServer:DB01\\SQL2019\\sales");
        assert_eq!(ka, kb);
    }

    #[test]
    fn test_access_key_is_lowercase_path() {
        let mut conn = MsAccessConnection::from_path("C:\\Data\\Shop.accdb").unwrap();
        assert_eq!(
            ms_access_cache_key(&Connection::from(&mut conn)).unwrap(),
            "MsAccess:c:\\data\\shop.accdb"
        );
    }

    #[test]
    fn test_access_key_resolves_existing_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("Shop.accdb"), b"").unwrap();

        let mut direct = MsAccessConnection::from_path(dir.path().join("Shop.accdb")).unwrap();
        let mut dotted =
            MsAccessConnection::from_path(dir.path().join("sub").join("..").join("Shop.accdb"))
                .unwrap();
        let a = ms_access_cache_key(&Connection::from(&mut direct)).unwrap();
        let b = ms_access_cache_key(&Connection::from(&mut dotted)).unwrap();
        assert_eq!(a, b);
        assert!(!a.contains(".."));
    }

    #[tokio::test]
    async fn test_same_database_shares_one_schema() {
        let (cache, loads) = counting_cache();
        let mut a = SqlServerConnection::new("Server=db01;Database=Sales").unwrap();
        let mut b = SqlServerConnection::new("Server=DB01;Initial Catalog=sales").unwrap();

        let first = cache.get_schema(Connection::from(&mut a)).await.unwrap();
        let second = cache.get_schema(Connection::from(&mut b)).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_and_refresh() {
        let (cache, loads) = counting_cache();
        let mut conn = SqlServerConnection::new("Server=db01;Database=Sales").unwrap();

        let first = cache.get_schema(Connection::from(&mut conn)).await.unwrap();
        let refreshed = cache.refresh_schema(Connection::from(&mut conn)).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert_eq!(loads.load(Ordering::SeqCst), 2);

        assert!(cache.clear_schema(&Connection::from(&mut conn)).unwrap());
        assert!(!cache.clear_schema(&Connection::from(&mut conn)).unwrap());
        assert!(cache.is_empty());

        let table = cache
            .get_table_schema(Connection::from(&mut conn), "orders")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(table.name(), "Orders");
        cache.clear_all_schemas();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_vendor() {
        let (cache, _) = counting_cache();
        let mut access = MsAccessConnection::from_path("/data/a.accdb").unwrap();
        let err = cache
            .get_schema(Connection::from(&mut access))
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::NoLoaderRegistered(_)));
    }
}
