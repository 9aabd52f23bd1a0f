//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;
use std::sync::Arc;

use crate::bulk::BulkActionRegistry;
use crate::drivers::{MsAccessConnection, SqlServerConnection};
use crate::error::{BulkError, Result};
use crate::loader::SchemaCache;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Closed SQL Server connection for the configured server.
    pub fn sql_server_connection(&self) -> Result<SqlServerConnection> {
        let sql = self
            .sql_server
            .as_ref()
            .ok_or_else(|| BulkError::Config("sql_server is not configured".into()))?;
        SqlServerConnection::new(sql.connection_string())
    }

    /// Closed Access connection for the configured database file.
    pub fn ms_access_connection(&self) -> Result<MsAccessConnection> {
        let access = self
            .ms_access
            .as_ref()
            .ok_or_else(|| BulkError::Config("ms_access is not configured".into()))?;
        MsAccessConnection::new(access.connection_string())
    }

    /// Registry of the built-in bulk action factories using [`Config::bulk`].
    pub fn bulk_action_registry(&self, schema_cache: Option<Arc<SchemaCache>>) -> BulkActionRegistry {
        BulkActionRegistry::with_options(self.bulk.clone(), schema_cache)
    }
}

impl SqlServerConfig {
    /// Build an ADO-style connection string for tiberius.
    pub fn connection_string(&self) -> String {
        let encrypt = match self.encrypt.to_lowercase().as_str() {
            "true" | "yes" | "1" => "true",
            "false" | "no" | "0" | "disable" => "false",
            _ => "true",
        };

        let server = match &self.instance {
            Some(instance) => format!("{}\\{}", self.host, instance),
            None => format!("tcp:{},{}", self.host, self.port),
        };

        format!(
            "Server={};Database={};User Id={};Password={};Encrypt={};TrustServerCertificate={}",
            server, self.database, self.user, self.password, encrypt, self.trust_server_cert
        )
    }
}

impl MsAccessConfig {
    /// Build an ODBC connection string for the Access driver.
    pub fn connection_string(&self) -> String {
        let mut s = format!(
            "Driver={{{}}};Dbq={};",
            self.driver,
            self.database_path.display()
        );
        if let Some(password) = &self.password {
            s.push_str(&format!("Pwd={{{}}};", password));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
sql_server:
  host: db01
  database: Sales
  user: loader
  password: secret
ms_access:
  database_path: /data/orders.accdb
bulk:
  batch_size: 5000
  delimiter: ";"
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        let sql = config.sql_server.as_ref().unwrap();
        assert_eq!(sql.port, 1433);
        assert_eq!(sql.encrypt, "true");
        assert_eq!(config.bulk.batch_size, 5000);
        assert_eq!(config.bulk.delimiter, ';');
        assert!(config.bulk.table_lock);
        assert_eq!(
            config.ms_access.as_ref().unwrap().driver,
            "Microsoft Access Driver (*.mdb, *.accdb)"
        );
    }

    #[test]
    fn test_from_yaml_validates() {
        let yaml = "bulk:\n  batch_size: 10\n";
        assert!(matches!(Config::from_yaml(yaml), Err(BulkError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bulk.yaml");
        std::fs::write(&path, YAML).unwrap();
        let config = Config::load(&path).unwrap();
        assert!(config.sql_server.is_some());
    }

    #[test]
    fn test_sql_server_connection_string() {
        let config = Config::from_yaml(YAML).unwrap();
        let sql = config.sql_server.unwrap();
        assert_eq!(
            sql.connection_string(),
            "Server=tcp:db01,1433;Database=Sales;User Id=loader;Password=secret;Encrypt=true;TrustServerCertificate=false"
        );
    }

    #[test]
    fn test_named_instance_connection_string() {
        let mut config = Config::from_yaml(YAML).unwrap();
        let sql = config.sql_server.as_mut().unwrap();
        sql.instance = Some("SQL2019".to_string());
        sql.encrypt = "no".to_string();
        let s = sql.connection_string();
        assert!(s.starts_with("Server=db01\\SQL2019;"));
        assert!(s.contains("Encrypt=false"));

        let conn = config.sql_server_connection().unwrap();
        assert_eq!(conn.data_source(), "db01\\SQL2019");
        assert_eq!(conn.database(), Some("Sales"));
    }

    #[test]
    fn test_access_connection_string() {
        let mut config = Config::from_yaml(YAML).unwrap();
        config.ms_access.as_mut().unwrap().password = Some("pw".to_string());
        let access = config.ms_access.as_ref().unwrap();
        assert_eq!(
            access.connection_string(),
            "Driver={Microsoft Access Driver (*.mdb, *.accdb)};Dbq=/data/orders.accdb;Pwd={pw};"
        );

        let conn = config.ms_access_connection().unwrap();
        assert_eq!(conn.database_path(), Path::new("/data/orders.accdb"));
    }

    #[test]
    fn test_missing_section_connection_fails() {
        let mut config = Config::from_yaml(YAML).unwrap();
        config.ms_access = None;
        assert!(config.ms_access_connection().is_err());
    }

    #[test]
    fn test_registry_from_config() {
        let config = Config::from_yaml(YAML).unwrap();
        let registry = config.bulk_action_registry(None);
        assert_eq!(registry.len(), 2);
    }
}
