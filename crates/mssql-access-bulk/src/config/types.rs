//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::drivers::access::DEFAULT_ACCESS_DRIVER;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// SQL Server destination, if any.
    #[serde(default)]
    pub sql_server: Option<SqlServerConfig>,

    /// Access destination, if any.
    #[serde(default)]
    pub ms_access: Option<MsAccessConfig>,

    /// Options shared by every bulk action.
    #[serde(default)]
    pub bulk: BulkOptions,
}

/// SQL Server connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SqlServerConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433). Ignored when `instance` is set.
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Named instance, resolved through the SQL Browser service.
    #[serde(default)]
    pub instance: Option<String>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Encrypt connection (default: "true").
    #[serde(default = "default_true_string")]
    pub encrypt: String,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl fmt::Debug for SqlServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("instance", &self.instance)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Access database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct MsAccessConfig {
    /// Path of the `.mdb` or `.accdb` file.
    pub database_path: PathBuf,

    /// Database password, if the file is protected.
    #[serde(default)]
    pub password: Option<String>,

    /// ODBC driver name.
    #[serde(default = "default_access_driver")]
    pub driver: String,
}

impl fmt::Debug for MsAccessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsAccessConfig")
            .field("database_path", &self.database_path)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("driver", &self.driver)
            .finish()
    }
}

/// Tuning shared by bulk insert and bulk update engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkOptions {
    /// Rows per SQL Server batch; 0 sends everything in one batch.
    #[serde(default)]
    pub batch_size: i64,

    /// Seconds before a SQL Server bulk load times out; 0 waits forever.
    #[serde(default)]
    pub bulk_insert_timeout_secs: i64,

    /// Take an exclusive table lock for the load (default: true).
    #[serde(default = "default_true")]
    pub table_lock: bool,

    /// Commit each batch in its own transaction when the caller has none (default: true).
    #[serde(default = "default_true")]
    pub use_internal_transaction: bool,

    /// Field delimiter of the Access staging file (default: ',').
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Code page of the Access staging file (default: 65001, UTF-8).
    #[serde(default = "default_code_page")]
    pub code_page: u32,

    /// Empty database copied for each Access bulk update.
    #[serde(default)]
    pub temp_database_template: Option<PathBuf>,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            batch_size: 0,
            bulk_insert_timeout_secs: 0,
            table_lock: true,
            use_internal_transaction: true,
            delimiter: default_delimiter(),
            code_page: default_code_page(),
            temp_database_template: None,
        }
    }
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_true_string() -> String {
    "true".to_string()
}

fn default_true() -> bool {
    true
}

fn default_access_driver() -> String {
    DEFAULT_ACCESS_DRIVER.to_string()
}

fn default_delimiter() -> char {
    ','
}

fn default_code_page() -> u32 {
    65001
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_options_defaults() {
        let options = BulkOptions::default();
        assert_eq!(options.batch_size, 0);
        assert!(options.table_lock);
        assert!(options.use_internal_transaction);
        assert_eq!(options.delimiter, ',');
        assert_eq!(options.code_page, 65001);
        assert!(options.temp_database_template.is_none());
    }

    #[test]
    fn test_serde_defaults_match_default_impl() {
        let options: BulkOptions = serde_yaml::from_str("{}").unwrap();
        assert_eq!(options, BulkOptions::default());
    }

    #[test]
    fn test_sql_server_debug_redacts_password() {
        let config = SqlServerConfig {
            host: "db01".to_string(),
            port: 1433,
            instance: None,
            database: "Sales".to_string(),
            user: "sa".to_string(),
            password: "super_secret_password".to_string(),
            encrypt: "true".to_string(),
            trust_server_cert: false,
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super_secret_password"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("db01"));
    }

    #[test]
    fn test_ms_access_debug_redacts_password() {
        let config = MsAccessConfig {
            database_path: PathBuf::from("/data/orders.accdb"),
            password: Some("hunter2".to_string()),
            driver: default_access_driver(),
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("hunter2"));
        assert!(debug_output.contains("orders.accdb"));
    }
}
