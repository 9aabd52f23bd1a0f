//! SQL Server connection over tiberius.

use std::fmt;
use std::time::Duration;

use tiberius::{Client, Config, Row, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use crate::drivers::connection_string;
use crate::error::{require_name, BulkError, Result};

/// TCP keepalive interval (30 seconds).
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Tiberius client type used throughout the crate.
pub type SqlClient = Client<Compat<TcpStream>>;

/// SQL Server connection built from an ADO.NET-style connection string.
///
/// The connection starts closed. A transaction begun with
/// [`begin_transaction`](Self::begin_transaction) is owned by the caller; bulk
/// operations that see it never commit or roll it back.
pub struct SqlServerConnection {
    connection_string: String,
    data_source: String,
    database: Option<String>,
    client: Option<SqlClient>,
    in_transaction: bool,
}

impl fmt::Debug for SqlServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlServerConnection")
            .field("data_source", &self.data_source)
            .field("database", &self.database)
            .field("open", &self.client.is_some())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

impl SqlServerConnection {
    pub fn new(connection_string: impl Into<String>) -> Result<Self> {
        let connection_string = connection_string.into();
        require_name("connection_string", &connection_string)?;

        let pairs = connection_string::parse(&connection_string);
        let data_source = connection_string::get(
            &pairs,
            &["server", "data source", "address", "addr", "network address"],
        )
        .map(|s| s.trim_start_matches("tcp:").to_string())
        .unwrap_or_else(|| "localhost".to_string());
        let database =
            connection_string::get(&pairs, &["database", "initial catalog"]).map(str::to_string);

        Ok(Self {
            connection_string,
            data_source,
            database,
            client: None,
            in_transaction: false,
        })
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Server part of the connection string (`host`, `host\instance` or `host,port`).
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// Initial catalog, if the connection string names one.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Closed connection with the same connection string.
    pub fn try_clone(&self) -> Result<Self> {
        Self::new(self.connection_string.clone())
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    /// Open the connection. Does nothing when already open.
    pub async fn open(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }

        let config = Config::from_ado_string(&self.connection_string)?;
        let tcp = connect_tcp(&config).await?;
        let client = Client::connect(config, tcp.compat_write()).await?;

        info!(
            "Connected to SQL Server {} (database: {})",
            self.data_source,
            self.database.as_deref().unwrap_or("<default>")
        );
        self.client = Some(client);
        Ok(())
    }

    /// [`open`](Self::open) for callers without a runtime of their own.
    pub fn open_blocking(&mut self) -> Result<()> {
        crate::runtime::block_on(self.open())
    }

    pub fn close_blocking(&mut self) -> Result<()> {
        crate::runtime::block_on(self.close())
    }

    /// Close the connection. A pending transaction is rolled back by the server.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            if self.in_transaction {
                warn!(
                    "Closing SQL Server connection to {} with an open transaction",
                    self.data_source
                );
            }
            self.in_transaction = false;
            client.close().await?;
            debug!("Closed SQL Server connection to {}", self.data_source);
        }
        Ok(())
    }

    /// True while a caller-begun transaction is active.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub async fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(BulkError::InvalidOperation(
                "a transaction is already active on this connection".into(),
            ));
        }
        self.execute("BEGIN TRANSACTION").await?;
        self.in_transaction = true;
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.end_transaction("COMMIT TRANSACTION").await
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.end_transaction("ROLLBACK TRANSACTION").await
    }

    async fn end_transaction(&mut self, sql: &str) -> Result<()> {
        if !self.in_transaction {
            return Err(BulkError::InvalidOperation(
                "no transaction is active on this connection".into(),
            ));
        }
        self.execute(sql).await?;
        self.in_transaction = false;
        Ok(())
    }

    /// Borrow the open client.
    pub fn client_mut(&mut self) -> Result<&mut SqlClient> {
        self.client.as_mut().ok_or(BulkError::ConnectionClosed)
    }

    /// Execute a plain batch in session scope. Temp tables it creates
    /// survive until the connection closes.
    pub async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("Executing: {}", sql);
        self.client_mut()?
            .simple_query(sql)
            .await?
            .into_results()
            .await?;
        Ok(())
    }

    /// Execute a statement, returning the affected row count.
    pub async fn execute_count(&mut self, sql: &str) -> Result<u64> {
        debug!("Executing: {}", sql);
        let result = self.client_mut()?.execute(sql, &[]).await?;
        Ok(result.total())
    }

    /// Run a query and collect the rows of its first result set.
    pub async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        let stream = self.client_mut()?.simple_query(sql).await?;
        Ok(stream.into_first_result().await?)
    }
}

/// Open the TCP stream for `config`, resolving named instances through the
/// SQL Browser service, with nodelay and keepalive set.
async fn connect_tcp(config: &Config) -> Result<TcpStream> {
    let tcp = TcpStream::connect_named(config).await?;
    tcp.set_nodelay(true).ok();

    let std_tcp = match tcp.into_std() {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to configure TCP keepalives on SQL Server connection: {}", e);
            let tcp = TcpStream::connect_named(config).await?;
            tcp.set_nodelay(true).ok();
            return Ok(tcp);
        }
    };

    let socket = socket2::Socket::from(std_tcp);
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(TCP_KEEPALIVE_INTERVAL)
        .with_interval(TCP_KEEPALIVE_INTERVAL);
    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        warn!("Failed to set TCP keepalive on SQL Server connection: {}", e);
    }

    let std_tcp: std::net::TcpStream = socket.into();
    std_tcp.set_nonblocking(true)?;
    Ok(TcpStream::from_std(std_tcp)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_attributes() {
        let conn =
            SqlServerConnection::new("Data Source=tcp:db01\\SQL2019;Initial Catalog=Sales;Integrated Security=true")
                .unwrap();
        assert_eq!(conn.data_source(), "db01\\SQL2019");
        assert_eq!(conn.database(), Some("Sales"));
        assert!(!conn.is_open());
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_missing_database_is_none() {
        let conn = SqlServerConnection::new("Server=db01;User Id=sa;Password=x").unwrap();
        assert_eq!(conn.database(), None);
    }

    #[test]
    fn test_blank_connection_string_rejected() {
        assert!(SqlServerConnection::new("  ").is_err());
    }

    #[test]
    fn test_clone_is_closed_and_equivalent() {
        let conn = SqlServerConnection::new("Server=db01;Database=Sales").unwrap();
        let clone = conn.try_clone().unwrap();
        assert_eq!(clone.connection_string(), conn.connection_string());
        assert!(!clone.is_open());
    }

    #[test]
    fn test_debug_hides_connection_string() {
        let conn = SqlServerConnection::new("Server=db01;Database=Sales;Password=hunter2").unwrap();
        assert!(!format!("{:?}", conn).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_operations_on_closed_connection_fail() {
        let mut conn = SqlServerConnection::new("Server=db01;Database=Sales").unwrap();
        assert!(matches!(
            conn.execute("SELECT 1").await,
            Err(BulkError::ConnectionClosed)
        ));
        assert!(conn.commit().await.is_err());
        conn.close().await.unwrap();
    }
}
