//! Microsoft Access connection over ODBC.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::OnceLock;

use odbc_api::handles::{AsStatementRef, Statement};
use odbc_api::{
    buffers::TextRowSet, ConnectionOptions, Cursor, CursorImpl, Environment, ResultSetMetadata,
};
use tracing::{debug, info, warn};

use crate::drivers::connection_string;
use crate::error::{require_name, BulkError, Result};

/// Default ODBC driver for `.mdb` and `.accdb` files.
pub const DEFAULT_ACCESS_DRIVER: &str = "Microsoft Access Driver (*.mdb, *.accdb)";

/// Rows fetched per catalog batch.
const FETCH_BATCH_SIZE: usize = 1000;

/// Longest text value fetched from a catalog column.
const MAX_TEXT_LEN: usize = 4096;

/// `SQLStatistics` arguments: every index, cardinality may be approximate.
const SQL_INDEX_ALL: u16 = 1;
const SQL_QUICK: u16 = 0;

mod ffi {
    use std::ffi::c_void;

    // odbc-api has no wrapper for SQLStatistics; the driver manager odbc-api
    // links against exports it.
    #[cfg_attr(windows, link(name = "odbc32"))]
    #[cfg_attr(not(windows), link(name = "odbc"))]
    extern "system" {
        #[allow(clippy::too_many_arguments)]
        pub fn SQLStatisticsW(
            statement: *mut c_void,
            catalog_name: *const u16,
            catalog_name_len: i16,
            schema_name: *const u16,
            schema_name_len: i16,
            table_name: *const u16,
            table_name_len: i16,
            unique: u16,
            reserved: u16,
        ) -> i16;
    }
}

static ODBC_ENV: OnceLock<Environment> = OnceLock::new();

/// Process-wide ODBC environment, created on first use.
fn odbc_environment() -> Result<&'static Environment> {
    if let Some(env) = ODBC_ENV.get() {
        return Ok(env);
    }
    let env = Environment::new()?;
    Ok(ODBC_ENV.get_or_init(|| env))
}

/// Text rows of a result set; `None` marks SQL NULL.
pub type TextRows = Vec<Vec<Option<String>>>;

/// Access database connection built from an ODBC connection string.
///
/// ODBC calls block the calling thread. The connection starts closed.
pub struct MsAccessConnection {
    connection_string: String,
    database_path: PathBuf,
    conn: Option<odbc_api::Connection<'static>>,
    in_transaction: bool,
}

impl fmt::Debug for MsAccessConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsAccessConnection")
            .field("database_path", &self.database_path)
            .field("open", &self.conn.is_some())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

impl MsAccessConnection {
    /// Create from an ODBC connection string naming the database file with `Dbq`.
    pub fn new(connection_string: impl Into<String>) -> Result<Self> {
        let connection_string = connection_string.into();
        require_name("connection_string", &connection_string)?;

        let pairs = connection_string::parse(&connection_string);
        let database_path = connection_string::get(&pairs, &["dbq", "data source"])
            .map(PathBuf::from)
            .ok_or(BulkError::MissingConnectionAttribute("Dbq"))?;

        Ok(Self {
            connection_string,
            database_path,
            conn: None,
            in_transaction: false,
        })
    }

    /// Connection to a database file through the default Access driver.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(format!(
            "Driver={{{}}};Dbq={};",
            DEFAULT_ACCESS_DRIVER,
            path.as_ref().display()
        ))
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Path of the database file.
    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// Closed connection with the same connection string.
    pub fn try_clone(&self) -> Result<Self> {
        Self::new(self.connection_string.clone())
    }

    /// Closed connection to another database file, keeping driver and credentials.
    pub fn with_database_path(&self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().display().to_string();
        let rendered: Vec<String> = connection_string::parse(&self.connection_string)
            .into_iter()
            .map(|(key, value)| {
                let value = if key == "dbq" || key == "data source" {
                    path.clone()
                } else {
                    value
                };
                if value.contains(';') || key == "driver" {
                    format!("{}={{{}}}", key, value)
                } else {
                    format!("{}={}", key, value)
                }
            })
            .collect();
        Self::new(rendered.join(";"))
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Open the connection. Does nothing when already open.
    pub fn open(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = odbc_environment()?
            .connect_with_connection_string(&self.connection_string, ConnectionOptions::default())?;
        info!("Connected to Access database {}", self.database_path.display());
        self.conn = Some(conn);
        Ok(())
    }

    /// Close the connection, rolling back an uncommitted transaction.
    pub fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            if self.in_transaction {
                warn!(
                    "Closing Access connection to {} with an open transaction, rolling back",
                    self.database_path.display()
                );
                if let Err(e) = conn.rollback() {
                    warn!("Rollback on close failed: {}", e);
                }
                self.in_transaction = false;
            }
            drop(conn);
            debug!("Closed Access connection to {}", self.database_path.display());
        }
        Ok(())
    }

    /// True while a caller-begun transaction is active.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(BulkError::InvalidOperation(
                "a transaction is already active on this connection".into(),
            ));
        }
        self.odbc()?.set_autocommit(false)?;
        self.in_transaction = true;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.end_transaction(true)
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.end_transaction(false)
    }

    fn end_transaction(&mut self, commit: bool) -> Result<()> {
        if !self.in_transaction {
            return Err(BulkError::InvalidOperation(
                "no transaction is active on this connection".into(),
            ));
        }
        let conn = self.odbc()?;
        if commit {
            conn.commit()?;
        } else {
            conn.rollback()?;
        }
        conn.set_autocommit(true)?;
        self.in_transaction = false;
        Ok(())
    }

    fn odbc(&self) -> Result<&odbc_api::Connection<'static>> {
        self.conn.as_ref().ok_or(BulkError::ConnectionClosed)
    }

    /// Execute a statement, discarding any result set.
    pub fn execute(&self, sql: &str) -> Result<()> {
        debug!("Executing: {}", sql);
        self.odbc()?.execute(sql, ())?;
        Ok(())
    }

    /// Run a query and fetch every row as text.
    pub fn query(&self, sql: &str) -> Result<TextRows> {
        match self.odbc()?.execute(sql, ())? {
            Some(cursor) => collect_text_rows(cursor),
            None => Ok(Vec::new()),
        }
    }

    /// Catalog rows describing user tables (`SQLTables`).
    pub fn catalog_tables(&self) -> Result<TextRows> {
        collect_text_rows(self.odbc()?.tables("", "", "", "TABLE")?)
    }

    /// Catalog rows describing columns (`SQLColumns`), optionally for one table.
    pub fn catalog_columns(&self, table: Option<&str>) -> Result<TextRows> {
        collect_text_rows(self.odbc()?.columns("", "", table.unwrap_or(""), "")?)
    }

    /// Catalog rows describing the primary key of a table (`SQLPrimaryKeys`).
    /// The Access driver does not implement it.
    pub fn catalog_primary_keys(&self, table: &str) -> Result<TextRows> {
        collect_text_rows(self.odbc()?.primary_keys(None, None, table)?)
    }

    /// Catalog rows describing the indexes of a table (`SQLStatistics`).
    pub fn catalog_statistics(&self, table: &str) -> Result<TextRows> {
        let name: Vec<u16> = table.encode_utf16().collect();
        let name_len = i16::try_from(name.len())
            .map_err(|_| BulkError::invalid_argument("table", "name is too long"))?;

        let mut statement = self.odbc()?.preallocate()?;
        let stmt = statement.as_stmt_ref();
        // SAFETY: `stmt` is a live statement handle of this connection and
        // `name` outlives the call. Null catalog and schema mean "any".
        let code = unsafe {
            ffi::SQLStatisticsW(
                stmt.as_sys() as *mut c_void,
                ptr::null(),
                0,
                ptr::null(),
                0,
                name.as_ptr(),
                name_len,
                SQL_INDEX_ALL,
                SQL_QUICK,
            )
        };
        match code {
            // SQL_SUCCESS, SQL_SUCCESS_WITH_INFO
            0 | 1 => {}
            code => {
                return Err(BulkError::OdbcCall {
                    function: "SQLStatistics",
                    code,
                })
            }
        }
        // SAFETY: the statement now holds the SQLStatistics result set.
        let cursor = unsafe { CursorImpl::new(stmt) };
        collect_text_rows(cursor)
    }
}

/// Fetch all rows of a cursor as text.
fn collect_text_rows(mut cursor: impl Cursor) -> Result<TextRows> {
    let num_cols = cursor.num_result_cols()? as usize;
    let mut buffers = TextRowSet::for_cursor(FETCH_BATCH_SIZE, &mut cursor, Some(MAX_TEXT_LEN))?;
    let mut row_cursor = cursor.bind_buffer(&mut buffers)?;

    let mut rows = Vec::new();
    while let Some(batch) = row_cursor.fetch()? {
        for row_idx in 0..batch.num_rows() {
            let row = (0..num_cols)
                .map(|col_idx| {
                    batch
                        .at(col_idx, row_idx)
                        .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                })
                .collect();
            rows.push(row);
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_from_dbq() {
        let conn = MsAccessConnection::new(
            "Driver={Microsoft Access Driver (*.mdb, *.accdb)};DBQ=C:\\data\\sales.accdb;",
        )
        .unwrap();
        assert_eq!(conn.database_path(), Path::new("C:\\data\\sales.accdb"));
        assert!(!conn.is_open());
    }

    #[test]
    fn test_missing_dbq_is_reported() {
        let err = MsAccessConnection::new("Driver={Microsoft Access Driver (*.mdb)};").unwrap_err();
        assert!(matches!(err, BulkError::MissingConnectionAttribute("Dbq")));
    }

    #[test]
    fn test_with_database_path_keeps_driver() {
        let conn = MsAccessConnection::from_path("/data/main.accdb").unwrap();
        let other = conn.with_database_path("/tmp/stage.accdb").unwrap();
        assert_eq!(other.database_path(), Path::new("/tmp/stage.accdb"));
        assert!(other.connection_string().contains(DEFAULT_ACCESS_DRIVER));
    }

    #[test]
    fn test_closed_connection_operations_fail() {
        let mut conn = MsAccessConnection::from_path("/data/main.accdb").unwrap();
        assert!(matches!(conn.execute("SELECT 1"), Err(BulkError::ConnectionClosed)));
        assert!(conn.commit().is_err());
        conn.close().unwrap();
    }
}
