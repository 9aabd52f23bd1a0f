//! Microsoft Access driver.
//!
//! ODBC is synchronous; callers inside async code run these calls inline the
//! same way the SQL Server path awaits tiberius.

mod connection;

pub use connection::{MsAccessConnection, TextRows, DEFAULT_ACCESS_DRIVER};
