//! Microsoft SQL Server driver.
//!
//! - [`SqlServerConnection`]: tiberius connection with transaction tracking
//! - [`tds`]: value coercion for the TDS bulk load

mod connection;
pub mod tds;

pub use connection::{SqlClient, SqlServerConnection};
