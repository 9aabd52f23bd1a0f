//! Database connections.
//!
//! - [`mssql`]: SQL Server over tiberius
//! - [`access`]: Microsoft Access over ODBC
//!
//! [`Connection`] borrows either kind and is what loaders, the schema cache and
//! the bulk engines dispatch on.

pub mod access;
pub mod connection_string;
pub mod mssql;

pub use access::MsAccessConnection;
pub use mssql::SqlServerConnection;

/// Borrowed connection of either supported vendor.
#[derive(Debug)]
pub enum Connection<'a> {
    SqlServer(&'a mut SqlServerConnection),
    MsAccess(&'a mut MsAccessConnection),
}

impl<'a> Connection<'a> {
    /// Shorter-lived copy of this borrow.
    pub fn reborrow(&mut self) -> Connection<'_> {
        match self {
            Connection::SqlServer(c) => Connection::SqlServer(c),
            Connection::MsAccess(c) => Connection::MsAccess(c),
        }
    }

    /// Runtime type name, used in unsupported-connection errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Connection::SqlServer(_) => "SqlServerConnection",
            Connection::MsAccess(_) => "MsAccessConnection",
        }
    }

    pub fn connection_string(&self) -> &str {
        match self {
            Connection::SqlServer(c) => c.connection_string(),
            Connection::MsAccess(c) => c.connection_string(),
        }
    }

    /// True when the caller holds an open transaction on the connection.
    pub fn in_transaction(&self) -> bool {
        match self {
            Connection::SqlServer(c) => c.in_transaction(),
            Connection::MsAccess(c) => c.in_transaction(),
        }
    }

    pub fn is_open(&self) -> bool {
        match self {
            Connection::SqlServer(c) => c.is_open(),
            Connection::MsAccess(c) => c.is_open(),
        }
    }
}

impl<'a> From<&'a mut SqlServerConnection> for Connection<'a> {
    fn from(c: &'a mut SqlServerConnection) -> Self {
        Connection::SqlServer(c)
    }
}

impl<'a> From<&'a mut MsAccessConnection> for Connection<'a> {
    fn from(c: &'a mut MsAccessConnection) -> Self {
        Connection::MsAccess(c)
    }
}

/// Quote an identifier with square brackets, doubling any closing bracket.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Escape a string literal value by doubling single quotes.
pub fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("name"), "[name]");
        assert_eq!(quote_ident("table]name"), "[table]]name]");
        assert_eq!(quote_ident("#BulkUpdate_1"), "[#BulkUpdate_1]");
    }

    #[test]
    fn test_escape_sql_string() {
        assert_eq!(escape_sql_string("O'Brien"), "O''Brien");
    }

    #[test]
    fn test_connection_dispatch() {
        let mut sql = SqlServerConnection::new("Server=db;Database=Sales").unwrap();
        let mut conn = Connection::from(&mut sql);
        assert_eq!(conn.type_name(), "SqlServerConnection");
        assert!(!conn.reborrow().in_transaction());

        let mut access = MsAccessConnection::from_path("/data/a.accdb").unwrap();
        let conn = Connection::from(&mut access);
        assert_eq!(conn.type_name(), "MsAccessConnection");
        assert!(!conn.is_open());
    }
}
