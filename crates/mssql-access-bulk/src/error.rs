//! Error types for schema loading and bulk operations.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for schema and bulk operations.
#[derive(Error, Debug)]
pub enum BulkError {
    /// Argument rejected at the API boundary (empty name, bad value, etc.)
    #[error("Invalid argument '{param}': {message}")]
    InvalidArgument {
        param: &'static str,
        message: String,
    },

    /// Numeric argument outside its allowed range.
    #[error("Argument '{param}' is out of range: {message}")]
    OutOfRange {
        param: &'static str,
        message: String,
    },

    /// Connection string lacks an attribute the operation needs.
    #[error("Connection string is missing required attribute '{0}'")]
    MissingConnectionAttribute(&'static str),

    /// A component was handed a connection of a vendor it does not handle.
    #[error("{component} does not support connection type {actual}")]
    UnsupportedConnection { component: String, actual: String },

    /// No schema loader accepts the connection.
    #[error("No schema loader registered for connection type {0}")]
    NoLoaderRegistered(String),

    /// Entity already belongs to another parent.
    #[error("{entity} '{name}' already belongs to {owner} and cannot be added to {target}")]
    AlreadyOwned {
        entity: &'static str,
        name: String,
        owner: String,
        target: String,
    },

    /// Entity name collides with an existing entry of the same collection.
    #[error("{entity} '{name}' already exists in {collection}")]
    DuplicateName {
        entity: &'static str,
        name: String,
        collection: String,
    },

    /// Operation not valid in the current object state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Source side of a column mapping could not be resolved.
    #[error("Invalid source column mapping at index {index}: {kind}")]
    SourceMapping {
        index: usize,
        kind: SourceMappingError,
    },

    /// Destination side of a column mapping could not be resolved.
    #[error("Invalid destination column mapping at index {index} for table '{table}': {kind}")]
    DestinationMapping {
        index: usize,
        table: String,
        kind: DestinationMappingError,
    },

    /// Implicit mapping found a source column the destination does not have.
    #[error("Column '{column}' does not exist in destination table '{table}'")]
    ColumnNotInDestination { table: String, column: String },

    /// Reader has no column with the requested name.
    #[error("Column '{0}' was not found in the data reader")]
    ColumnNotFound(String),

    /// Column ordinal outside the reader's field count.
    #[error("Column ordinal {ordinal} is out of range (field count {field_count})")]
    OrdinalOutOfRange { ordinal: usize, field_count: usize },

    /// Destination table is missing from the database.
    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    /// Value cannot be written by a bulk engine (CSV staging, TDS bulk load).
    #[error("Data type {type_name} is not supported for {target} (value: {value})")]
    UnsupportedDataType {
        type_name: String,
        target: String,
        value: String,
    },

    /// Vendor column type has no text-file representation.
    #[error("Column '{column}' of type {column_type} is not supported for text-file staging")]
    UnsupportedColumnType { column: String, column_type: String },

    /// Text has characters the staging character set cannot represent.
    #[error("Text {text:?} cannot be represented in character set {character_set}")]
    Unencodable { text: String, character_set: String },

    /// Staged file disappeared before it could be imported.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Bulk load stage failed (init, send, finalize or import statement).
    #[error("Bulk load into '{table}' failed: {message}")]
    BulkLoad { table: String, message: String },

    /// Bulk load exceeded the configured timeout.
    #[error("Bulk insert into '{table}' timed out after {seconds} seconds")]
    Timeout { table: String, seconds: u64 },

    /// Capability intentionally left unimplemented.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Connection must be open for this operation.
    #[error("Connection is not open")]
    ConnectionClosed,

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQL Server driver error
    #[error("SQL Server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    /// ODBC driver error (Microsoft Access)
    #[error("ODBC error: {0}")]
    Odbc(#[from] odbc_api::Error),

    /// Raw ODBC call without a wrapper in the driver crate failed.
    #[error("ODBC call {function} failed with return code {code}")]
    OdbcCall { function: &'static str, code: i16 },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Why the source side of a mapping failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceMappingError {
    #[error("neither a source name nor a source ordinal is set")]
    Unset,

    #[error("source column '{0}' does not exist")]
    InvalidName(String),

    #[error("source ordinal {0} is not valid for the data reader")]
    InvalidOrdinal(i32),
}

/// Why the destination side of a mapping failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DestinationMappingError {
    #[error("neither a destination name nor a destination ordinal is set")]
    Unset,

    #[error("destination column '{0}' does not exist")]
    InvalidName(String),

    #[error("destination ordinal {0} is not valid")]
    InvalidOrdinal(i32),

    #[error("destination ordinal {ordinal} exceeds the column count {column_count}")]
    OrdinalOutOfRange { ordinal: i32, column_count: usize },
}

impl BulkError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(param: &'static str, message: impl Into<String>) -> Self {
        BulkError::InvalidArgument {
            param,
            message: message.into(),
        }
    }

    /// Create an OutOfRange error.
    pub fn out_of_range(param: &'static str, message: impl Into<String>) -> Self {
        BulkError::OutOfRange {
            param,
            message: message.into(),
        }
    }

    /// Create an UnsupportedConnection error.
    pub fn unsupported_connection(component: impl Into<String>, actual: impl Into<String>) -> Self {
        BulkError::UnsupportedConnection {
            component: component.into(),
            actual: actual.into(),
        }
    }

    /// Create an UnsupportedDataType error.
    pub fn unsupported_data_type(
        type_name: impl Into<String>,
        target: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        BulkError::UnsupportedDataType {
            type_name: type_name.into(),
            target: target.into(),
            value: value.to_string(),
        }
    }

    /// Create a BulkLoad error.
    pub fn bulk_load(table: impl Into<String>, message: impl Into<String>) -> Self {
        BulkError::BulkLoad {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a SourceMapping error.
    pub fn source_mapping(index: usize, kind: SourceMappingError) -> Self {
        BulkError::SourceMapping { index, kind }
    }

    /// Create a DestinationMapping error.
    pub fn destination_mapping(
        index: usize,
        table: impl Into<String>,
        kind: DestinationMappingError,
    ) -> Self {
        BulkError::DestinationMapping {
            index,
            table: table.into(),
            kind,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Reject empty or whitespace-only names.
pub(crate) fn require_name(param: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BulkError::invalid_argument(
            param,
            "value must not be empty or whitespace",
        ));
    }
    Ok(())
}

/// Result type alias for schema and bulk operations.
pub type Result<T> = std::result::Result<T, BulkError>;
