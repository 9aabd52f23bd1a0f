use std::fmt;

use crate::core::SqlValue;
use crate::error::{BulkError, Result};

use super::{check_ordinal, BulkActionDataReader};

/// A type whose values can be streamed as rows.
///
/// ```rust
/// use mssql_access_bulk::core::SqlValue;
/// use mssql_access_bulk::reader::BulkRecord;
///
/// struct Price {
///     id: i32,
///     amount: f64,
/// }
///
/// impl BulkRecord for Price {
///     fn field_names() -> Vec<String> {
///         vec!["Id".into(), "Amount".into()]
///     }
///
///     fn into_row(self) -> Vec<SqlValue<'static>> {
///         vec![self.id.into(), self.amount.into()]
///     }
/// }
/// ```
pub trait BulkRecord {
    fn field_names() -> Vec<String>;

    /// Field values in [`field_names`](Self::field_names) order.
    fn into_row(self) -> Vec<SqlValue<'static>>;
}

type RowIter = Box<dyn Iterator<Item = Vec<SqlValue<'static>>> + Send>;

/// Reader over any iterator of rows.
pub struct EnumerableDataReader {
    names: Vec<String>,
    rows: RowIter,
    current: Option<Vec<SqlValue<'static>>>,
}

impl fmt::Debug for EnumerableDataReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumerableDataReader")
            .field("names", &self.names)
            .field("current", &self.current)
            .finish()
    }
}

impl EnumerableDataReader {
    /// Reader over rows whose values follow `names`.
    pub fn new<I>(names: Vec<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<SqlValue<'static>>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            names,
            rows: Box::new(rows.into_iter()),
            current: None,
        }
    }

    /// Reader over records, one row per record.
    pub fn from_records<T, I>(records: I) -> Self
    where
        T: BulkRecord + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::new(T::field_names(), records.into_iter().map(T::into_row))
    }

    /// Single-column reader over plain values.
    pub fn from_values<V, I>(name: impl Into<String>, values: I) -> Self
    where
        V: Into<SqlValue<'static>>,
        I: IntoIterator<Item = V>,
        I::IntoIter: Send + 'static,
    {
        Self::new(
            vec![name.into()],
            values.into_iter().map(|v| vec![v.into()]),
        )
    }

    fn row(&self) -> Result<&[SqlValue<'static>]> {
        self.current
            .as_deref()
            .ok_or_else(|| BulkError::InvalidOperation("no current row; call read first".into()))
    }
}

impl BulkActionDataReader for EnumerableDataReader {
    fn field_count(&self) -> usize {
        self.names.len()
    }

    fn get_name(&self, ordinal: usize) -> Result<&str> {
        check_ordinal(ordinal, self.names.len())?;
        Ok(&self.names[ordinal])
    }

    fn get_value(&self, ordinal: usize) -> Result<SqlValue<'_>> {
        check_ordinal(ordinal, self.names.len())?;
        Ok(self.row()?[ordinal].as_borrowed())
    }

    fn read(&mut self) -> Result<bool> {
        self.current = self.rows.next();
        match &self.current {
            Some(row) if row.len() != self.names.len() => Err(BulkError::invalid_argument(
                "rows",
                format!(
                    "row has {} values but the reader has {} fields",
                    row.len(),
                    self.names.len()
                ),
            )),
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }
}
