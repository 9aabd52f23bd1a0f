//! Row readers consumed by the bulk engines.
//!
//! [`BulkActionDataReader`] is the minimal forward-only contract both engines
//! read through. [`DataReader`] is the richer interface some callers expect;
//! [`DataReaderAdapter`] lifts any minimal reader to it.

use crate::core::SqlValue;
use crate::error::{BulkError, Result};
use crate::schema::names_eq;

mod adapter;
mod enumerable;
mod table;

pub use adapter::DataReaderAdapter;
pub use enumerable::{BulkRecord, EnumerableDataReader};
pub use table::{DataColumn, DataTable, DataTableReader};

/// Forward-only row source.
///
/// `read` advances to the next row and returns false at the end. Field
/// accessors refer to the current row and fail before the first `read`.
pub trait BulkActionDataReader: Send {
    fn field_count(&self) -> usize;

    fn get_name(&self, ordinal: usize) -> Result<&str>;

    /// Ordinal of the field called `name`, compared case-insensitively.
    fn get_ordinal(&self, name: &str) -> Result<usize> {
        for i in 0..self.field_count() {
            if names_eq(self.get_name(i)?, name) {
                return Ok(i);
            }
        }
        Err(BulkError::ColumnNotFound(name.to_string()))
    }

    fn get_value(&self, ordinal: usize) -> Result<SqlValue<'_>>;

    /// Value as text; `None` for NULL.
    fn get_string(&self, ordinal: usize) -> Result<Option<String>> {
        let value = self.get_value(ordinal)?;
        Ok(match value {
            v if v.is_null() => None,
            SqlValue::Text(s) => Some(s.into_owned()),
            v => Some(v.to_string()),
        })
    }

    fn is_db_null(&self, ordinal: usize) -> Result<bool> {
        Ok(self.get_value(ordinal)?.is_null())
    }

    fn read(&mut self) -> Result<bool>;

    /// Names of every field, in ordinal order.
    fn field_names(&self) -> Result<Vec<String>> {
        (0..self.field_count())
            .map(|i| self.get_name(i).map(str::to_string))
            .collect()
    }
}

impl<R: BulkActionDataReader + ?Sized> BulkActionDataReader for &mut R {
    fn field_count(&self) -> usize {
        (**self).field_count()
    }

    fn get_name(&self, ordinal: usize) -> Result<&str> {
        (**self).get_name(ordinal)
    }

    fn get_ordinal(&self, name: &str) -> Result<usize> {
        (**self).get_ordinal(name)
    }

    fn get_value(&self, ordinal: usize) -> Result<SqlValue<'_>> {
        (**self).get_value(ordinal)
    }

    fn get_string(&self, ordinal: usize) -> Result<Option<String>> {
        (**self).get_string(ordinal)
    }

    fn is_db_null(&self, ordinal: usize) -> Result<bool> {
        (**self).is_db_null(ordinal)
    }

    fn read(&mut self) -> Result<bool> {
        (**self).read()
    }
}

impl<R: BulkActionDataReader + ?Sized> BulkActionDataReader for Box<R> {
    fn field_count(&self) -> usize {
        (**self).field_count()
    }

    fn get_name(&self, ordinal: usize) -> Result<&str> {
        (**self).get_name(ordinal)
    }

    fn get_ordinal(&self, name: &str) -> Result<usize> {
        (**self).get_ordinal(name)
    }

    fn get_value(&self, ordinal: usize) -> Result<SqlValue<'_>> {
        (**self).get_value(ordinal)
    }

    fn get_string(&self, ordinal: usize) -> Result<Option<String>> {
        (**self).get_string(ordinal)
    }

    fn is_db_null(&self, ordinal: usize) -> Result<bool> {
        (**self).is_db_null(ordinal)
    }

    fn read(&mut self) -> Result<bool> {
        (**self).read()
    }
}

/// Random-access row reader.
///
/// Only the members the bulk engines use are required; schema-table
/// introspection, typed getters and multi-result navigation are optional
/// and fail with [`BulkError::NotSupported`] unless a reader provides them.
pub trait DataReader: BulkActionDataReader {
    /// Copy the current row's values into `values`, returning how many were copied.
    fn get_values(&self, values: &mut Vec<SqlValue<'static>>) -> Result<usize> {
        values.clear();
        for i in 0..self.field_count() {
            values.push(self.get_value(i)?.into_owned());
        }
        Ok(values.len())
    }

    /// Nesting depth of the current row.
    fn depth(&self) -> usize {
        0
    }

    fn is_closed(&self) -> bool;

    fn close(&mut self);

    fn records_affected(&self) -> Option<u64> {
        None
    }

    fn next_result(&mut self) -> Result<bool> {
        Err(BulkError::NotSupported("next_result".into()))
    }

    fn get_schema_table(&self) -> Result<DataTable> {
        Err(BulkError::NotSupported("get_schema_table".into()))
    }

    fn get_i32(&self, ordinal: usize) -> Result<i32> {
        let _ = ordinal;
        Err(BulkError::NotSupported("get_i32".into()))
    }

    fn get_i64(&self, ordinal: usize) -> Result<i64> {
        let _ = ordinal;
        Err(BulkError::NotSupported("get_i64".into()))
    }

    fn get_bool(&self, ordinal: usize) -> Result<bool> {
        let _ = ordinal;
        Err(BulkError::NotSupported("get_bool".into()))
    }
}

/// Row count guard: `ordinal` must be below `field_count`.
pub(crate) fn check_ordinal(ordinal: usize, field_count: usize) -> Result<()> {
    if ordinal < field_count {
        Ok(())
    } else {
        Err(BulkError::OrdinalOutOfRange {
            ordinal,
            field_count,
        })
    }
}
