use crate::core::SqlValue;
use crate::error::{BulkError, Result};

use super::{BulkActionDataReader, DataReader};

/// Lifts a [`BulkActionDataReader`] to a [`DataReader`].
///
/// Field access fails once the adapter is closed.
#[derive(Debug)]
pub struct DataReaderAdapter<R> {
    inner: R,
    closed: bool,
    rows_read: u64,
}

impl<R: BulkActionDataReader> DataReaderAdapter<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            closed: false,
            rows_read: 0,
        }
    }

    /// Rows returned by `read` so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(BulkError::InvalidOperation("the reader is closed".into()))
        } else {
            Ok(())
        }
    }
}

impl<R: BulkActionDataReader> BulkActionDataReader for DataReaderAdapter<R> {
    fn field_count(&self) -> usize {
        self.inner.field_count()
    }

    fn get_name(&self, ordinal: usize) -> Result<&str> {
        self.inner.get_name(ordinal)
    }

    fn get_ordinal(&self, name: &str) -> Result<usize> {
        self.inner.get_ordinal(name)
    }

    fn get_value(&self, ordinal: usize) -> Result<SqlValue<'_>> {
        self.check_open()?;
        self.inner.get_value(ordinal)
    }

    fn get_string(&self, ordinal: usize) -> Result<Option<String>> {
        self.check_open()?;
        self.inner.get_string(ordinal)
    }

    fn is_db_null(&self, ordinal: usize) -> Result<bool> {
        self.check_open()?;
        self.inner.is_db_null(ordinal)
    }

    fn read(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        let more = self.inner.read()?;
        if more {
            self.rows_read += 1;
        }
        Ok(more)
    }
}

impl<R: BulkActionDataReader> DataReader for DataReaderAdapter<R> {
    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
