use indexmap::IndexMap;

use crate::core::{SqlNullType, SqlValue};
use crate::error::{BulkError, Result};
use crate::schema::name_key;

use super::{check_ordinal, BulkActionDataReader, DataReader};

/// Column of a [`DataTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataColumn {
    pub name: String,
    /// Type used for NULLs in this column.
    pub data_type: SqlNullType,
}

/// In-memory table of rows.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    name: String,
    columns: IndexMap<String, DataColumn>,
    rows: Vec<Vec<SqlValue<'static>>>,
}

impl DataTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a column. Names are unique case-insensitively. Existing rows get NULL.
    pub fn add_column(&mut self, name: impl Into<String>, data_type: SqlNullType) -> Result<()> {
        let name = name.into();
        crate::error::require_name("name", &name)?;
        let key = name_key(&name);
        if self.columns.contains_key(&key) {
            return Err(BulkError::DuplicateName {
                entity: "DataColumn",
                name,
                collection: self.name.clone(),
            });
        }
        self.columns.insert(key, DataColumn { name, data_type });
        for row in &mut self.rows {
            row.push(SqlValue::Null(data_type));
        }
        Ok(())
    }

    pub fn columns(&self) -> impl Iterator<Item = &DataColumn> {
        self.columns.values()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_ordinal(&self, name: &str) -> Option<usize> {
        self.columns.get_index_of(&name_key(name))
    }

    /// Append a row. NULLs without a type hint take the column's type.
    pub fn add_row(&mut self, values: Vec<SqlValue<'static>>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(BulkError::invalid_argument(
                "values",
                format!(
                    "row has {} values but table {} has {} columns",
                    values.len(),
                    self.name,
                    self.columns.len()
                ),
            ));
        }
        let row = values
            .into_iter()
            .zip(self.columns.values())
            .map(|(v, c)| match v {
                SqlValue::Null(SqlNullType::Unknown) => SqlValue::Null(c.data_type),
                v => v,
            })
            .collect();
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[Vec<SqlValue<'static>>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Forward-only reader over the rows.
    pub fn create_reader(&self) -> DataTableReader<'_> {
        DataTableReader {
            table: self,
            position: None,
            closed: false,
        }
    }
}

/// Reader over a borrowed [`DataTable`].
#[derive(Debug)]
pub struct DataTableReader<'t> {
    table: &'t DataTable,
    position: Option<usize>,
    closed: bool,
}

impl DataTableReader<'_> {
    fn row(&self) -> Result<&[SqlValue<'static>]> {
        self.position
            .and_then(|p| self.table.rows.get(p))
            .map(Vec::as_slice)
            .ok_or_else(|| BulkError::InvalidOperation("no current row; call read first".into()))
    }
}

impl BulkActionDataReader for DataTableReader<'_> {
    fn field_count(&self) -> usize {
        self.table.columns.len()
    }

    fn get_name(&self, ordinal: usize) -> Result<&str> {
        check_ordinal(ordinal, self.field_count())?;
        Ok(self
            .table
            .columns
            .get_index(ordinal)
            .map(|(_, c)| c.name.as_str())
            .unwrap_or_default())
    }

    fn get_ordinal(&self, name: &str) -> Result<usize> {
        self.table
            .column_ordinal(name)
            .ok_or_else(|| BulkError::ColumnNotFound(name.to_string()))
    }

    fn get_value(&self, ordinal: usize) -> Result<SqlValue<'_>> {
        check_ordinal(ordinal, self.field_count())?;
        Ok(self.row()?[ordinal].as_borrowed())
    }

    fn read(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(self.table.rows.len()));
        Ok(next < self.table.rows.len())
    }
}

impl DataReader for DataTableReader<'_> {
    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn records_affected(&self) -> Option<u64> {
        Some(0)
    }

    /// One row per column: name, ordinal and NULL type.
    fn get_schema_table(&self) -> Result<DataTable> {
        let mut schema = DataTable::new("SchemaTable");
        schema.add_column("ColumnName", SqlNullType::String)?;
        schema.add_column("ColumnOrdinal", SqlNullType::I32)?;
        schema.add_column("DataType", SqlNullType::String)?;
        for (i, c) in self.table.columns.values().enumerate() {
            schema.add_row(vec![
                c.name.clone().into(),
                SqlValue::I32(i32::try_from(i).unwrap_or(i32::MAX)),
                format!("{:?}", c.data_type).into(),
            ])?;
        }
        Ok(schema)
    }
}
