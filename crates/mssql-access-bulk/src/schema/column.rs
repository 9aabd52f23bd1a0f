//! Column metadata.

use crate::core::SqlValue;
use crate::error::{require_name, BulkError, Result};
use crate::schema::collection::{OwnerRef, SchemaItem};
use crate::schema::types::{ColumnType, CommandParameter, OleDbType, SqlDbType};

/// Column of a table, carrying the vendor type code its catalog reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    name: String,
    table: Option<OwnerRef>,
    /// Vendor type code.
    pub column_type: ColumnType,
    pub allow_null: bool,
    /// Resolved default; a typed NULL when the column has none.
    pub default_value: SqlValue<'static>,
    /// Length in characters or bytes, or datetime precision. 0 means unlimited.
    pub size: u32,
    pub precision: u8,
    pub scale: u8,
    /// Identity, computed or rowversion column the server fills itself.
    pub is_read_only: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Result<Self> {
        let name = name.into();
        require_name("name", &name)?;
        Ok(Self {
            name,
            table: None,
            default_value: SqlValue::Null(column_type.null_type()),
            column_type,
            allow_null: true,
            size: 0,
            precision: 0,
            scale: 0,
            is_read_only: false,
        })
    }

    /// SQL Server column.
    pub fn sql_server(name: impl Into<String>, db_type: SqlDbType) -> Result<Self> {
        Self::new(name, ColumnType::SqlServer(db_type))
    }

    /// Access column.
    pub fn ms_access(name: impl Into<String>, db_type: OleDbType) -> Result<Self> {
        Self::new(name, ColumnType::MsAccess(db_type))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning table, if any.
    pub fn table(&self) -> Option<&OwnerRef> {
        self.table.as_ref()
    }

    /// Unowned copy, ready to be added to another table.
    pub fn detached(&self) -> Self {
        Self {
            table: None,
            ..self.clone()
        }
    }

    /// `table.column` when owned, otherwise the bare column name.
    pub fn full_name(&self) -> String {
        match &self.table {
            Some(t) => format!("{}.{}", t.name(), self.name),
            None => self.name.clone(),
        }
    }

    pub fn sql_db_type(&self) -> Option<SqlDbType> {
        match self.column_type {
            ColumnType::SqlServer(t) => Some(t),
            ColumnType::MsAccess(_) => None,
        }
    }

    pub fn ole_db_type(&self) -> Option<OleDbType> {
        match self.column_type {
            ColumnType::MsAccess(t) => Some(t),
            ColumnType::SqlServer(_) => None,
        }
    }

    /// Configure a command parameter's type, size, precision and scale from this column.
    ///
    /// The parameter must belong to the same vendor as the column.
    pub fn setup_parameter(&self, parameter: &mut CommandParameter) -> Result<()> {
        match (self.column_type, parameter) {
            (ColumnType::SqlServer(t), CommandParameter::SqlServer(p)) => {
                p.db_type = Some(t);
                p.size = self.size;
                p.precision = self.precision;
                p.scale = self.scale;
                p.is_nullable = self.allow_null;
                Ok(())
            }
            (ColumnType::MsAccess(t), CommandParameter::MsAccess(p)) => {
                p.db_type = Some(t);
                p.size = self.size;
                p.precision = self.precision;
                p.scale = self.scale;
                p.is_nullable = self.allow_null;
                Ok(())
            }
            (column_type, parameter) => Err(BulkError::invalid_argument(
                "parameter",
                format!(
                    "column {} is a {} column, got a {} parameter",
                    self.full_name(),
                    column_type.vendor(),
                    parameter.vendor()
                ),
            )),
        }
    }
}

impl SchemaItem for ColumnSchema {
    const KIND: &'static str = "Column";

    fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> Option<&OwnerRef> {
        self.table.as_ref()
    }

    fn set_owner(&mut self, owner: Option<OwnerRef>) {
        self.table = owner;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlNullType;

    #[test]
    fn test_new_column_defaults() {
        let col = ColumnSchema::sql_server("Id", SqlDbType::Int).unwrap();
        assert!(col.allow_null);
        assert_eq!(col.size, 0);
        assert_eq!(col.default_value, SqlValue::Null(SqlNullType::I32));
        assert_eq!(col.full_name(), "Id");
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(ColumnSchema::sql_server(" ", SqlDbType::Int).is_err());
    }

    #[test]
    fn test_setup_parameter_same_vendor() {
        let mut col = ColumnSchema::sql_server("Price", SqlDbType::Decimal).unwrap();
        col.precision = 10;
        col.scale = 4;
        col.allow_null = false;

        let mut p = CommandParameter::sql_server("Price");
        col.setup_parameter(&mut p).unwrap();
        match &p {
            CommandParameter::SqlServer(spec) => {
                assert_eq!(spec.db_type, Some(SqlDbType::Decimal));
                assert_eq!(spec.precision, 10);
                assert_eq!(spec.scale, 4);
                assert!(!spec.is_nullable);
            }
            other => panic!("unexpected parameter {:?}", other),
        }
        assert_eq!(p.declaration().unwrap(), "decimal(10, 4)");
    }

    #[test]
    fn test_setup_parameter_wrong_vendor_fails() {
        let col = ColumnSchema::ms_access("Name", OleDbType::WChar).unwrap();
        let mut p = CommandParameter::sql_server("Name");
        let err = col.setup_parameter(&mut p).unwrap_err();
        assert!(err.to_string().contains("MsAccess"));
    }
}
