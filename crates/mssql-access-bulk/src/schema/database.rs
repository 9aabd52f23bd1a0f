//! Database metadata.

use crate::error::{require_name, Result};
use crate::schema::collection::{OwnerRef, SchemaCollection};
use crate::schema::table::TableSchema;

/// Named set of tables, in catalog order.
#[derive(Debug, Clone)]
pub struct DatabaseSchema {
    tables: SchemaCollection<TableSchema>,
}

impl DatabaseSchema {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        require_name("name", &name)?;
        Ok(Self {
            tables: SchemaCollection::new(OwnerRef::new(name)),
        })
    }

    pub fn name(&self) -> &str {
        self.tables.owner().name()
    }

    pub fn tables(&self) -> &SchemaCollection<TableSchema> {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut SchemaCollection<TableSchema> {
        &mut self.tables
    }

    /// Case-insensitive table lookup.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BulkError;

    #[test]
    fn test_table_belongs_to_one_database() {
        let mut a = DatabaseSchema::new("a").unwrap();
        let mut b = DatabaseSchema::new("b").unwrap();
        a.tables_mut().add(TableSchema::new("Orders").unwrap()).unwrap();

        assert_eq!(a.table("ORDERS").and_then(|t| t.database()).map(|d| d.name()), Some("a"));

        let copy = a.tables()["orders"].clone();
        assert!(matches!(
            b.tables_mut().add(copy),
            Err(BulkError::AlreadyOwned { .. })
        ));

        let copy = a.tables()["orders"].clone();
        a.tables_mut().add(copy).unwrap();
        assert_eq!(a.tables().len(), 1);
    }
}
