//! Index and primary key metadata.

use crate::error::{require_name, BulkError, Result};
use crate::schema::collection::{OwnerRef, SchemaCollection, SchemaItem};

/// Kind of index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    #[default]
    Index,
    UniqueKey,
    PrimaryKey,
}

/// Sort direction of an index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Column reference inside an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumnSchema {
    name: String,
    index: Option<OwnerRef>,
    pub sort_order: SortOrder,
}

impl IndexColumnSchema {
    pub fn new(name: impl Into<String>, sort_order: SortOrder) -> Result<Self> {
        let name = name.into();
        require_name("name", &name)?;
        Ok(Self {
            name,
            index: None,
            sort_order,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning index, if any.
    pub fn index(&self) -> Option<&OwnerRef> {
        self.index.as_ref()
    }
}

impl SchemaItem for IndexColumnSchema {
    const KIND: &'static str = "IndexColumn";

    fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> Option<&OwnerRef> {
        self.index.as_ref()
    }

    fn set_owner(&mut self, owner: Option<OwnerRef>) {
        self.index = owner;
    }
}

/// Index of a table.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    table: Option<OwnerRef>,
    pub index_type: IndexType,
    pub clustered: bool,
    columns: SchemaCollection<IndexColumnSchema>,
}

impl IndexSchema {
    pub fn new(name: impl Into<String>, index_type: IndexType) -> Result<Self> {
        let name = name.into();
        require_name("name", &name)?;
        Ok(Self {
            table: None,
            index_type,
            clustered: false,
            columns: SchemaCollection::new(OwnerRef::new(name)),
        })
    }

    pub fn name(&self) -> &str {
        self.columns.owner().name()
    }

    /// Rename the index. Not allowed once the index belongs to a table.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        require_name("name", &name)?;
        if let Some(table) = &self.table {
            return Err(BulkError::InvalidOperation(format!(
                "index '{}' belongs to table '{}' and cannot be renamed",
                self.name(),
                table.name()
            )));
        }
        self.columns.rename_owner(&name);
        Ok(())
    }

    /// Owning table, if any.
    pub fn table(&self) -> Option<&OwnerRef> {
        self.table.as_ref()
    }

    pub fn columns(&self) -> &SchemaCollection<IndexColumnSchema> {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut SchemaCollection<IndexColumnSchema> {
        &mut self.columns
    }

    /// Append a column by name.
    pub fn add_column(&mut self, name: &str, sort_order: SortOrder) -> Result<()> {
        self.columns.add(IndexColumnSchema::new(name, sort_order)?)
    }

    pub fn is_primary_key(&self) -> bool {
        self.index_type == IndexType::PrimaryKey
    }

    pub fn is_unique(&self) -> bool {
        matches!(self.index_type, IndexType::PrimaryKey | IndexType::UniqueKey)
    }
}

impl SchemaItem for IndexSchema {
    const KIND: &'static str = "Index";

    fn name(&self) -> &str {
        IndexSchema::name(self)
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

    #[test]
    fn test_index_columns_keep_order_and_owner() {
        let mut idx = IndexSchema::new("IX_Orders_Date", IndexType::Index).unwrap();
        idx.add_column("OrderDate", SortOrder::Descending).unwrap();
        idx.add_column("Id", SortOrder::Ascending).unwrap();

        let names: Vec<_> = idx.columns().names().collect();
        assert_eq!(names, vec!["OrderDate", "Id"]);
        assert_eq!(idx.columns()["orderdate"].sort_order, SortOrder::Descending);
        assert_eq!(
            idx.columns()["ID"].index().map(|o| o.name()),
            Some("IX_Orders_Date")
        );
    }

    #[test]
    fn test_rename_unowned_index_updates_columns() {
        let mut idx = IndexSchema::new("a", IndexType::UniqueKey).unwrap();
        idx.add_column("c", SortOrder::Ascending).unwrap();
        idx.set_name("b").unwrap();
        assert_eq!(idx.name(), "b");
        assert_eq!(idx.columns()["c"].index().map(|o| o.name()), Some("b"));
        assert!(idx.is_unique());
    }

    #[test]
    fn test_index_column_owned_by_other_index_rejected() {
        let mut a = IndexSchema::new("a", IndexType::Index).unwrap();
        let mut b = IndexSchema::new("b", IndexType::Index).unwrap();
        a.add_column("c", SortOrder::Ascending).unwrap();
        let col = a.columns()["c"].clone();
        assert!(matches!(
            b.columns_mut().add(col),
            Err(BulkError::AlreadyOwned { .. })
        ));
    }
}
