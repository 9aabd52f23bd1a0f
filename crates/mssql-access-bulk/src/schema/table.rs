//! Table metadata.

use crate::error::{require_name, BulkError, Result};
use crate::schema::collection::{OwnerRef, SchemaCollection, SchemaItem};
use crate::schema::column::ColumnSchema;
use crate::schema::foreign_key::ForeignKeySchema;
use crate::schema::index::{IndexSchema, IndexType};

/// Table with its columns, indexes, foreign keys and primary key.
///
/// The primary key is kept apart from `indexes`.
#[derive(Debug, Clone)]
pub struct TableSchema {
    identity: OwnerRef,
    database: Option<OwnerRef>,
    columns: SchemaCollection<ColumnSchema>,
    indexes: SchemaCollection<IndexSchema>,
    foreign_keys: SchemaCollection<ForeignKeySchema>,
    primary_key: Option<IndexSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        require_name("name", &name)?;
        let identity = OwnerRef::new(name);
        Ok(Self {
            columns: SchemaCollection::new(identity.clone()),
            indexes: SchemaCollection::new(identity.clone()),
            foreign_keys: SchemaCollection::new(identity.clone()),
            identity,
            database: None,
            primary_key: None,
        })
    }

    pub fn name(&self) -> &str {
        self.identity.name()
    }

    /// Identity children of this table point to.
    pub fn owner_ref(&self) -> &OwnerRef {
        &self.identity
    }

    /// Owning database, if any.
    pub fn database(&self) -> Option<&OwnerRef> {
        self.database.as_ref()
    }

    pub fn columns(&self) -> &SchemaCollection<ColumnSchema> {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut SchemaCollection<ColumnSchema> {
        &mut self.columns
    }

    pub fn indexes(&self) -> &SchemaCollection<IndexSchema> {
        &self.indexes
    }

    pub fn indexes_mut(&mut self) -> &mut SchemaCollection<IndexSchema> {
        &mut self.indexes
    }

    pub fn foreign_keys(&self) -> &SchemaCollection<ForeignKeySchema> {
        &self.foreign_keys
    }

    pub fn foreign_keys_mut(&mut self) -> &mut SchemaCollection<ForeignKeySchema> {
        &mut self.foreign_keys
    }

    pub fn primary_key(&self) -> Option<&IndexSchema> {
        self.primary_key.as_ref()
    }

    pub fn primary_key_mut(&mut self) -> Option<&mut IndexSchema> {
        self.primary_key.as_mut()
    }

    /// Replace the primary key.
    ///
    /// The index must be of type `PrimaryKey` and not belong to another table.
    pub fn set_primary_key(&mut self, primary_key: Option<IndexSchema>) -> Result<()> {
        let Some(mut pk) = primary_key else {
            self.primary_key = None;
            return Ok(());
        };

        if pk.index_type != IndexType::PrimaryKey {
            return Err(BulkError::invalid_argument(
                "primary_key",
                format!("index '{}' is not a primary key", pk.name()),
            ));
        }
        if let Some(owner) = pk.owner() {
            if owner.id() != self.identity.id() {
                return Err(BulkError::AlreadyOwned {
                    entity: IndexSchema::KIND,
                    name: pk.name().to_string(),
                    owner: owner.name().to_string(),
                    target: self.name().to_string(),
                });
            }
        }
        pk.set_owner(Some(self.identity.clone()));
        self.primary_key = Some(pk);
        Ok(())
    }

    /// Set the primary key by name, building a new empty primary key index.
    ///
    /// A blank name clears the primary key.
    pub fn set_primary_key_name(&mut self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            self.primary_key = None;
            return Ok(());
        }
        let pk = IndexSchema::new(name, IndexType::PrimaryKey)?;
        self.set_primary_key(Some(pk))
    }

    /// Column names of the primary key, in key order.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.primary_key
            .as_ref()
            .map(|pk| pk.columns().names().collect())
            .unwrap_or_default()
    }

    /// Canonical casing of a column name, if the table has it.
    pub fn canonical_column_name(&self, name: &str) -> Option<&str> {
        self.columns.get(name).map(|c| c.name())
    }
}

impl SchemaItem for TableSchema {
    const KIND: &'static str = "Table";

    fn name(&self) -> &str {
        self.identity.name()
    }

    fn owner(&self) -> Option<&OwnerRef> {
        self.database.as_ref()
    }

    fn set_owner(&mut self, owner: Option<OwnerRef>) {
        self.database = owner;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::index::SortOrder;
    use crate::schema::types::SqlDbType;

    #[test]
    fn test_columns_owned_by_table() {
        let mut t = TableSchema::new("Orders").unwrap();
        t.columns_mut()
            .add(ColumnSchema::sql_server("Id", SqlDbType::Int).unwrap())
            .unwrap();

        assert_eq!(t.columns()["ID"].full_name(), "Orders.Id");
        assert_eq!(t.canonical_column_name("id"), Some("Id"));
    }

    #[test]
    fn test_column_of_other_table_rejected() {
        let mut a = TableSchema::new("A").unwrap();
        let mut b = TableSchema::new("B").unwrap();
        a.columns_mut()
            .add(ColumnSchema::sql_server("Id", SqlDbType::Int).unwrap())
            .unwrap();

        let col = a.columns()["Id"].clone();
        let err = b.columns_mut().add(col).unwrap_err();
        assert!(matches!(err, BulkError::AlreadyOwned { .. }));

        let col = a.columns_mut().remove("Id").unwrap();
        b.columns_mut().add(col).unwrap();
        assert_eq!(b.columns()["id"].full_name(), "B.Id");
    }

    #[test]
    fn test_primary_key_by_name() {
        let mut t = TableSchema::new("Orders").unwrap();
        t.set_primary_key_name("PK_Orders").unwrap();
        {
            let pk = t.primary_key_mut().unwrap();
            pk.add_column("Id", SortOrder::Ascending).unwrap();
        }
        let pk = t.primary_key().unwrap();
        assert_eq!(pk.name(), "PK_Orders");
        assert!(pk.is_primary_key());
        assert_eq!(pk.table().map(|o| o.name()), Some("Orders"));
        assert_eq!(t.primary_key_columns(), vec!["Id"]);
        assert!(t.indexes().is_empty());

        t.set_primary_key_name("   ").unwrap();
        assert!(t.primary_key().is_none());
    }

    #[test]
    fn test_owned_index_cannot_be_renamed() {
        let mut t = TableSchema::new("Orders").unwrap();
        t.indexes_mut()
            .add(IndexSchema::new("IX_A", IndexType::Index).unwrap())
            .unwrap();
        let idx = t.indexes_mut().get_mut("ix_a").unwrap();
        assert!(idx.set_name("IX_B").is_err());
    }

    #[test]
    fn test_non_pk_index_rejected_as_primary_key() {
        let mut t = TableSchema::new("Orders").unwrap();
        let idx = IndexSchema::new("IX", IndexType::UniqueKey).unwrap();
        assert!(t.set_primary_key(Some(idx)).is_err());
    }
}
