//! Foreign key metadata.

use crate::error::{require_name, BulkError, Result};
use crate::schema::collection::{OwnerRef, SchemaItem};

/// Referential action on delete or update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ForeignKeyRule {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyRule {
    /// Map a catalog rule descriptor (`NO_ACTION`, `CASCADE`, `SET_NULL`,
    /// `SET_DEFAULT`, with or without the underscore).
    ///
    /// Anything unrecognised is treated as `NoAction`.
    pub fn from_descriptor(descriptor: &str) -> Self {
        let normalized: String = descriptor
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .flat_map(char::to_uppercase)
            .collect();
        match normalized.as_str() {
            "CASCADE" => ForeignKeyRule::Cascade,
            "SETNULL" => ForeignKeyRule::SetNull,
            "SETDEFAULT" => ForeignKeyRule::SetDefault,
            _ => ForeignKeyRule::NoAction,
        }
    }
}

/// Foreign key declared on a table.
///
/// The parent is the referenced table, the child is the table holding the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySchema {
    name: String,
    table: Option<OwnerRef>,
    parent_table: String,
    parent_columns: Vec<String>,
    child_table: String,
    child_columns: Vec<String>,
    pub delete_rule: ForeignKeyRule,
    pub update_rule: ForeignKeyRule,
}

impl ForeignKeySchema {
    pub fn new(
        name: impl Into<String>,
        parent_table: impl Into<String>,
        parent_columns: Vec<String>,
        child_table: impl Into<String>,
        child_columns: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        let parent_table = parent_table.into();
        let child_table = child_table.into();
        require_name("name", &name)?;
        require_name("parent_table", &parent_table)?;
        require_name("child_table", &child_table)?;
        if parent_columns.is_empty() {
            return Err(BulkError::invalid_argument(
                "parent_columns",
                "at least one column is required",
            ));
        }
        if child_columns.len() != parent_columns.len() {
            return Err(BulkError::invalid_argument(
                "child_columns",
                format!(
                    "expected {} columns to match the parent columns, got {}",
                    parent_columns.len(),
                    child_columns.len()
                ),
            ));
        }
        for column in parent_columns.iter().chain(child_columns.iter()) {
            require_name("columns", column)?;
        }

        Ok(Self {
            name,
            table: None,
            parent_table,
            parent_columns,
            child_table,
            child_columns,
            delete_rule: ForeignKeyRule::NoAction,
            update_rule: ForeignKeyRule::NoAction,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning table, if any.
    pub fn table(&self) -> Option<&OwnerRef> {
        self.table.as_ref()
    }

    pub fn parent_table(&self) -> &str {
        &self.parent_table
    }

    pub fn parent_columns(&self) -> &[String] {
        &self.parent_columns
    }

    pub fn child_table(&self) -> &str {
        &self.child_table
    }

    pub fn child_columns(&self) -> &[String] {
        &self.child_columns
    }

    /// Child/parent column pairs in key order.
    pub fn column_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.child_columns
            .iter()
            .map(String::as_str)
            .zip(self.parent_columns.iter().map(String::as_str))
    }
}

impl SchemaItem for ForeignKeySchema {
    const KIND: &'static str = "ForeignKey";

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

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rule_descriptors() {
        assert_eq!(ForeignKeyRule::from_descriptor("CASCADE"), ForeignKeyRule::Cascade);
        assert_eq!(ForeignKeyRule::from_descriptor("SET_NULL"), ForeignKeyRule::SetNull);
        assert_eq!(ForeignKeyRule::from_descriptor("set default"), ForeignKeyRule::SetDefault);
        assert_eq!(ForeignKeyRule::from_descriptor("NO_ACTION"), ForeignKeyRule::NoAction);
        assert_eq!(ForeignKeyRule::from_descriptor("RESTRICT"), ForeignKeyRule::NoAction);
    }

    #[test]
    fn test_arity_must_match() {
        let err = ForeignKeySchema::new(
            "FK_Lines_Orders",
            "Orders",
            cols(&["Id", "Region"]),
            "Lines",
            cols(&["OrderId"]),
        );
        assert!(err.is_err());

        let err = ForeignKeySchema::new("FK", "Orders", vec![], "Lines", vec![]);
        assert!(err.is_err());
    }

    #[test]
    fn test_column_pairs() {
        let fk = ForeignKeySchema::new(
            "FK_Lines_Orders",
            "Orders",
            cols(&["Id", "Region"]),
            "Lines",
            cols(&["OrderId", "OrderRegion"]),
        )
        .unwrap();
        let pairs: Vec<_> = fk.column_pairs().collect();
        assert_eq!(pairs, vec![("OrderId", "Id"), ("OrderRegion", "Region")]);
        assert_eq!(fk.delete_rule, ForeignKeyRule::NoAction);
    }
}
