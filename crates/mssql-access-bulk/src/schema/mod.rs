//! Vendor-neutral schema model.
//!
//! - [`DatabaseSchema`] owns [`TableSchema`]s
//! - [`TableSchema`] owns columns, indexes, foreign keys and a primary key
//! - [`SchemaCollection`] enforces single ownership and case-insensitive names

pub mod collection;
pub mod column;
pub mod database;
pub mod foreign_key;
pub mod index;
pub mod table;
pub mod types;

pub use collection::{name_key, names_eq, OwnerRef, SchemaCollection, SchemaItem};
pub use column::ColumnSchema;
pub use database::DatabaseSchema;
pub use foreign_key::{ForeignKeyRule, ForeignKeySchema};
pub use index::{IndexColumnSchema, IndexSchema, IndexType, SortOrder};
pub use table::TableSchema;
pub use types::{ColumnType, CommandParameter, OleDbType, ParameterSpec, SqlDbType};

/// Collection aliases named after what they hold.
pub type TableSchemaCollection = SchemaCollection<TableSchema>;
pub type ColumnSchemaCollection = SchemaCollection<ColumnSchema>;
pub type IndexSchemaCollection = SchemaCollection<IndexSchema>;
pub type IndexColumnSchemaCollection = SchemaCollection<IndexColumnSchema>;
pub type ForeignKeySchemaCollection = SchemaCollection<ForeignKeySchema>;
