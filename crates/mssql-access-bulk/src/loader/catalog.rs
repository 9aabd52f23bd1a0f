//! Vendor-neutral catalog rows and the schema builders that consume them.
//!
//! Loaders only fetch rows; everything from here on is pure and shared by
//! both vendors.

use std::collections::HashMap;

use tracing::warn;

use crate::defaults::DefaultValueResolver;
use crate::error::Result;
use crate::schema::{
    name_key, names_eq, ColumnSchema, ColumnType, DatabaseSchema, ForeignKeyRule,
    ForeignKeySchema, IndexSchema, IndexType, SortOrder, TableSchema,
};

/// One column as reported by a vendor catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRow {
    pub table: String,
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    /// Character length (or datetime precision); `None` or negative means unlimited.
    pub size: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub read_only: bool,
    /// Default expression exactly as the catalog reports it.
    pub default: Option<String>,
}

/// One index key column. Rows arrive sorted by table, index and key ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub table: String,
    pub index: String,
    pub column: String,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub is_unique_constraint: bool,
    pub clustered: bool,
    pub descending: bool,
}

impl IndexRow {
    fn index_type(&self) -> IndexType {
        if self.is_primary_key {
            IndexType::PrimaryKey
        } else if self.is_unique || self.is_unique_constraint {
            IndexType::UniqueKey
        } else {
            IndexType::Index
        }
    }
}

/// One foreign key definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRow {
    pub id: i64,
    pub name: String,
    pub child_table: String,
    pub parent_table: String,
    pub delete_rule: String,
    pub update_rule: String,
}

/// One child/parent column pair of a foreign key. Rows arrive sorted by key id
/// and column ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyColumnRow {
    pub id: i64,
    pub child_column: String,
    pub parent_column: String,
}

fn clamp_u32(v: Option<i64>) -> u32 {
    v.filter(|v| *v > 0)
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn clamp_u8(v: Option<i64>) -> u8 {
    v.filter(|v| *v > 0)
        .map(|v| u8::try_from(v).unwrap_or(u8::MAX))
        .unwrap_or(0)
}

/// Build a column from its catalog row, resolving its default value.
pub fn build_column(row: &ColumnRow, resolver: &DefaultValueResolver) -> Result<ColumnSchema> {
    let mut column = ColumnSchema::new(row.name.clone(), row.column_type)?;
    column.allow_null = row.nullable;
    column.size = clamp_u32(row.size);
    column.precision = clamp_u8(row.precision);
    column.scale = clamp_u8(row.scale);
    column.is_read_only = row.read_only;
    column.default_value = resolver.resolve(&row.table, &column, row.default.as_deref());
    Ok(column)
}

/// Build a table with the given columns, in row order.
pub fn build_table<'r>(
    name: &str,
    columns: impl IntoIterator<Item = &'r ColumnRow>,
    resolver: &DefaultValueResolver,
) -> Result<TableSchema> {
    let mut table = TableSchema::new(name)?;
    for row in columns {
        let column = build_column(row, resolver)?;
        table.columns_mut().add(column)?;
    }
    Ok(table)
}

/// Add indexes to a table from rows sorted by index name and key ordinal.
///
/// Consecutive rows with the same index name form one index. The primary key
/// goes to [`TableSchema::set_primary_key`], everything else to `indexes`.
pub fn apply_indexes<'r>(
    table: &mut TableSchema,
    rows: impl IntoIterator<Item = &'r IndexRow>,
) -> Result<()> {
    let mut current: Option<IndexSchema> = None;

    for row in rows {
        let starts_new = current
            .as_ref()
            .map_or(true, |idx| !names_eq(idx.name(), &row.index));
        if starts_new {
            if let Some(done) = current.take() {
                attach_index(table, done)?;
            }
            let mut idx = IndexSchema::new(row.index.clone(), row.index_type())?;
            idx.clustered = row.clustered;
            current = Some(idx);
        }
        if let Some(idx) = current.as_mut() {
            let order = if row.descending {
                SortOrder::Descending
            } else {
                SortOrder::Ascending
            };
            idx.add_column(&row.column, order)?;
        }
    }

    if let Some(done) = current {
        attach_index(table, done)?;
    }
    Ok(())
}

fn attach_index(table: &mut TableSchema, index: IndexSchema) -> Result<()> {
    if index.is_primary_key() {
        table.set_primary_key(Some(index))
    } else {
        table.indexes_mut().add(index)
    }
}

/// Attach foreign keys to their child tables.
///
/// Column rows are grouped by key id; keys whose child table is not in the
/// schema are skipped.
pub fn apply_foreign_keys(
    schema: &mut DatabaseSchema,
    keys: &[ForeignKeyRow],
    columns: &[ForeignKeyColumnRow],
) -> Result<()> {
    let mut pairs: HashMap<i64, (Vec<String>, Vec<String>)> = HashMap::new();
    for col in columns {
        let entry = pairs.entry(col.id).or_default();
        entry.0.push(col.child_column.clone());
        entry.1.push(col.parent_column.clone());
    }

    for key in keys {
        let Some((child_columns, parent_columns)) = pairs.remove(&key.id) else {
            warn!("Foreign key {} has no columns, skipping", key.name);
            continue;
        };
        let Some(table) = schema.tables_mut().get_mut(&key.child_table) else {
            continue;
        };
        let mut fk = ForeignKeySchema::new(
            key.name.clone(),
            key.parent_table.clone(),
            parent_columns,
            key.child_table.clone(),
            child_columns,
        )?;
        fk.delete_rule = ForeignKeyRule::from_descriptor(&key.delete_rule);
        fk.update_rule = ForeignKeyRule::from_descriptor(&key.update_rule);
        table.foreign_keys_mut().add(fk)?;
    }
    Ok(())
}

/// Group rows by table name key, keeping row order within each group.
pub fn group_by_table<'r, R>(
    rows: &'r [R],
    table_of: impl Fn(&R) -> &str,
) -> HashMap<String, Vec<&'r R>> {
    let mut groups: HashMap<String, Vec<&R>> = HashMap::new();
    for row in rows {
        groups.entry(name_key(table_of(row))).or_default().push(row);
    }
    groups
}

/// Everything needed to assemble a database schema.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub tables: Vec<String>,
    pub columns: Vec<ColumnRow>,
    pub indexes: Vec<IndexRow>,
    pub foreign_keys: Vec<ForeignKeyRow>,
    pub foreign_key_columns: Vec<ForeignKeyColumnRow>,
}

/// Assemble a full database schema from a catalog snapshot.
///
/// Tables are keyed by bare name, so the snapshot must cover one namespace;
/// the SQL Server loader reads only the caller's default schema.
pub fn build_database(
    name: &str,
    snapshot: &CatalogSnapshot,
    resolver: &DefaultValueResolver,
) -> Result<DatabaseSchema> {
    let mut schema = DatabaseSchema::new(name)?;
    let columns = group_by_table(&snapshot.columns, |r| &r.table);
    let indexes = group_by_table(&snapshot.indexes, |r| &r.table);

    for table_name in &snapshot.tables {
        if schema.tables().contains(table_name) {
            continue;
        }
        let key = name_key(table_name);
        let mut table = build_table(
            table_name,
            columns.get(&key).into_iter().flatten().copied(),
            resolver,
        )?;
        apply_indexes(&mut table, indexes.get(&key).into_iter().flatten().copied())?;
        schema.tables_mut().add(table)?;
    }

    apply_foreign_keys(&mut schema, &snapshot.foreign_keys, &snapshot.foreign_key_columns)?;
    Ok(schema)
}

/// Build one table, or `None` when the catalog has no columns for it.
pub fn build_single_table(
    table_name: &str,
    columns: &[ColumnRow],
    resolver: &DefaultValueResolver,
) -> Result<Option<TableSchema>> {
    let rows: Vec<&ColumnRow> = columns
        .iter()
        .filter(|r| names_eq(&r.table, table_name))
        .collect();
    let Some(first) = rows.first() else {
        return Ok(None);
    };
    // Catalog casing wins over the caller's.
    let name = first.table.clone();
    build_table(&name, rows, resolver).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use crate::schema::SqlDbType;

    fn col(table: &str, name: &str, t: SqlDbType, nullable: bool, default: Option<&str>) -> ColumnRow {
        ColumnRow {
            table: table.into(),
            name: name.into(),
            column_type: ColumnType::SqlServer(t),
            nullable,
            size: None,
            precision: None,
            scale: None,
            read_only: false,
            default: default.map(str::to_string),
        }
    }

    fn idx(table: &str, index: &str, column: &str, pk: bool, unique: bool, desc: bool) -> IndexRow {
        IndexRow {
            table: table.into(),
            index: index.into(),
            column: column.into(),
            is_primary_key: pk,
            is_unique: unique,
            is_unique_constraint: false,
            clustered: pk,
            descending: desc,
        }
    }

    fn snapshot() -> CatalogSnapshot {
        CatalogSnapshot {
            tables: vec!["Orders".into(), "Lines".into()],
            columns: vec![
                col("Orders", "Id", SqlDbType::Int, false, None),
                col("Orders", "Status", SqlDbType::NVarChar, false, Some("(N'new')")),
                col("Orders", "Total", SqlDbType::Decimal, true, None),
                col("Lines", "OrderId", SqlDbType::Int, false, None),
                col("Lines", "LineNo", SqlDbType::SmallInt, false, Some("((1))")),
            ],
            indexes: vec![
                idx("Lines", "PK_Lines", "OrderId", true, true, false),
                idx("Lines", "PK_Lines", "LineNo", true, true, false),
                idx("Orders", "IX_Orders_Status", "Status", false, false, true),
                idx("Orders", "PK_Orders", "Id", true, true, false),
                idx("Orders", "UQ_Orders_Total", "Total", false, true, false),
            ],
            foreign_keys: vec![ForeignKeyRow {
                id: 7,
                name: "FK_Lines_Orders".into(),
                child_table: "Lines".into(),
                parent_table: "Orders".into(),
                delete_rule: "CASCADE".into(),
                update_rule: "WEIRD_RULE".into(),
            }],
            foreign_key_columns: vec![ForeignKeyColumnRow {
                id: 7,
                child_column: "OrderId".into(),
                parent_column: "Id".into(),
            }],
        }
    }

    #[test]
    fn test_build_database_tables_and_columns() {
        let db = build_database("Sales", &snapshot(), &DefaultValueResolver::new()).unwrap();
        assert_eq!(db.name(), "Sales");
        assert_eq!(db.tables().names().collect::<Vec<_>>(), vec!["Orders", "Lines"]);

        let orders = db.table("orders").unwrap();
        assert_eq!(orders.columns().names().collect::<Vec<_>>(), vec!["Id", "Status", "Total"]);
        assert_eq!(orders.columns()["id"].default_value, SqlValue::I32(0));
        assert_eq!(
            orders.columns()["status"].default_value,
            SqlValue::text_owned("new".into())
        );
        assert!(orders.columns()["total"].default_value.is_null());
        assert_eq!(db.table("lines").unwrap().columns()["LineNo"].default_value, SqlValue::I16(1));
    }

    #[test]
    fn test_indexes_grouped_and_classified() {
        let db = build_database("Sales", &snapshot(), &DefaultValueResolver::new()).unwrap();
        let orders = db.table("Orders").unwrap();

        assert_eq!(orders.primary_key().map(|pk| pk.name()), Some("PK_Orders"));
        assert_eq!(orders.indexes().len(), 2);
        let status = &orders.indexes()["IX_Orders_Status"];
        assert_eq!(status.index_type, IndexType::Index);
        assert_eq!(status.columns()["Status"].sort_order, SortOrder::Descending);
        assert_eq!(orders.indexes()["uq_orders_total"].index_type, IndexType::UniqueKey);

        let lines = db.table("Lines").unwrap();
        assert_eq!(lines.primary_key_columns(), vec!["OrderId", "LineNo"]);
        assert!(lines.primary_key().unwrap().clustered);
    }

    #[test]
    fn test_foreign_keys_grouped_by_id() {
        let db = build_database("Sales", &snapshot(), &DefaultValueResolver::new()).unwrap();
        let lines = db.table("Lines").unwrap();
        let fk = &lines.foreign_keys()["fk_lines_orders"];
        assert_eq!(fk.parent_table(), "Orders");
        assert_eq!(fk.child_columns(), ["OrderId".to_string()]);
        assert_eq!(fk.delete_rule, ForeignKeyRule::Cascade);
        assert_eq!(fk.update_rule, ForeignKeyRule::NoAction);
    }

    #[test]
    fn test_single_table_uses_catalog_casing() {
        let snap = snapshot();
        let t = build_single_table("ORDERS", &snap.columns, &DefaultValueResolver::new())
            .unwrap()
            .unwrap();
        assert_eq!(t.name(), "Orders");
        assert_eq!(t.columns().len(), 3);
        assert!(t.primary_key().is_none());

        assert!(build_single_table("Missing", &snap.columns, &DefaultValueResolver::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_non_ascii_table_and_index_names() {
        let columns = vec![
            col("Účty", "Číslo", SqlDbType::Int, false, None),
            col("Účty", "Názov", SqlDbType::NVarChar, true, None),
        ];
        let mut t = build_single_table("ÚČTY", &columns, &DefaultValueResolver::new())
            .unwrap()
            .unwrap();
        assert_eq!(t.name(), "Účty");

        // Same index under two spellings is one index.
        let rows = vec![
            idx("Účty", "IX_Účty", "Číslo", false, false, false),
            idx("Účty", "IX_ÚČTY", "Názov", false, false, false),
        ];
        apply_indexes(&mut t, &rows).unwrap();
        assert_eq!(t.indexes().len(), 1);
        assert_eq!(t.indexes()["ix_účty"].columns().len(), 2);
    }

    #[test]
    fn test_negative_size_means_unlimited() {
        let mut row = col("T", "Body", SqlDbType::NVarChar, true, None);
        row.size = Some(-1);
        let c = build_column(&row, &DefaultValueResolver::new()).unwrap();
        assert_eq!(c.size, 0);
    }
}
