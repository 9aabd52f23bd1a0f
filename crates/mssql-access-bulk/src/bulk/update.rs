//! Bulk update orchestration.
//!
//! A run stages the reader's rows in a temp table, optionally hands the temp
//! table to a caller action, merges it into the destination by primary key and
//! drops the staging area. Vendors implement the steps of [`BulkUpdateRun`];
//! [`BulkUpdateRun::execute`] fixes their order.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::drivers::Connection;
use crate::error::{BulkError, Result};
use crate::reader::{BulkActionDataReader, DataTable};
use crate::schema::{names_eq, TableSchema};

/// Temp table handed to a [`TempTableAction`].
///
/// A transaction the caller holds on the destination connection stays active
/// and is visible through `connection.in_transaction()`.
#[derive(Debug)]
pub struct TempTableContext<'c> {
    pub connection: Connection<'c>,
    pub table_name: &'c str,
}

/// Work done on the staged rows before they are merged.
#[async_trait]
pub trait TempTableAction: Send + Sync {
    async fn invoke(&self, context: TempTableContext<'_>) -> Result<()>;
}

/// Columns a bulk update writes, named as the destination defines them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub primary_key: String,
    /// Every reader column in reader order, key included.
    pub columns: Vec<String>,
}

impl UpdatePlan {
    /// Match reader columns to `destination`. The key column must be present in
    /// the reader and every reader column must exist in the destination.
    pub fn new<R>(reader: &R, primary_key: &str, destination: &TableSchema) -> Result<Self>
    where
        R: BulkActionDataReader + ?Sized,
    {
        let key_ordinal = reader.get_ordinal(primary_key)?;
        let mut columns = Vec::with_capacity(reader.field_count());
        for i in 0..reader.field_count() {
            let name = reader.get_name(i)?;
            let canonical = destination.canonical_column_name(name).ok_or_else(|| {
                BulkError::ColumnNotInDestination {
                    table: destination.name().to_string(),
                    column: name.to_string(),
                }
            })?;
            columns.push(canonical.to_string());
        }
        Ok(Self {
            primary_key: columns[key_ordinal].clone(),
            columns,
        })
    }

    /// Columns copied by the merge: all but the key.
    pub fn set_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| !names_eq(c, &self.primary_key))
            .map(String::as_str)
    }

    pub fn has_set_columns(&self) -> bool {
        self.set_columns().next().is_some()
    }
}

/// Steps of a single bulk update.
#[async_trait]
pub trait BulkUpdateRun: Send {
    fn temp_table_name(&self) -> &str;

    async fn create_temp_table(&mut self) -> Result<()>;

    async fn insert_into_temp_table(&mut self, reader: &mut dyn BulkActionDataReader)
        -> Result<u64>;

    async fn invoke_action(&mut self, action: &dyn TempTableAction) -> Result<()>;

    /// Merge staged rows into the destination; returns rows updated when known.
    async fn update_destination_table(&mut self) -> Result<u64>;

    /// Remove the staging area. Called after every run, failed or not, and
    /// must tolerate a temp table that was never created.
    async fn done_temp_table(&mut self) -> Result<()>;

    /// Run every step in order. Cleanup always runs and its failure is only
    /// logged, so the result is that of the earlier steps. Returns the number
    /// of rows staged.
    async fn execute(
        &mut self,
        reader: &mut dyn BulkActionDataReader,
        action: Option<&dyn TempTableAction>,
    ) -> Result<u64> {
        let outcome = stage_and_merge(self, reader, action).await;
        if let Err(e) = self.done_temp_table().await {
            warn!("Cleanup of {} failed: {}", self.temp_table_name(), e);
        }
        outcome
    }
}

async fn stage_and_merge<T>(
    run: &mut T,
    reader: &mut dyn BulkActionDataReader,
    action: Option<&dyn TempTableAction>,
) -> Result<u64>
where
    T: BulkUpdateRun + ?Sized,
{
    run.create_temp_table().await?;
    let staged = run.insert_into_temp_table(reader).await?;
    debug!("Staged {} rows in {}", staged, run.temp_table_name());
    if let Some(action) = action {
        run.invoke_action(action).await?;
    }
    let updated = run.update_destination_table().await?;
    debug!("Merged {} from {}: {} rows updated", staged, run.temp_table_name(), updated);
    Ok(staged)
}

/// Update rows of a destination table from a reader, matched by primary key.
#[async_trait]
pub trait BulkUpdate: Send + Sync {
    fn destination_table_name(&self) -> &str;

    fn primary_key_column(&self) -> &str;

    /// Returns the number of rows staged from `reader`.
    async fn update_async(
        &self,
        connection: Connection<'_>,
        reader: &mut dyn BulkActionDataReader,
    ) -> Result<u64>;

    fn update(
        &self,
        connection: Connection<'_>,
        reader: &mut dyn BulkActionDataReader,
    ) -> Result<u64> {
        crate::runtime::block_on(self.update_async(connection, reader))
    }

    async fn update_table_async(&self, connection: Connection<'_>, table: &DataTable) -> Result<u64> {
        let mut reader = table.create_reader();
        self.update_async(connection, &mut reader).await
    }

    fn update_table(&self, connection: Connection<'_>, table: &DataTable) -> Result<u64> {
        crate::runtime::block_on(self.update_table_async(connection, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use crate::reader::EnumerableDataReader;
    use crate::schema::{ColumnSchema, SqlDbType};

    fn destination() -> TableSchema {
        let mut t = TableSchema::new("Items").unwrap();
        for (name, ty) in [("Id", SqlDbType::Int), ("Val", SqlDbType::NVarChar)] {
            t.columns_mut().add(ColumnSchema::sql_server(name, ty).unwrap()).unwrap();
        }
        t
    }

    fn reader(names: &[&str]) -> EnumerableDataReader {
        let row: Vec<SqlValue<'static>> = names.iter().map(|_| SqlValue::I32(1)).collect();
        EnumerableDataReader::new(names.iter().map(|n| n.to_string()).collect(), vec![row])
    }

    #[test]
    fn test_plan_uses_destination_casing() {
        let plan = UpdatePlan::new(&reader(&["val", "ID"]), "id", &destination()).unwrap();
        assert_eq!(plan.primary_key, "Id");
        assert_eq!(plan.columns, vec!["Val", "Id"]);
        assert_eq!(plan.set_columns().collect::<Vec<_>>(), vec!["Val"]);
    }

    #[test]
    fn test_plan_errors() {
        let err = UpdatePlan::new(&reader(&["Val"]), "Id", &destination()).unwrap_err();
        assert!(matches!(err, BulkError::ColumnNotFound(ref c) if c == "Id"));

        let err = UpdatePlan::new(&reader(&["Id", "Other"]), "Id", &destination()).unwrap_err();
        assert!(matches!(err, BulkError::ColumnNotInDestination { ref column, .. } if column == "Other"));

        let key_only = UpdatePlan::new(&reader(&["Id"]), "Id", &destination()).unwrap();
        assert!(!key_only.has_set_columns());
    }

    #[derive(Default)]
    struct Recorder {
        steps: Vec<&'static str>,
        fail_at: Option<&'static str>,
        fail_cleanup: bool,
    }

    impl Recorder {
        fn step(&mut self, name: &'static str) -> Result<()> {
            self.steps.push(name);
            if self.fail_at == Some(name) {
                return Err(BulkError::InvalidOperation(format!("{} failed", name)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl BulkUpdateRun for Recorder {
        fn temp_table_name(&self) -> &str {
            "#tmp"
        }

        async fn create_temp_table(&mut self) -> Result<()> {
            self.step("create")
        }

        async fn insert_into_temp_table(
            &mut self,
            reader: &mut dyn BulkActionDataReader,
        ) -> Result<u64> {
            self.step("insert")?;
            let mut rows = 0;
            while reader.read()? {
                rows += 1;
            }
            Ok(rows)
        }

        async fn invoke_action(&mut self, _action: &dyn TempTableAction) -> Result<()> {
            self.step("action")
        }

        async fn update_destination_table(&mut self) -> Result<u64> {
            self.step("update").map(|_| 0)
        }

        async fn done_temp_table(&mut self) -> Result<()> {
            self.steps.push("done");
            if self.fail_cleanup {
                return Err(BulkError::InvalidOperation("cleanup failed".into()));
            }
            Ok(())
        }
    }

    struct NoopAction;

    #[async_trait]
    impl TempTableAction for NoopAction {
        async fn invoke(&self, _context: TempTableContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let mut run = Recorder::default();
        let mut rows = EnumerableDataReader::from_values("Id", vec![1i32, 2, 3]);
        let staged = run.execute(&mut rows, Some(&NoopAction)).await.unwrap();
        assert_eq!(staged, 3);
        assert_eq!(run.steps, vec!["create", "insert", "action", "update", "done"]);

        let mut run = Recorder::default();
        let mut rows = EnumerableDataReader::from_values("Id", vec![1i32]);
        run.execute(&mut rows, None).await.unwrap();
        assert_eq!(run.steps, vec!["create", "insert", "update", "done"]);
    }

    #[tokio::test]
    async fn test_cleanup_runs_after_failure_and_first_error_wins() {
        let mut run = Recorder {
            fail_at: Some("insert"),
            fail_cleanup: true,
            ..Default::default()
        };
        let mut rows = EnumerableDataReader::from_values("Id", vec![1i32]);
        let err = run.execute(&mut rows, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid operation: insert failed");
        assert_eq!(run.steps, vec!["create", "insert", "done"]);

    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_success() {
        let mut run = Recorder {
            fail_cleanup: true,
            ..Default::default()
        };
        let mut rows = EnumerableDataReader::from_values("Id", vec![1i32, 2, 3]);
        let staged = run.execute(&mut rows, None).await.unwrap();
        assert_eq!(staged, 3);
        assert_eq!(run.steps, vec!["create", "insert", "update", "done"]);
    }
}
