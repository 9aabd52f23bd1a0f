//! Access bulk update through a throwaway database file.
//!
//! Access has no session temp tables. Each run copies an empty template
//! database, makes the temp table inside it with `SELECT ... INTO ... IN`,
//! stages rows there and merges by joining the destination with the temp file.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::BulkOptions;
use crate::drivers::{escape_sql_string, quote_ident, Connection, MsAccessConnection};
use crate::error::{require_name, BulkError, Result};
use crate::loader::SchemaCache;
use crate::reader::BulkActionDataReader;

use super::ms_access::{catalog_name, load_destination, MsAccessBulkInsert};
use super::update::{BulkUpdate, BulkUpdateRun, TempTableAction, TempTableContext, UpdatePlan};

/// Bulk update for Access tables.
#[derive(Clone)]
pub struct MsAccessBulkUpdate {
    destination_table_name: String,
    primary_key_column: String,
    insert: MsAccessBulkInsert,
    temp_database_template: Option<PathBuf>,
    temp_directory: Option<PathBuf>,
    schema_cache: Option<Arc<SchemaCache>>,
    action: Option<Arc<dyn TempTableAction>>,
}

impl fmt::Debug for MsAccessBulkUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsAccessBulkUpdate")
            .field("destination_table_name", &self.destination_table_name)
            .field("primary_key_column", &self.primary_key_column)
            .field("temp_database_template", &self.temp_database_template)
            .field("has_action", &self.action.is_some())
            .finish()
    }
}

impl MsAccessBulkUpdate {
    pub fn new(
        destination_table_name: impl Into<String>,
        primary_key_column: impl Into<String>,
    ) -> Result<Self> {
        let destination_table_name = destination_table_name.into();
        let primary_key_column = primary_key_column.into();
        require_name("primary_key_column", &primary_key_column)?;
        Ok(Self {
            insert: MsAccessBulkInsert::new(&destination_table_name)?,
            destination_table_name,
            primary_key_column,
            temp_database_template: None,
            temp_directory: None,
            schema_cache: None,
            action: None,
        })
    }

    pub fn from_options(
        destination_table_name: impl Into<String>,
        primary_key_column: impl Into<String>,
        options: &BulkOptions,
    ) -> Result<Self> {
        let mut update = Self::new(destination_table_name, primary_key_column)?;
        update.insert = MsAccessBulkInsert::from_options(&update.destination_table_name, options)?;
        update.temp_database_template = options.temp_database_template.clone();
        Ok(update)
    }

    /// Empty database file copied for every run.
    pub fn with_temp_database_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.temp_database_template = Some(template.into());
        self
    }

    /// Where temp databases and staging folders are created; defaults to the
    /// system temp dir.
    pub fn with_temp_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        self.insert = self.insert.with_staging_root(&directory);
        self.temp_directory = Some(directory);
        self
    }

    /// Settings of the load into the temp table (delimiter, character set).
    pub fn with_bulk_insert(
        mut self,
        configure: impl FnOnce(MsAccessBulkInsert) -> Result<MsAccessBulkInsert>,
    ) -> Result<Self> {
        self.insert = configure(self.insert)?;
        Ok(self)
    }

    pub fn with_schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.schema_cache = Some(cache);
        self
    }

    pub fn with_temp_table_action(mut self, action: Arc<dyn TempTableAction>) -> Self {
        self.action = Some(action);
        self
    }

    async fn run(
        &self,
        connection: &mut MsAccessConnection,
        reader: &mut dyn BulkActionDataReader,
    ) -> Result<u64> {
        let destination = load_destination(
            connection,
            self.schema_cache.as_deref(),
            &self.destination_table_name,
        )
        .await?;
        let plan = UpdatePlan::new(&*reader, &self.primary_key_column, &destination)?;

        let template = self.temp_database_template.as_deref().ok_or_else(|| {
            BulkError::Config("temp_database_template is required for Access bulk updates".into())
        })?;
        let directory = self.temp_directory.clone().unwrap_or_else(std::env::temp_dir);
        let suffix = Uuid::new_v4().simple().to_string();
        let temp_database = TempDatabase::create(template, &directory, &suffix)?;
        let temp_connection = connection.with_database_path(temp_database.path())?;

        let temp_table = format!("BulkUpdate_{}", suffix);
        let mut insert = self.insert.clone();
        insert.set_destination_table_name(&temp_table)?;

        let mut run = MsAccessUpdateRun {
            connection,
            temp_connection,
            temp_database,
            destination: catalog_name(&self.destination_table_name).to_string(),
            plan,
            insert,
            temp_table,
        };
        run.execute(reader, self.action.as_deref()).await
    }
}

#[async_trait]
impl BulkUpdate for MsAccessBulkUpdate {
    fn destination_table_name(&self) -> &str {
        &self.destination_table_name
    }

    fn primary_key_column(&self) -> &str {
        &self.primary_key_column
    }

    async fn update_async(
        &self,
        connection: Connection<'_>,
        reader: &mut dyn BulkActionDataReader,
    ) -> Result<u64> {
        let connection = match connection {
            Connection::MsAccess(c) => c,
            other => {
                return Err(BulkError::unsupported_connection(
                    "MsAccessBulkUpdate",
                    other.type_name(),
                ))
            }
        };

        let opened_here = !connection.is_open();
        if opened_here {
            connection.open()?;
        }

        let result = self.run(connection, reader).await;

        if opened_here {
            if let Err(e) = connection.close() {
                warn!("Failed to close connection after bulk update: {}", e);
            }
        }
        result
    }
}

struct MsAccessUpdateRun<'a> {
    connection: &'a mut MsAccessConnection,
    temp_connection: MsAccessConnection,
    temp_database: TempDatabase,
    destination: String,
    plan: UpdatePlan,
    insert: MsAccessBulkInsert,
    temp_table: String,
}

#[async_trait]
impl<'a> BulkUpdateRun for MsAccessUpdateRun<'a> {
    fn temp_table_name(&self) -> &str {
        &self.temp_table
    }

    async fn create_temp_table(&mut self) -> Result<()> {
        let create = select_into_statement(
            &self.destination,
            &self.temp_table,
            self.temp_database.path(),
            &self.plan,
        );
        debug!("Creating temp table: {}", create);
        self.connection.execute(&create)?;

        self.temp_connection.open()?;
        self.temp_connection
            .execute(&primary_key_statement(&self.temp_table, &self.plan.primary_key))
    }

    async fn insert_into_temp_table(
        &mut self,
        reader: &mut dyn BulkActionDataReader,
    ) -> Result<u64> {
        self.insert
            .write_to_database(&mut self.temp_connection, reader)
            .await
    }

    async fn invoke_action(&mut self, action: &dyn TempTableAction) -> Result<()> {
        action
            .invoke(TempTableContext {
                connection: Connection::MsAccess(&mut self.temp_connection),
                table_name: &self.temp_table,
            })
            .await?;
        self.temp_connection.close()
    }

    async fn update_destination_table(&mut self) -> Result<u64> {
        // The merge reaches the temp table through its file.
        if self.temp_connection.is_open() {
            self.temp_connection.close()?;
        }
        let Some(sql) = update_statement(
            &self.destination,
            &self.temp_table,
            self.temp_database.path(),
            &self.plan,
        ) else {
            debug!("Only the key column was supplied, nothing to merge");
            return Ok(0);
        };
        debug!("Merging temp table: {}", sql);
        self.connection.execute(&sql)?;
        Ok(0)
    }

    async fn done_temp_table(&mut self) -> Result<()> {
        if self.temp_connection.is_open() {
            if let Err(e) = self.temp_connection.close() {
                debug!("Closing temp database connection failed: {}", e);
            }
        }
        // Best effort: the merge outcome stands whatever happens to the file.
        if let Err(e) = self.temp_database.remove() {
            warn!(
                "Could not remove temp database {}: {}",
                self.temp_database.path().display(),
                e
            );
        }
        Ok(())
    }
}

/// Copy of the template database, deleted with its lock file.
#[derive(Debug)]
struct TempDatabase {
    path: PathBuf,
    removed: bool,
}

impl TempDatabase {
    fn create(template: &Path, directory: &Path, suffix: &str) -> Result<Self> {
        if !template.is_file() {
            return Err(BulkError::FileNotFound(template.to_path_buf()));
        }
        let extension = template
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("accdb");
        let path = directory.join(format!("bulk_update_{}.{}", suffix, extension));
        fs::copy(template, &path)?;
        debug!("Created temp database {}", path.display());
        Ok(Self {
            path,
            removed: false,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn remove(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }
        remove_if_present(&lock_file_path(&self.path))?;
        remove_if_present(&self.path)?;
        self.removed = true;
        Ok(())
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            debug!("Could not remove temp database {}: {}", self.path.display(), e);
        }
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// `.ldb` for `.mdb` files, `.laccdb` otherwise.
fn lock_file_path(database: &Path) -> PathBuf {
    let is_mdb = database
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("mdb"));
    database.with_extension(if is_mdb { "ldb" } else { "laccdb" })
}

fn select_into_statement(
    destination: &str,
    temp_table: &str,
    temp_path: &Path,
    plan: &UpdatePlan,
) -> String {
    let columns: Vec<String> = plan.columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "SELECT {} INTO {} IN '{}' FROM {} WHERE 1 = 0",
        columns.join(", "),
        quote_ident(temp_table),
        escape_sql_string(&temp_path.display().to_string()),
        quote_ident(destination)
    )
}

fn primary_key_statement(temp_table: &str, primary_key: &str) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
        quote_ident(temp_table),
        quote_ident(&format!("PK_{}", temp_table)),
        quote_ident(primary_key)
    )
}

/// Join update against the temp file, or `None` when only the key was staged.
fn update_statement(
    destination: &str,
    temp_table: &str,
    temp_path: &Path,
    plan: &UpdatePlan,
) -> Option<String> {
    if !plan.has_set_columns() {
        return None;
    }
    let assignments: Vec<String> = plan
        .set_columns()
        .map(|c| {
            let c = quote_ident(c);
            format!("d.{c} = t.{c}")
        })
        .collect();
    let key = quote_ident(&plan.primary_key);
    Some(format!(
        "UPDATE {} AS d INNER JOIN [;DATABASE={}].{} AS t ON d.{key} = t.{key} SET {}",
        quote_ident(destination),
        temp_path.display(),
        quote_ident(temp_table),
        assignments.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::CharacterSet;

    fn plan(columns: &[&str]) -> UpdatePlan {
        UpdatePlan {
            primary_key: "Id".into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_statements() {
        let path = Path::new("/tmp/bulk_update_1.accdb");
        assert_eq!(
            select_into_statement("Items", "BulkUpdate_1", path, &plan(&["Id", "Val"])),
            "SELECT [Id], [Val] INTO [BulkUpdate_1] IN '/tmp/bulk_update_1.accdb' \
             FROM [Items] WHERE 1 = 0"
        );
        assert_eq!(
            primary_key_statement("BulkUpdate_1", "Id"),
            "ALTER TABLE [BulkUpdate_1] ADD CONSTRAINT [PK_BulkUpdate_1] PRIMARY KEY ([Id])"
        );
        assert_eq!(
            update_statement("Items", "BulkUpdate_1", path, &plan(&["Id", "Val"])).unwrap(),
            "UPDATE [Items] AS d INNER JOIN [;DATABASE=/tmp/bulk_update_1.accdb].[BulkUpdate_1] \
             AS t ON d.[Id] = t.[Id] SET d.[Val] = t.[Val]"
        );
        assert!(update_statement("Items", "BulkUpdate_1", path, &plan(&["Id"])).is_none());
    }

    #[test]
    fn test_lock_file_path() {
        assert_eq!(lock_file_path(Path::new("a/b.mdb")), PathBuf::from("a/b.ldb"));
        assert_eq!(lock_file_path(Path::new("a/b.accdb")), PathBuf::from("a/b.laccdb"));
    }

    #[test]
    fn test_temp_database_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("empty.accdb");
        fs::write(&template, b"template").unwrap();

        let mut db = TempDatabase::create(&template, dir.path(), "x1").unwrap();
        let path = db.path().to_path_buf();
        assert_eq!(path.file_name().unwrap(), "bulk_update_x1.accdb");
        assert_eq!(fs::read(&path).unwrap(), b"template");
        fs::write(lock_file_path(&path), b"lock").unwrap();

        db.remove().unwrap();
        assert!(!path.exists());
        assert!(!lock_file_path(&path).exists());

        let missing = TempDatabase::create(&dir.path().join("none.accdb"), dir.path(), "x2");
        assert!(matches!(missing, Err(BulkError::FileNotFound(_))));
    }

    #[test]
    fn test_temp_database_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("empty.mdb");
        fs::write(&template, b"template").unwrap();
        let path = {
            let db = TempDatabase::create(&template, dir.path(), "x3").unwrap();
            db.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("empty.accdb");
        fs::write(&template, b"template").unwrap();
        let temp_database = TempDatabase::create(&template, dir.path(), "x4").unwrap();
        let path = temp_database.path().to_path_buf();
        // A directory in place of the file makes the delete fail.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("held"), b"x").unwrap();

        let mut connection = MsAccessConnection::from_path(dir.path().join("shop.accdb")).unwrap();
        let temp_connection = connection.with_database_path(&path).unwrap();
        let mut run = MsAccessUpdateRun {
            connection: &mut connection,
            temp_connection,
            temp_database,
            destination: "Items".into(),
            plan: plan(&["Id", "Val"]),
            insert: MsAccessBulkInsert::new("BulkUpdate_x4").unwrap(),
            temp_table: "BulkUpdate_x4".into(),
        };
        assert!(run.done_temp_table().await.is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_template_from_options() {
        let update = MsAccessBulkUpdate::new("Items", "Id").unwrap();
        assert!(update.temp_database_template.is_none());
        let options = BulkOptions {
            temp_database_template: Some(PathBuf::from("/data/empty.accdb")),
            ..BulkOptions::default()
        };
        let update = MsAccessBulkUpdate::from_options("Items", "Id", &options).unwrap();
        assert_eq!(
            update.temp_database_template.as_deref(),
            Some(Path::new("/data/empty.accdb"))
        );
    }

    #[test]
    fn test_bulk_insert_settings_are_checked() {
        let update = MsAccessBulkUpdate::new("Items", "Id")
            .unwrap()
            .with_bulk_insert(|b| b.with_delimiter(';')?.with_character_set(CharacterSet::Oem))
            .unwrap();
        assert_eq!(update.insert.delimiter(), ';');
        assert_eq!(update.insert.character_set(), CharacterSet::Oem);

        let err = MsAccessBulkUpdate::new("Items", "Id")
            .unwrap()
            .with_bulk_insert(|b| b.with_character_set(CharacterSet::CodePage(37)))
            .unwrap_err();
        assert!(matches!(err, BulkError::InvalidArgument { param: "character_set", .. }));
    }
}
