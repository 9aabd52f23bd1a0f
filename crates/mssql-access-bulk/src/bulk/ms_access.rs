//! Access bulk insert by text-file staging.
//!
//! Access has no bulk load protocol. Rows are written to `data.csv` next to a
//! `schema.ini` describing its columns, and a single
//! `INSERT INTO ... SELECT ... FROM [Text;Database=folder].[data.csv]`
//! imports them through the text driver.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::BulkOptions;
use crate::drivers::{quote_ident, Connection, MsAccessConnection};
use crate::error::{require_name, BulkError, Result};
use crate::loader::{MsAccessSchemaLoader, SchemaCache, SchemaLoader};
use crate::reader::BulkActionDataReader;
use crate::schema::{ColumnSchema, TableSchema};

use super::csv::CsvWriter;
use super::mapping::{resolve_mappings, ColumnMappings};
use super::schema_ini::{self, CharacterSet};
use super::BulkInsert;

const DATA_FILE: &str = "data.csv";
const SCHEMA_FILE: &str = "schema.ini";

/// Default field delimiter of staged files.
pub const DEFAULT_DELIMITER: char = ',';

/// Bulk insert engine for Access databases.
#[derive(Debug, Clone)]
pub struct MsAccessBulkInsert {
    destination_table_name: String,
    column_mappings: ColumnMappings,
    delimiter: char,
    character_set: CharacterSet,
    staging_root: Option<PathBuf>,
    schema_cache: Option<Arc<SchemaCache>>,
}

impl MsAccessBulkInsert {
    pub fn new(destination_table_name: impl Into<String>) -> Result<Self> {
        let destination_table_name = destination_table_name.into();
        require_name("destination_table_name", &destination_table_name)?;
        Ok(Self {
            destination_table_name,
            column_mappings: ColumnMappings::new(),
            delimiter: DEFAULT_DELIMITER,
            character_set: CharacterSet::default(),
            staging_root: None,
            schema_cache: None,
        })
    }

    pub fn from_options(
        destination_table_name: impl Into<String>,
        options: &BulkOptions,
    ) -> Result<Self> {
        Ok(Self::new(destination_table_name)?
            .with_delimiter(options.delimiter)?
            .with_character_set(CharacterSet::from_code_page(options.code_page))?)
    }

    /// Field delimiter. Quotes and whitespace are rejected.
    pub fn with_delimiter(mut self, delimiter: char) -> Result<Self> {
        check_delimiter(delimiter)?;
        self.delimiter = delimiter;
        Ok(self)
    }

    /// Character set of staged files. Numeric code pages need a known
    /// encoding; ANSI and OEM stage ASCII text only.
    pub fn with_character_set(mut self, character_set: CharacterSet) -> Result<Self> {
        check_character_set(character_set)?;
        self.character_set = character_set;
        Ok(self)
    }

    pub fn with_column_mappings(mut self, mappings: ColumnMappings) -> Self {
        self.column_mappings = mappings;
        self
    }

    /// Directory that receives staging folders; defaults to the system temp dir.
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    pub fn with_schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.schema_cache = Some(cache);
        self
    }

    pub fn set_destination_table_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        require_name("destination_table_name", &name)?;
        self.destination_table_name = name;
        Ok(())
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn character_set(&self) -> CharacterSet {
        self.character_set
    }

    pub fn column_mappings_mut(&mut self) -> &mut ColumnMappings {
        &mut self.column_mappings
    }

    /// Stage every row of `reader` and import it into the destination table.
    ///
    /// Without a caller transaction the connection is cycled (closed if open,
    /// then opened) before the import. Returns the number of rows staged.
    pub async fn write_to_database(
        &self,
        connection: &mut MsAccessConnection,
        reader: &mut dyn BulkActionDataReader,
    ) -> Result<u64> {
        let table = self.destination_schema(connection).await?;
        let mappings = resolve_mappings(&*reader, &self.column_mappings, &table)?;
        let mut columns = Vec::with_capacity(mappings.len());
        for m in &mappings {
            let column = table
                .columns()
                .get(&m.destination)
                .ok_or_else(|| BulkError::ColumnNotInDestination {
                    table: table.name().to_string(),
                    column: m.destination.clone(),
                })?;
            columns.push((m.source_ordinal, column));
        }

        let root = self.staging_root.clone().unwrap_or_else(std::env::temp_dir);
        let staging = StagingFolder::create(&root)?;
        let started = Instant::now();
        let rows = staging.write(reader, &columns, self.delimiter, self.character_set)?;

        let data_file = staging.data_file();
        match fs::metadata(&data_file) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BulkError::FileNotFound(data_file))
            }
            Err(e) => return Err(e.into()),
            Ok(meta) if meta.len() == 0 => {
                debug!(
                    "No rows staged for {}, skipping import",
                    self.destination_table_name
                );
                return Ok(0);
            }
            Ok(_) => {}
        }

        if !connection.in_transaction() {
            if connection.is_open() {
                connection.close()?;
            }
            connection.open()?;
        }

        let destinations: Vec<&ColumnSchema> = columns.iter().map(|(_, c)| *c).collect();
        let sql = import_statement(&self.destination_table_name, &destinations, staging.path());
        debug!("Access import: {}", sql);
        connection.execute(&sql)?;

        info!(
            "Bulk inserted {} rows into {} in {:.2}s",
            rows,
            self.destination_table_name,
            started.elapsed().as_secs_f64()
        );
        Ok(rows)
    }

    async fn destination_schema(&self, connection: &mut MsAccessConnection) -> Result<TableSchema> {
        load_destination(
            connection,
            self.schema_cache.as_deref(),
            &self.destination_table_name,
        )
        .await
    }
}

/// Destination table schema, through `cache` when one is configured.
pub(crate) async fn load_destination(
    connection: &mut MsAccessConnection,
    cache: Option<&SchemaCache>,
    table_name: &str,
) -> Result<TableSchema> {
    let name = catalog_name(table_name);
    let table = match cache {
        Some(cache) => {
            cache
                .get_table_schema(Connection::MsAccess(connection), name)
                .await?
        }
        None => {
            MsAccessSchemaLoader::new()
                .load_table_schema(Connection::MsAccess(connection), name)
                .await?
        }
    };
    table.ok_or_else(|| BulkError::TableNotFound(table_name.to_string()))
}

#[async_trait]
impl BulkInsert for MsAccessBulkInsert {
    fn destination_table_name(&self) -> &str {
        &self.destination_table_name
    }

    fn column_mappings(&self) -> &ColumnMappings {
        &self.column_mappings
    }

    async fn insert_async(
        &self,
        connection: Connection<'_>,
        reader: &mut dyn BulkActionDataReader,
    ) -> Result<u64> {
        match connection {
            Connection::MsAccess(c) => self.write_to_database(c, reader).await,
            other => Err(BulkError::unsupported_connection(
                "MsAccessBulkInsert",
                other.type_name(),
            )),
        }
    }
}

pub(crate) fn check_delimiter(delimiter: char) -> Result<()> {
    if delimiter == '"' || delimiter.is_whitespace() {
        return Err(BulkError::invalid_argument(
            "delimiter",
            format!("{:?} cannot separate staged fields", delimiter),
        ));
    }
    Ok(())
}

pub(crate) fn check_character_set(character_set: CharacterSet) -> Result<()> {
    if !character_set.is_supported() {
        return Err(BulkError::invalid_argument(
            "character_set",
            format!("code page {} has no known encoding", character_set),
        ));
    }
    Ok(())
}

pub(crate) fn catalog_name(name: &str) -> &str {
    name.trim().trim_start_matches('[').trim_end_matches(']')
}

/// `INSERT ... SELECT` reading the staged file. Text columns turn NULL into ''.
fn import_statement(table: &str, columns: &[&ColumnSchema], folder: &Path) -> String {
    let targets: Vec<String> = columns.iter().map(|c| quote_ident(c.name())).collect();
    let fields: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let field = format!("F{}", i + 1);
            let alias = quote_ident(c.name());
            if c.ole_db_type().is_some_and(|t| t.is_text()) {
                format!("IIF({field} IS NULL, '', {field}) AS {alias}")
            } else {
                format!("{field} AS {alias}")
            }
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) SELECT {} FROM [Text;Database={}].[{}]",
        quote_ident(catalog_name(table)),
        targets.join(", "),
        fields.join(", "),
        folder.display(),
        DATA_FILE
    )
}

/// Uniquely named folder with the staged files. Removed on drop.
#[derive(Debug)]
struct StagingFolder {
    path: PathBuf,
}

impl StagingFolder {
    fn create(root: &Path) -> Result<Self> {
        let path = root.join(format!("bulk_{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&path)?;
        debug!("Created staging folder {}", path.display());
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn data_file(&self) -> PathBuf {
        self.path.join(DATA_FILE)
    }

    /// Write `data.csv` and `schema.ini`; returns the number of records.
    fn write(
        &self,
        reader: &mut dyn BulkActionDataReader,
        columns: &[(usize, &ColumnSchema)],
        delimiter: char,
        character_set: CharacterSet,
    ) -> Result<u64> {
        let destinations: Vec<&ColumnSchema> = columns.iter().map(|(_, c)| *c).collect();
        let ini = schema_ini::render(DATA_FILE, delimiter, character_set, &destinations)?;
        fs::write(self.path.join(SCHEMA_FILE), ini)?;

        let file = BufWriter::new(File::create(self.data_file())?);
        let mut writer = CsvWriter::with_character_set(file, delimiter, character_set)?;
        while reader.read()? {
            for (source, _) in columns {
                writer.write_value(&reader.get_value(*source)?)?;
            }
            writer.end_record()?;
        }
        writer.flush()?;
        Ok(writer.records())
    }
}

impl Drop for StagingFolder {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            debug!("Could not remove staging folder {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SqlNullType, SqlValue};
    use crate::drivers::SqlServerConnection;
    use crate::reader::EnumerableDataReader;
    use crate::schema::OleDbType;

    fn column(name: &str, t: OleDbType, size: u32) -> ColumnSchema {
        let mut c = ColumnSchema::ms_access(name, t).unwrap();
        c.size = size;
        c
    }

    #[test]
    fn test_import_statement() {
        let id = column("Id", OleDbType::Integer, 0);
        let name = column("Name", OleDbType::WChar, 50);
        let sql = import_statement("People", &[&id, &name], Path::new("/tmp/bulk_1"));
        assert_eq!(
            sql,
            "INSERT INTO [People] ([Id], [Name]) SELECT F1 AS [Id], \
             IIF(F2 IS NULL, '', F2) AS [Name] FROM [Text;Database=/tmp/bulk_1].[data.csv]"
        );
    }

    #[test]
    fn test_delimiter_validation() {
        let engine = MsAccessBulkInsert::new("People").unwrap();
        assert_eq!(engine.delimiter(), ',');
        assert!(engine.clone().with_delimiter(';').is_ok());
        assert!(engine.clone().with_delimiter('"').is_err());
        assert!(engine.with_delimiter('\t').is_err());
    }

    #[test]
    fn test_staging_writes_files_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let id = column("Id", OleDbType::Integer, 0);
        let name = column("Name", OleDbType::WChar, 20);
        let mut reader = EnumerableDataReader::new(
            vec!["Name".into(), "Id".into()],
            vec![
                vec![SqlValue::text_owned("Ann".into()), SqlValue::I32(1)],
                vec![SqlValue::Null(SqlNullType::String), SqlValue::I32(2)],
            ],
        );

        let folder = StagingFolder::create(root.path()).unwrap();
        let path = folder.path().to_path_buf();
        let rows = folder
            .write(&mut reader, &[(1, &id), (0, &name)], ';', CharacterSet::UTF8)
            .unwrap();
        assert_eq!(rows, 2);

        let data = fs::read_to_string(folder.data_file()).unwrap();
        assert_eq!(data, "1; \"Ann\"\r\n2; \r\n");
        let ini = fs::read_to_string(path.join(SCHEMA_FILE)).unwrap();
        assert!(ini.contains("Col1=F1 Long\r\nCol2=F2 Text Width 20\r\n"));

        drop(folder);
        assert!(!path.exists());
    }

    #[test]
    fn test_empty_reader_stages_empty_file() {
        let root = tempfile::tempdir().unwrap();
        let id = column("Id", OleDbType::Integer, 0);
        let mut reader = EnumerableDataReader::from_values("Id", Vec::<i32>::new());
        let folder = StagingFolder::create(root.path()).unwrap();
        assert_eq!(folder.write(&mut reader, &[(0, &id)], ',', CharacterSet::Ansi).unwrap(), 0);
        assert_eq!(fs::metadata(folder.data_file()).unwrap().len(), 0);
    }

    #[test]
    fn test_staged_bytes_match_declared_code_page() {
        let root = tempfile::tempdir().unwrap();
        let name = column("Name", OleDbType::WChar, 20);
        let mut reader = EnumerableDataReader::from_values("Name", vec!["č"]);

        let folder = StagingFolder::create(root.path()).unwrap();
        let rows = folder
            .write(&mut reader, &[(0, &name)], ',', CharacterSet::from_code_page(1250))
            .unwrap();
        assert_eq!(rows, 1);

        let ini = fs::read_to_string(folder.path().join(SCHEMA_FILE)).unwrap();
        assert!(ini.contains("CharacterSet=1250\r\n"));
        assert_eq!(fs::read(folder.data_file()).unwrap(), b"\"\xE8\"\r\n");
    }

    #[test]
    fn test_character_set_from_options() {
        let mut options = BulkOptions::default();
        let engine = MsAccessBulkInsert::from_options("People", &options).unwrap();
        assert_eq!(engine.character_set(), CharacterSet::UTF8);

        options.code_page = 0;
        let engine = MsAccessBulkInsert::from_options("People", &options).unwrap();
        assert_eq!(engine.character_set(), CharacterSet::Ansi);

        options.code_page = 37;
        assert!(MsAccessBulkInsert::from_options("People", &options).is_err());
    }

    #[tokio::test]
    async fn test_rejects_sql_server_connection() {
        let engine = MsAccessBulkInsert::new("People").unwrap();
        let mut sql = SqlServerConnection::new("Server=db;Database=Sales").unwrap();
        let mut reader = EnumerableDataReader::from_values("Id", vec![1i32]);
        let err = engine
            .insert_async(Connection::from(&mut sql), &mut reader)
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::UnsupportedConnection { .. }));
    }
}
