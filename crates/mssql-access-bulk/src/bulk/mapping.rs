//! Column mappings between a data reader and a destination table.

use serde::{Deserialize, Serialize};

use crate::error::{BulkError, DestinationMappingError, Result, SourceMappingError};
use crate::reader::BulkActionDataReader;
use crate::schema::TableSchema;

/// Ordinal of a mapping side addressed by name, or not addressed at all.
pub const UNSET_ORDINAL: i32 = -1;

/// One source-to-destination column correspondence.
///
/// Each side is addressed either by name or by ordinal. Setting one clears
/// the other, and deserializing a side with both set fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MappingFields")]
pub struct BulkInsertColumnMapping {
    source_name: String,
    source_ordinal: i32,
    destination_name: String,
    destination_ordinal: i32,
}

impl Default for BulkInsertColumnMapping {
    fn default() -> Self {
        Self {
            source_name: String::new(),
            source_ordinal: UNSET_ORDINAL,
            destination_name: String::new(),
            destination_ordinal: UNSET_ORDINAL,
        }
    }
}

/// Mapping as written in configuration. An empty name or [`UNSET_ORDINAL`]
/// leaves that field unset.
#[derive(Debug, Deserialize)]
struct MappingFields {
    source_name: Option<String>,
    source_ordinal: Option<i32>,
    destination_name: Option<String>,
    destination_ordinal: Option<i32>,
}

impl TryFrom<MappingFields> for BulkInsertColumnMapping {
    type Error = BulkError;

    fn try_from(fields: MappingFields) -> Result<Self> {
        let set_name = |n: Option<String>| n.filter(|n| !n.is_empty());
        let set_ordinal = |o: Option<i32>| o.filter(|o| *o != UNSET_ORDINAL);

        let mut m = Self::new();
        match (set_name(fields.source_name), set_ordinal(fields.source_ordinal)) {
            (Some(_), Some(_)) => {
                return Err(BulkError::invalid_argument(
                    "source",
                    "source_name and source_ordinal are mutually exclusive",
                ))
            }
            (Some(name), None) => m.set_source_name(name)?,
            (None, Some(ordinal)) => m.set_source_ordinal(ordinal)?,
            (None, None) => {}
        }
        match (
            set_name(fields.destination_name),
            set_ordinal(fields.destination_ordinal),
        ) {
            (Some(_), Some(_)) => {
                return Err(BulkError::invalid_argument(
                    "destination",
                    "destination_name and destination_ordinal are mutually exclusive",
                ))
            }
            (Some(name), None) => m.set_destination_name(name)?,
            (None, Some(ordinal)) => m.set_destination_ordinal(ordinal)?,
            (None, None) => {}
        }
        Ok(m)
    }
}

fn check_ordinal(param: &'static str, ordinal: i32) -> Result<()> {
    if ordinal < 0 {
        return Err(BulkError::out_of_range(
            param,
            format!("ordinal must be >= 0, got {}", ordinal),
        ));
    }
    Ok(())
}

impl BulkInsertColumnMapping {
    /// Mapping with both sides unset.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_name(source: impl Into<String>, destination: impl Into<String>) -> Result<Self> {
        let mut m = Self::new();
        m.set_source_name(source)?;
        m.set_destination_name(destination)?;
        Ok(m)
    }

    pub fn by_ordinal(source: i32, destination: i32) -> Result<Self> {
        let mut m = Self::new();
        m.set_source_ordinal(source)?;
        m.set_destination_ordinal(destination)?;
        Ok(m)
    }

    /// Source addressed by name, destination by ordinal.
    pub fn name_to_ordinal(source: impl Into<String>, destination: i32) -> Result<Self> {
        let mut m = Self::new();
        m.set_source_name(source)?;
        m.set_destination_ordinal(destination)?;
        Ok(m)
    }

    /// Source addressed by ordinal, destination by name.
    pub fn ordinal_to_name(source: i32, destination: impl Into<String>) -> Result<Self> {
        let mut m = Self::new();
        m.set_source_ordinal(source)?;
        m.set_destination_name(destination)?;
        Ok(m)
    }

    /// Source column name; empty when addressed by ordinal.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Source ordinal; [`UNSET_ORDINAL`] when addressed by name.
    pub fn source_ordinal(&self) -> i32 {
        self.source_ordinal
    }

    pub fn destination_name(&self) -> &str {
        &self.destination_name
    }

    pub fn destination_ordinal(&self) -> i32 {
        self.destination_ordinal
    }

    pub fn set_source_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        crate::error::require_name("source_name", &name)?;
        self.source_name = name;
        self.source_ordinal = UNSET_ORDINAL;
        Ok(())
    }

    pub fn set_source_ordinal(&mut self, ordinal: i32) -> Result<()> {
        check_ordinal("source_ordinal", ordinal)?;
        self.source_ordinal = ordinal;
        self.source_name.clear();
        Ok(())
    }

    pub fn set_destination_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        crate::error::require_name("destination_name", &name)?;
        self.destination_name = name;
        self.destination_ordinal = UNSET_ORDINAL;
        Ok(())
    }

    pub fn set_destination_ordinal(&mut self, ordinal: i32) -> Result<()> {
        check_ordinal("destination_ordinal", ordinal)?;
        self.destination_ordinal = ordinal;
        self.destination_name.clear();
        Ok(())
    }
}

/// Ordered list of column mappings. Empty means implicit by-name mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMappings(Vec<BulkInsertColumnMapping>);

impl ColumnMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mapping: BulkInsertColumnMapping) -> &mut Self {
        self.0.push(mapping);
        self
    }

    pub fn add_by_name(
        &mut self,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Result<&mut Self> {
        self.0.push(BulkInsertColumnMapping::by_name(source, destination)?);
        Ok(self)
    }

    pub fn add_by_ordinal(&mut self, source: i32, destination: i32) -> Result<&mut Self> {
        self.0.push(BulkInsertColumnMapping::by_ordinal(source, destination)?);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BulkInsertColumnMapping> {
        self.0.iter()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl From<Vec<BulkInsertColumnMapping>> for ColumnMappings {
    fn from(v: Vec<BulkInsertColumnMapping>) -> Self {
        Self(v)
    }
}

impl<'a> IntoIterator for &'a ColumnMappings {
    type Item = &'a BulkInsertColumnMapping;
    type IntoIter = std::slice::Iter<'a, BulkInsertColumnMapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A mapping resolved against a reader and a destination schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    pub source_ordinal: usize,
    /// Destination column name as the schema spells it.
    pub destination: String,
}

/// Resolve `mappings` for `reader` against `table`.
///
/// With no mappings every reader field must name a destination column.
pub fn resolve_mappings<R>(
    reader: &R,
    mappings: &ColumnMappings,
    table: &TableSchema,
) -> Result<Vec<ResolvedMapping>>
where
    R: BulkActionDataReader + ?Sized,
{
    if mappings.is_empty() {
        return resolve_implicit(reader, table);
    }

    mappings
        .iter()
        .enumerate()
        .map(|(index, m)| {
            Ok(ResolvedMapping {
                source_ordinal: resolve_source(reader, index, m)?,
                destination: resolve_destination(table, index, m)?,
            })
        })
        .collect()
}

fn resolve_implicit<R>(reader: &R, table: &TableSchema) -> Result<Vec<ResolvedMapping>>
where
    R: BulkActionDataReader + ?Sized,
{
    (0..reader.field_count())
        .map(|i| {
            let name = reader.get_name(i)?;
            let destination = table.canonical_column_name(name).ok_or_else(|| {
                BulkError::ColumnNotInDestination {
                    table: table.name().to_string(),
                    column: name.to_string(),
                }
            })?;
            Ok(ResolvedMapping {
                source_ordinal: i,
                destination: destination.to_string(),
            })
        })
        .collect()
}

fn resolve_source<R>(reader: &R, index: usize, m: &BulkInsertColumnMapping) -> Result<usize>
where
    R: BulkActionDataReader + ?Sized,
{
    if !m.source_name.is_empty() {
        return reader.get_ordinal(&m.source_name).map_err(|_| {
            BulkError::source_mapping(index, SourceMappingError::InvalidName(m.source_name.clone()))
        });
    }
    match m.source_ordinal {
        UNSET_ORDINAL => Err(BulkError::source_mapping(index, SourceMappingError::Unset)),
        o if o < 0 || o as usize >= reader.field_count() => Err(BulkError::source_mapping(
            index,
            SourceMappingError::InvalidOrdinal(o),
        )),
        o => Ok(o as usize),
    }
}

fn resolve_destination(
    table: &TableSchema,
    index: usize,
    m: &BulkInsertColumnMapping,
) -> Result<String> {
    let err = |kind| BulkError::destination_mapping(index, table.name(), kind);

    if !m.destination_name.is_empty() {
        return table
            .canonical_column_name(&m.destination_name)
            .map(str::to_string)
            .ok_or_else(|| err(DestinationMappingError::InvalidName(m.destination_name.clone())));
    }
    match m.destination_ordinal {
        UNSET_ORDINAL => Err(err(DestinationMappingError::Unset)),
        o if o < 0 => Err(err(DestinationMappingError::InvalidOrdinal(o))),
        o => table
            .columns()
            .get_index(o as usize)
            .map(|c| c.name().to_string())
            .ok_or_else(|| {
                err(DestinationMappingError::OrdinalOutOfRange {
                    ordinal: o,
                    column_count: table.columns().len(),
                })
            }),
    }
}
