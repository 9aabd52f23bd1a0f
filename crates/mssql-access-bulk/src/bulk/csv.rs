//! Delimited text writer for Access text-file staging.
//!
//! Values are separated by the delimiter plus one space, NULL is written as
//! nothing, and records end with CRLF. Text is encoded in the character set
//! the staged `schema.ini` declares, UTF-8 by default.

use std::borrow::Cow;
use std::io::Write;

use encoding_rs::Encoding;

use super::schema_ini::CharacterSet;
use crate::core::{EnumValue, SqlValue};
use crate::error::{BulkError, Result};

/// Most fractional digits written for floating point and decimal values.
pub const MAX_FRACTION_DIGITS: u32 = 11;

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Writes records of [`SqlValue`]s.
#[derive(Debug)]
pub struct CsvWriter<W: Write> {
    inner: W,
    separator: Vec<u8>,
    character_set: CharacterSet,
    /// `None` restricts output to ASCII.
    encoding: Option<&'static Encoding>,
    at_record_start: bool,
    records: u64,
}

impl<W: Write> CsvWriter<W> {
    /// UTF-8 writer.
    pub fn new(inner: W, delimiter: char) -> Self {
        Self {
            inner,
            separator: format!("{} ", delimiter).into_bytes(),
            character_set: CharacterSet::UTF8,
            encoding: Some(encoding_rs::UTF_8),
            at_record_start: true,
            records: 0,
        }
    }

    /// Writer encoding text in `character_set`. ANSI and OEM take ASCII only.
    pub fn with_character_set(
        inner: W,
        delimiter: char,
        character_set: CharacterSet,
    ) -> Result<Self> {
        if !character_set.is_supported() {
            return Err(BulkError::invalid_argument(
                "character_set",
                format!("code page {} has no known encoding", character_set),
            ));
        }
        let mut writer = Self::new(inner, delimiter);
        writer.character_set = character_set;
        writer.encoding = character_set.encoding();
        writer.separator = writer.encode(&format!("{} ", delimiter))?.into_owned();
        Ok(writer)
    }

    pub fn character_set(&self) -> CharacterSet {
        self.character_set
    }

    /// Write one field of the current record.
    pub fn write_value(&mut self, value: &SqlValue<'_>) -> Result<()> {
        let text = format_value(value)?;
        let bytes = match &text {
            Some(text) => Some(self.encode(text)?),
            None => None,
        };
        if !self.at_record_start {
            self.inner.write_all(&self.separator)?;
        }
        self.at_record_start = false;
        if let Some(bytes) = bytes {
            self.inner.write_all(&bytes)?;
        }
        Ok(())
    }

    /// Terminate the current record.
    pub fn end_record(&mut self) -> Result<()> {
        self.inner.write_all(b"\r\n")?;
        self.at_record_start = true;
        self.records += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn encode<'t>(&self, text: &'t str) -> Result<Cow<'t, [u8]>> {
        match self.encoding {
            Some(encoding) if encoding == encoding_rs::UTF_8 => Ok(Cow::Borrowed(text.as_bytes())),
            Some(encoding) => {
                let (bytes, _, unmappable) = encoding.encode(text);
                if unmappable {
                    return Err(self.unencodable(text));
                }
                Ok(bytes)
            }
            None if text.is_ascii() => Ok(Cow::Borrowed(text.as_bytes())),
            None => Err(self.unencodable(text)),
        }
    }

    fn unencodable(&self, text: &str) -> BulkError {
        BulkError::Unencodable {
            text: text.to_string(),
            character_set: self.character_set.to_string(),
        }
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Trim trailing fractional zeros and a dangling decimal point.
fn trim_fraction(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        t => t.to_string(),
    }
}

fn format_f64(v: f64, value: &SqlValue<'_>) -> Result<String> {
    if !v.is_finite() {
        return Err(BulkError::unsupported_data_type(value.type_name(), "CSV export", value));
    }
    Ok(trim_fraction(format!("{:.*}", MAX_FRACTION_DIGITS as usize, v)))
}

/// Text for one value, or `None` for NULL.
pub fn format_value(value: &SqlValue<'_>) -> Result<Option<String>> {
    let text = match value {
        SqlValue::Null(_) => return Ok(None),
        SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        SqlValue::I8(v) => v.to_string(),
        SqlValue::U8(v) => v.to_string(),
        SqlValue::I16(v) => v.to_string(),
        SqlValue::U16(v) => v.to_string(),
        SqlValue::I32(v) => v.to_string(),
        SqlValue::U32(v) => v.to_string(),
        SqlValue::I64(v) => v.to_string(),
        SqlValue::U64(v) => v.to_string(),
        // Shortest f32 text first, so 0.1f32 stays 0.1.
        SqlValue::F32(v) => format_f64(v.to_string().parse().unwrap_or(f64::NAN), value)?,
        SqlValue::F64(v) => format_f64(*v, value)?,
        SqlValue::Decimal(d) => trim_fraction(d.round_dp(MAX_FRACTION_DIGITS).to_string()),
        SqlValue::Char(c) => quote(&c.to_string()),
        SqlValue::Text(s) => quote(s),
        SqlValue::Uuid(u) => u.hyphenated().to_string(),
        SqlValue::DateTime(dt) => quote(&dt.format(DATE_TIME_FORMAT).to_string()),
        SqlValue::Date(d) => quote(
            &d.and_time(chrono::NaiveTime::MIN)
                .format(DATE_TIME_FORMAT)
                .to_string(),
        ),
        SqlValue::Enum(EnumValue::I32(v)) => v.to_string(),
        SqlValue::Enum(EnumValue::I64(v)) => v.to_string(),
        other @ (SqlValue::Bytes(_) | SqlValue::Time(_) | SqlValue::DateTimeOffset(_)) => {
            return Err(BulkError::unsupported_data_type(
                other.type_name(),
                "CSV export",
                other,
            ))
        }
    };
    Ok(Some(text))
}
