//! SQL value types shared by the schema model, the readers and both bulk engines.
//!
//! Values read from a [`BulkActionDataReader`](crate::reader::BulkActionDataReader)
//! borrow from the reader's current row where possible, so string and byte data
//! use `Cow`.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Type hint carried by NULL values.
///
/// The TDS bulk load needs a typed NULL for every column, and column defaults
/// keep the type of the column they were resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Unknown,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Decimal,
    Char,
    String,
    Bytes,
    Uuid,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// Integer payload of an enum value.
///
/// 64-bit storage is only used when the enum's underlying type is 64 bits wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumValue {
    I32(i32),
    I64(i64),
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumValue::I32(v) => write!(f, "{}", v),
            EnumValue::I64(v) => write!(f, "{}", v),
        }
    }
}

/// SQL value enum for type-safe row handling.
///
/// # Lifetime
///
/// The `'a` lifetime allows borrowing from a reader's current row.
/// For owned data that outlives the row, use `.into_owned()`.
///
/// # Example
///
/// ```rust
/// use std::borrow::Cow;
/// use mssql_access_bulk::core::SqlValue;
///
/// let borrowed: SqlValue<'_> = SqlValue::Text(Cow::Borrowed("hello"));
/// let owned: SqlValue<'static> = borrowed.into_owned();
/// assert_eq!(owned.type_name(), "String");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    /// NULL with type hint.
    Null(SqlNullType),

    Bool(bool),
    I8(i8),
    /// Unsigned byte (tinyint).
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// Single character.
    Char(char),

    /// Text/string data with zero-copy support.
    Text(Cow<'a, str>),

    /// Binary data with zero-copy support.
    Bytes(Cow<'a, [u8]>),

    /// UUID/GUID value.
    Uuid(Uuid),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),

    /// Enumeration member, stored as its underlying integer.
    Enum(EnumValue),
}

impl<'a> SqlValue<'a> {
    /// Convert to a fully owned value with `'static` lifetime.
    #[must_use]
    pub fn into_owned(self) -> SqlValue<'static> {
        match self {
            SqlValue::Null(t) => SqlValue::Null(t),
            SqlValue::Bool(v) => SqlValue::Bool(v),
            SqlValue::I8(v) => SqlValue::I8(v),
            SqlValue::U8(v) => SqlValue::U8(v),
            SqlValue::I16(v) => SqlValue::I16(v),
            SqlValue::U16(v) => SqlValue::U16(v),
            SqlValue::I32(v) => SqlValue::I32(v),
            SqlValue::U32(v) => SqlValue::U32(v),
            SqlValue::I64(v) => SqlValue::I64(v),
            SqlValue::U64(v) => SqlValue::U64(v),
            SqlValue::F32(v) => SqlValue::F32(v),
            SqlValue::F64(v) => SqlValue::F64(v),
            SqlValue::Decimal(v) => SqlValue::Decimal(v),
            SqlValue::Char(v) => SqlValue::Char(v),
            SqlValue::Text(v) => SqlValue::Text(Cow::Owned(v.into_owned())),
            SqlValue::Bytes(v) => SqlValue::Bytes(Cow::Owned(v.into_owned())),
            SqlValue::Uuid(v) => SqlValue::Uuid(v),
            SqlValue::DateTime(v) => SqlValue::DateTime(v),
            SqlValue::DateTimeOffset(v) => SqlValue::DateTimeOffset(v),
            SqlValue::Date(v) => SqlValue::Date(v),
            SqlValue::Time(v) => SqlValue::Time(v),
            SqlValue::Enum(v) => SqlValue::Enum(v),
        }
    }

    /// Borrow this value without copying string or byte payloads.
    #[must_use]
    pub fn as_borrowed(&self) -> SqlValue<'_> {
        match self {
            SqlValue::Text(v) => SqlValue::Text(Cow::Borrowed(v.as_ref())),
            SqlValue::Bytes(v) => SqlValue::Bytes(Cow::Borrowed(v.as_ref())),
            other => other.clone_scalar(),
        }
    }

    fn clone_scalar<'b>(&self) -> SqlValue<'b> {
        match self {
            SqlValue::Null(t) => SqlValue::Null(*t),
            SqlValue::Bool(v) => SqlValue::Bool(*v),
            SqlValue::I8(v) => SqlValue::I8(*v),
            SqlValue::U8(v) => SqlValue::U8(*v),
            SqlValue::I16(v) => SqlValue::I16(*v),
            SqlValue::U16(v) => SqlValue::U16(*v),
            SqlValue::I32(v) => SqlValue::I32(*v),
            SqlValue::U32(v) => SqlValue::U32(*v),
            SqlValue::I64(v) => SqlValue::I64(*v),
            SqlValue::U64(v) => SqlValue::U64(*v),
            SqlValue::F32(v) => SqlValue::F32(*v),
            SqlValue::F64(v) => SqlValue::F64(*v),
            SqlValue::Decimal(v) => SqlValue::Decimal(*v),
            SqlValue::Char(v) => SqlValue::Char(*v),
            SqlValue::Text(v) => SqlValue::Text(Cow::Owned(v.to_string())),
            SqlValue::Bytes(v) => SqlValue::Bytes(Cow::Owned(v.to_vec())),
            SqlValue::Uuid(v) => SqlValue::Uuid(*v),
            SqlValue::DateTime(v) => SqlValue::DateTime(*v),
            SqlValue::DateTimeOffset(v) => SqlValue::DateTimeOffset(*v),
            SqlValue::Date(v) => SqlValue::Date(*v),
            SqlValue::Time(v) => SqlValue::Time(*v),
            SqlValue::Enum(v) => SqlValue::Enum(*v),
        }
    }

    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Get the SqlNullType for this value.
    #[must_use]
    pub fn null_type(&self) -> SqlNullType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => SqlNullType::Bool,
            SqlValue::I8(_) => SqlNullType::I8,
            SqlValue::U8(_) => SqlNullType::U8,
            SqlValue::I16(_) => SqlNullType::I16,
            SqlValue::U16(_) => SqlNullType::U16,
            SqlValue::I32(_) => SqlNullType::I32,
            SqlValue::U32(_) => SqlNullType::U32,
            SqlValue::I64(_) => SqlNullType::I64,
            SqlValue::U64(_) => SqlNullType::U64,
            SqlValue::F32(_) => SqlNullType::F32,
            SqlValue::F64(_) => SqlNullType::F64,
            SqlValue::Decimal(_) => SqlNullType::Decimal,
            SqlValue::Char(_) => SqlNullType::Char,
            SqlValue::Text(_) => SqlNullType::String,
            SqlValue::Bytes(_) => SqlNullType::Bytes,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::DateTime(_) => SqlNullType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Time(_) => SqlNullType::Time,
            SqlValue::Enum(EnumValue::I32(_)) => SqlNullType::I32,
            SqlValue::Enum(EnumValue::I64(_)) => SqlNullType::I64,
        }
    }

    /// Runtime type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null(_) => "Null",
            SqlValue::Bool(_) => "Boolean",
            SqlValue::I8(_) => "SByte",
            SqlValue::U8(_) => "Byte",
            SqlValue::I16(_) => "Int16",
            SqlValue::U16(_) => "UInt16",
            SqlValue::I32(_) => "Int32",
            SqlValue::U32(_) => "UInt32",
            SqlValue::I64(_) => "Int64",
            SqlValue::U64(_) => "UInt64",
            SqlValue::F32(_) => "Single",
            SqlValue::F64(_) => "Double",
            SqlValue::Decimal(_) => "Decimal",
            SqlValue::Char(_) => "Char",
            SqlValue::Text(_) => "String",
            SqlValue::Bytes(_) => "Bytes",
            SqlValue::Uuid(_) => "Guid",
            SqlValue::DateTime(_) => "DateTime",
            SqlValue::DateTimeOffset(_) => "DateTimeOffset",
            SqlValue::Date(_) => "Date",
            SqlValue::Time(_) => "Time",
            SqlValue::Enum(_) => "Enum",
        }
    }

    /// Borrow the text payload, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s.as_ref()),
            _ => None,
        }
    }
}

// Convenience constructors for common cases
impl<'a> SqlValue<'a> {
    /// Create a text value from a borrowed string slice.
    #[must_use]
    pub fn text_borrowed(s: &'a str) -> Self {
        SqlValue::Text(Cow::Borrowed(s))
    }

    /// Create a text value from an owned String.
    #[must_use]
    pub fn text_owned(s: String) -> SqlValue<'static> {
        SqlValue::Text(Cow::Owned(s))
    }

    /// Create a bytes value from an owned Vec<u8>.
    #[must_use]
    pub fn bytes_owned(b: Vec<u8>) -> SqlValue<'static> {
        SqlValue::Bytes(Cow::Owned(b))
    }
}

impl fmt::Display for SqlValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null(_) => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::I8(v) => write!(f, "{}", v),
            SqlValue::U8(v) => write!(f, "{}", v),
            SqlValue::I16(v) => write!(f, "{}", v),
            SqlValue::U16(v) => write!(f, "{}", v),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::U32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::U64(v) => write!(f, "{}", v),
            SqlValue::F32(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Char(v) => write!(f, "{}", v),
            SqlValue::Text(v) => f.write_str(v),
            SqlValue::Bytes(v) => {
                f.write_str("0x")?;
                for b in v.iter() {
                    write!(f, "{:02X}", b)?;
                }
                Ok(())
            }
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            SqlValue::DateTimeOffset(v) => write!(f, "{}", v.to_rfc3339()),
            SqlValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            SqlValue::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
            SqlValue::Enum(v) => write!(f, "{}", v),
        }
    }
}

// From implementations for common types
macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue<'static> {
                fn from(v: $ty) -> Self {
                    SqlValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    char => Char,
    Decimal => Decimal,
    Uuid => Uuid,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    NaiveDate => Date,
    NaiveTime => Time,
    EnumValue => Enum,
}

impl From<String> for SqlValue<'static> {
    fn from(v: String) -> Self {
        SqlValue::Text(Cow::Owned(v))
    }
}

impl<'a> From<&'a str> for SqlValue<'a> {
    fn from(v: &'a str) -> Self {
        SqlValue::Text(Cow::Borrowed(v))
    }
}

impl From<Vec<u8>> for SqlValue<'static> {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(Cow::Owned(v))
    }
}

impl<'a> From<&'a [u8]> for SqlValue<'a> {
    fn from(v: &'a [u8]) -> Self {
        SqlValue::Bytes(Cow::Borrowed(v))
    }
}

impl<'a, T> From<Option<T>> for SqlValue<'a>
where
    T: Into<SqlValue<'a>>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => SqlValue::Null(SqlNullType::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_into_owned() {
        let borrowed: SqlValue<'_> = SqlValue::Text(Cow::Borrowed("hello"));
        let owned: SqlValue<'static> = borrowed.into_owned();
        assert_eq!(owned, SqlValue::Text(Cow::Owned("hello".to_string())));
    }

    #[test]
    fn test_sql_value_is_null() {
        assert!(SqlValue::<'static>::Null(SqlNullType::String).is_null());
        assert!(!SqlValue::I32(42).is_null());
    }

    #[test]
    fn test_enum_null_type_follows_width() {
        assert_eq!(SqlValue::Enum(EnumValue::I32(3)).null_type(), SqlNullType::I32);
        assert_eq!(SqlValue::Enum(EnumValue::I64(3)).null_type(), SqlNullType::I64);
    }

    #[test]
    fn test_from_implementations() {
        let v: SqlValue<'static> = 42i32.into();
        assert_eq!(v, SqlValue::I32(42));

        let v: SqlValue<'static> = "hello".to_string().into();
        assert_eq!(v, SqlValue::Text(Cow::Owned("hello".to_string())));

        let v: SqlValue<'static> = Option::<i64>::None.into();
        assert!(v.is_null());
    }

    #[test]
    fn test_display_bytes_as_hex() {
        let v = SqlValue::bytes_owned(vec![0x0a, 0xff]);
        assert_eq!(v.to_string(), "0x0AFF");
    }
}
