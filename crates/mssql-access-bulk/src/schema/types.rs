//! Vendor type codes and command parameters.
//!
//! Columns keep the type code their vendor catalog reports. No translation to
//! a shared type system happens; [`ColumnType`] only tags which vendor the code
//! belongs to.

use std::fmt;

use crate::core::{SqlNullType, SqlValue};
use crate::error::{BulkError, Result};

/// SQL Server column type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDbType {
    BigInt,
    Binary,
    Bit,
    Char,
    DateTime,
    Decimal,
    Float,
    Image,
    Int,
    Money,
    NChar,
    NText,
    NVarChar,
    Real,
    UniqueIdentifier,
    SmallDateTime,
    SmallInt,
    SmallMoney,
    Text,
    Timestamp,
    TinyInt,
    VarBinary,
    VarChar,
    Variant,
    Xml,
    Udt,
    Date,
    Time,
    DateTime2,
    DateTimeOffset,
}

impl SqlDbType {
    /// Map an `INFORMATION_SCHEMA.COLUMNS.DATA_TYPE` string to a type code.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let t = match name.trim().to_lowercase().as_str() {
            "bigint" => SqlDbType::BigInt,
            "binary" => SqlDbType::Binary,
            "bit" => SqlDbType::Bit,
            "char" => SqlDbType::Char,
            "datetime" => SqlDbType::DateTime,
            "decimal" | "numeric" => SqlDbType::Decimal,
            "float" => SqlDbType::Float,
            "image" => SqlDbType::Image,
            "int" => SqlDbType::Int,
            "money" => SqlDbType::Money,
            "nchar" => SqlDbType::NChar,
            "ntext" => SqlDbType::NText,
            "nvarchar" | "sysname" => SqlDbType::NVarChar,
            "real" => SqlDbType::Real,
            "uniqueidentifier" => SqlDbType::UniqueIdentifier,
            "smalldatetime" => SqlDbType::SmallDateTime,
            "smallint" => SqlDbType::SmallInt,
            "smallmoney" => SqlDbType::SmallMoney,
            "text" => SqlDbType::Text,
            "timestamp" | "rowversion" => SqlDbType::Timestamp,
            "tinyint" => SqlDbType::TinyInt,
            "varbinary" => SqlDbType::VarBinary,
            "varchar" => SqlDbType::VarChar,
            "sql_variant" => SqlDbType::Variant,
            "xml" => SqlDbType::Xml,
            "hierarchyid" | "geometry" | "geography" => SqlDbType::Udt,
            "date" => SqlDbType::Date,
            "time" => SqlDbType::Time,
            "datetime2" => SqlDbType::DateTime2,
            "datetimeoffset" => SqlDbType::DateTimeOffset,
            _ => return None,
        };
        Some(t)
    }

    /// T-SQL keyword for this type.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlDbType::BigInt => "bigint",
            SqlDbType::Binary => "binary",
            SqlDbType::Bit => "bit",
            SqlDbType::Char => "char",
            SqlDbType::DateTime => "datetime",
            SqlDbType::Decimal => "decimal",
            SqlDbType::Float => "float",
            SqlDbType::Image => "image",
            SqlDbType::Int => "int",
            SqlDbType::Money => "money",
            SqlDbType::NChar => "nchar",
            SqlDbType::NText => "ntext",
            SqlDbType::NVarChar => "nvarchar",
            SqlDbType::Real => "real",
            SqlDbType::UniqueIdentifier => "uniqueidentifier",
            SqlDbType::SmallDateTime => "smalldatetime",
            SqlDbType::SmallInt => "smallint",
            SqlDbType::SmallMoney => "smallmoney",
            SqlDbType::Text => "text",
            SqlDbType::Timestamp => "timestamp",
            SqlDbType::TinyInt => "tinyint",
            SqlDbType::VarBinary => "varbinary",
            SqlDbType::VarChar => "varchar",
            SqlDbType::Variant => "sql_variant",
            SqlDbType::Xml => "xml",
            SqlDbType::Udt => "udt",
            SqlDbType::Date => "date",
            SqlDbType::Time => "time",
            SqlDbType::DateTime2 => "datetime2",
            SqlDbType::DateTimeOffset => "datetimeoffset",
        }
    }

    /// True for types whose declaration carries a length.
    pub fn has_length(&self) -> bool {
        matches!(
            self,
            SqlDbType::Binary
                | SqlDbType::Char
                | SqlDbType::NChar
                | SqlDbType::NVarChar
                | SqlDbType::VarBinary
                | SqlDbType::VarChar
        )
    }

    /// True for character types.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            SqlDbType::Char
                | SqlDbType::NChar
                | SqlDbType::NText
                | SqlDbType::NVarChar
                | SqlDbType::Text
                | SqlDbType::VarChar
                | SqlDbType::Xml
        )
    }

    /// NULL type hint for values of this column type.
    pub fn null_type(&self) -> SqlNullType {
        match self {
            SqlDbType::BigInt => SqlNullType::I64,
            SqlDbType::Int => SqlNullType::I32,
            SqlDbType::SmallInt => SqlNullType::I16,
            SqlDbType::TinyInt => SqlNullType::U8,
            SqlDbType::Bit => SqlNullType::Bool,
            SqlDbType::Real => SqlNullType::F32,
            SqlDbType::Float => SqlNullType::F64,
            SqlDbType::Decimal | SqlDbType::Money | SqlDbType::SmallMoney => SqlNullType::Decimal,
            SqlDbType::UniqueIdentifier => SqlNullType::Uuid,
            SqlDbType::DateTime | SqlDbType::SmallDateTime | SqlDbType::DateTime2 => {
                SqlNullType::DateTime
            }
            SqlDbType::Date => SqlNullType::Date,
            SqlDbType::Time => SqlNullType::Time,
            SqlDbType::DateTimeOffset => SqlNullType::DateTimeOffset,
            SqlDbType::Binary
            | SqlDbType::VarBinary
            | SqlDbType::Image
            | SqlDbType::Timestamp
            | SqlDbType::Udt => SqlNullType::Bytes,
            SqlDbType::Variant => SqlNullType::Unknown,
            _ => SqlNullType::String,
        }
    }
}

/// Access (OLE DB) column type codes, with their numeric OLE DB values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OleDbType {
    Empty = 0,
    SmallInt = 2,
    Integer = 3,
    Single = 4,
    Double = 5,
    Currency = 6,
    Date = 7,
    BSTR = 8,
    IDispatch = 9,
    Error = 10,
    Boolean = 11,
    Variant = 12,
    IUnknown = 13,
    Decimal = 14,
    TinyInt = 16,
    UnsignedTinyInt = 17,
    UnsignedSmallInt = 18,
    UnsignedInt = 19,
    BigInt = 20,
    UnsignedBigInt = 21,
    Filetime = 64,
    Guid = 72,
    Binary = 128,
    Char = 129,
    WChar = 130,
    Numeric = 131,
    DBDate = 133,
    DBTime = 134,
    DBTimeStamp = 135,
    PropVariant = 138,
    VarNumeric = 139,
    VarChar = 200,
    LongVarChar = 201,
    VarWChar = 202,
    LongVarWChar = 203,
    VarBinary = 204,
    LongVarBinary = 205,
}

impl OleDbType {
    /// Look up a type by its numeric OLE DB code.
    pub fn from_code(code: i32) -> Option<Self> {
        use OleDbType::*;
        const ALL: [OleDbType; 37] = [
            Empty,
            SmallInt,
            Integer,
            Single,
            Double,
            Currency,
            Date,
            BSTR,
            IDispatch,
            Error,
            Boolean,
            Variant,
            IUnknown,
            Decimal,
            TinyInt,
            UnsignedTinyInt,
            UnsignedSmallInt,
            UnsignedInt,
            BigInt,
            UnsignedBigInt,
            Filetime,
            Guid,
            Binary,
            Char,
            WChar,
            Numeric,
            DBDate,
            DBTime,
            DBTimeStamp,
            PropVariant,
            VarNumeric,
            VarChar,
            LongVarChar,
            VarWChar,
            LongVarWChar,
            VarBinary,
            LongVarBinary,
        ];
        ALL.iter().copied().find(|t| *t as i32 == code)
    }

    /// Numeric OLE DB code.
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Map an Access ODBC `TYPE_NAME` to the type OLE DB reports for it.
    pub fn from_access_type_name(name: &str) -> Option<Self> {
        let t = match name.trim().to_uppercase().as_str() {
            "COUNTER" | "AUTOINCREMENT" | "INTEGER" | "LONG" | "INT" => OleDbType::Integer,
            "SMALLINT" | "SHORT" => OleDbType::SmallInt,
            "BYTE" | "TINYINT" => OleDbType::UnsignedTinyInt,
            "REAL" | "SINGLE" => OleDbType::Single,
            "DOUBLE" | "FLOAT" => OleDbType::Double,
            "CURRENCY" | "MONEY" => OleDbType::Currency,
            "DATETIME" | "DATE" | "TIME" | "TIMESTAMP" => OleDbType::Date,
            "BIT" | "YESNO" | "LOGICAL" | "BOOLEAN" => OleDbType::Boolean,
            "VARCHAR" | "TEXT" | "CHAR" | "NVARCHAR" | "NCHAR" => OleDbType::WChar,
            "LONGCHAR" | "MEMO" | "LONGTEXT" | "NTEXT" => OleDbType::LongVarWChar,
            "GUID" | "UNIQUEIDENTIFIER" => OleDbType::Guid,
            "DECIMAL" | "NUMERIC" => OleDbType::Numeric,
            "BIGINT" => OleDbType::BigInt,
            "BINARY" | "VARBINARY" => OleDbType::Binary,
            "LONGBINARY" | "OLEOBJECT" | "IMAGE" => OleDbType::LongVarBinary,
            _ => return None,
        };
        Some(t)
    }

    /// Access DDL keyword for this type.
    pub fn type_name(&self) -> &'static str {
        match self {
            OleDbType::SmallInt | OleDbType::UnsignedSmallInt => "SHORT",
            OleDbType::Integer | OleDbType::UnsignedInt => "LONG",
            OleDbType::BigInt | OleDbType::UnsignedBigInt => "BIGINT",
            OleDbType::TinyInt | OleDbType::UnsignedTinyInt => "BYTE",
            OleDbType::Single => "SINGLE",
            OleDbType::Double => "DOUBLE",
            OleDbType::Currency => "CURRENCY",
            OleDbType::Date
            | OleDbType::DBDate
            | OleDbType::DBTime
            | OleDbType::DBTimeStamp
            | OleDbType::Filetime => "DATETIME",
            OleDbType::Boolean => "BIT",
            OleDbType::Decimal | OleDbType::Numeric | OleDbType::VarNumeric => "DECIMAL",
            OleDbType::Guid => "GUID",
            OleDbType::Char
            | OleDbType::WChar
            | OleDbType::VarChar
            | OleDbType::VarWChar
            | OleDbType::BSTR => "TEXT",
            OleDbType::LongVarChar | OleDbType::LongVarWChar => "MEMO",
            OleDbType::Binary | OleDbType::VarBinary => "BINARY",
            OleDbType::LongVarBinary => "LONGBINARY",
            _ => "VARIANT",
        }
    }

    /// True for character types.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            OleDbType::BSTR
                | OleDbType::Char
                | OleDbType::WChar
                | OleDbType::VarChar
                | OleDbType::LongVarChar
                | OleDbType::VarWChar
                | OleDbType::LongVarWChar
        )
    }

    /// NULL type hint for values of this column type.
    pub fn null_type(&self) -> SqlNullType {
        match self {
            OleDbType::SmallInt => SqlNullType::I16,
            OleDbType::UnsignedSmallInt => SqlNullType::U16,
            OleDbType::Integer => SqlNullType::I32,
            OleDbType::UnsignedInt => SqlNullType::U32,
            OleDbType::BigInt => SqlNullType::I64,
            OleDbType::UnsignedBigInt => SqlNullType::U64,
            OleDbType::TinyInt => SqlNullType::I8,
            OleDbType::UnsignedTinyInt => SqlNullType::U8,
            OleDbType::Single => SqlNullType::F32,
            OleDbType::Double => SqlNullType::F64,
            OleDbType::Currency
            | OleDbType::Decimal
            | OleDbType::Numeric
            | OleDbType::VarNumeric => SqlNullType::Decimal,
            OleDbType::Date | OleDbType::DBTimeStamp | OleDbType::Filetime => {
                SqlNullType::DateTime
            }
            OleDbType::DBDate => SqlNullType::Date,
            OleDbType::DBTime => SqlNullType::Time,
            OleDbType::Boolean => SqlNullType::Bool,
            OleDbType::Guid => SqlNullType::Uuid,
            OleDbType::Binary | OleDbType::VarBinary | OleDbType::LongVarBinary => {
                SqlNullType::Bytes
            }
            t if t.is_text() => SqlNullType::String,
            _ => SqlNullType::Unknown,
        }
    }
}

/// Vendor-tagged column type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    SqlServer(SqlDbType),
    MsAccess(OleDbType),
}

impl ColumnType {
    /// Vendor name, used in error messages.
    pub fn vendor(&self) -> &'static str {
        match self {
            ColumnType::SqlServer(_) => "SqlServer",
            ColumnType::MsAccess(_) => "MsAccess",
        }
    }

    pub fn is_text(&self) -> bool {
        match self {
            ColumnType::SqlServer(t) => t.is_text(),
            ColumnType::MsAccess(t) => t.is_text(),
        }
    }

    pub fn null_type(&self) -> SqlNullType {
        match self {
            ColumnType::SqlServer(t) => t.null_type(),
            ColumnType::MsAccess(t) => t.null_type(),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::SqlServer(t) => write!(f, "SqlDbType::{:?}", t),
            ColumnType::MsAccess(t) => write!(f, "OleDbType::{:?}", t),
        }
    }
}

/// Typed command parameter configured from a column schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec<T> {
    pub name: String,
    pub db_type: Option<T>,
    /// Length in characters or bytes; 0 means unlimited.
    pub size: u32,
    pub precision: u8,
    pub scale: u8,
    pub is_nullable: bool,
    pub value: SqlValue<'static>,
}

impl<T> ParameterSpec<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_type: None,
            size: 0,
            precision: 0,
            scale: 0,
            is_nullable: true,
            value: SqlValue::Null(SqlNullType::Unknown),
        }
    }
}

/// Vendor command parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandParameter {
    SqlServer(ParameterSpec<SqlDbType>),
    MsAccess(ParameterSpec<OleDbType>),
}

impl CommandParameter {
    /// Empty SQL Server parameter named `@name`.
    pub fn sql_server(name: &str) -> Self {
        CommandParameter::SqlServer(ParameterSpec::new(format!(
            "@{}",
            name.trim_start_matches('@')
        )))
    }

    /// Empty Access parameter. Access binds positionally, the name is informational.
    pub fn ms_access(name: &str) -> Self {
        CommandParameter::MsAccess(ParameterSpec::new(name))
    }

    pub fn vendor(&self) -> &'static str {
        match self {
            CommandParameter::SqlServer(_) => "SqlServer",
            CommandParameter::MsAccess(_) => "MsAccess",
        }
    }

    /// Render the parameter's type declaration, e.g. `nvarchar(50)` or `decimal(18, 2)`.
    pub fn declaration(&self) -> Result<String> {
        match self {
            CommandParameter::SqlServer(p) => {
                let t = p.db_type.ok_or_else(|| {
                    BulkError::InvalidOperation(format!("parameter {} has no type", p.name))
                })?;
                Ok(match t {
                    SqlDbType::Decimal => format!("decimal({}, {})", p.precision, p.scale),
                    SqlDbType::DateTime2 | SqlDbType::Time | SqlDbType::DateTimeOffset
                        if p.scale > 0 =>
                    {
                        format!("{}({})", t.type_name(), p.scale)
                    }
                    t if t.has_length() => {
                        if p.size == 0 {
                            format!("{}(max)", t.type_name())
                        } else {
                            format!("{}({})", t.type_name(), p.size)
                        }
                    }
                    t => t.type_name().to_string(),
                })
            }
            CommandParameter::MsAccess(p) => {
                let t = p.db_type.ok_or_else(|| {
                    BulkError::InvalidOperation(format!("parameter {} has no type", p.name))
                })?;
                Ok(match t.type_name() {
                    "TEXT" if p.size > 0 && p.size <= 255 => format!("TEXT({})", p.size),
                    "TEXT" => "MEMO".to_string(),
                    "DECIMAL" => format!("DECIMAL({}, {})", p.precision, p.scale),
                    name => name.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_type_names_parse_case_insensitively() {
        assert_eq!(SqlDbType::from_type_name("NVARCHAR"), Some(SqlDbType::NVarChar));
        assert_eq!(SqlDbType::from_type_name("numeric"), Some(SqlDbType::Decimal));
        assert_eq!(SqlDbType::from_type_name("rowversion"), Some(SqlDbType::Timestamp));
        assert_eq!(SqlDbType::from_type_name("vector"), None);
    }

    #[test]
    fn test_access_type_names() {
        assert_eq!(OleDbType::from_access_type_name("COUNTER"), Some(OleDbType::Integer));
        assert_eq!(OleDbType::from_access_type_name("varchar"), Some(OleDbType::WChar));
        assert_eq!(
            OleDbType::from_access_type_name("LONGCHAR"),
            Some(OleDbType::LongVarWChar)
        );
        assert_eq!(OleDbType::from_access_type_name("BIT"), Some(OleDbType::Boolean));
    }

    #[test]
    fn test_oledb_codes() {
        assert_eq!(OleDbType::from_code(130), Some(OleDbType::WChar));
        assert_eq!(OleDbType::Guid.code(), 72);
        assert_eq!(OleDbType::from_code(1), None);
    }

    #[test]
    fn test_parameter_declarations() {
        let mut p = CommandParameter::sql_server("Name");
        if let CommandParameter::SqlServer(spec) = &mut p {
            assert_eq!(spec.name, "@Name");
            spec.db_type = Some(SqlDbType::NVarChar);
            spec.size = 50;
        }
        assert_eq!(p.declaration().unwrap(), "nvarchar(50)");

        let mut p = CommandParameter::sql_server("@Blob");
        if let CommandParameter::SqlServer(spec) = &mut p {
            spec.db_type = Some(SqlDbType::VarBinary);
        }
        assert_eq!(p.declaration().unwrap(), "varbinary(max)");

        let mut p = CommandParameter::ms_access("Amount");
        if let CommandParameter::MsAccess(spec) = &mut p {
            spec.db_type = Some(OleDbType::Numeric);
            spec.precision = 18;
            spec.scale = 2;
        }
        assert_eq!(p.declaration().unwrap(), "DECIMAL(18, 2)");
    }

    #[test]
    fn test_untyped_parameter_declaration_fails() {
        assert!(CommandParameter::sql_server("x").declaration().is_err());
    }
}
