//! Zero values used when a NOT NULL column has no usable default.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::core::SqlValue;
use crate::schema::{ColumnType, OleDbType, SqlDbType};

fn base_datetime() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1900, 1, 1)?.and_hms_opt(0, 0, 0)
}

fn base_date() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1900, 1, 1)
}

fn base_time() -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(0, 0, 0)
}

fn base_datetime_offset() -> Option<DateTime<FixedOffset>> {
    Some(DateTime::from_naive_utc_and_offset(
        base_datetime()?,
        FixedOffset::east_opt(0)?,
    ))
}

/// Zero value for a SQL Server type, or `None` when the type has none.
pub fn sql_server_zero(t: SqlDbType) -> Option<SqlValue<'static>> {
    let v = match t {
        SqlDbType::BigInt => SqlValue::I64(0),
        SqlDbType::Int => SqlValue::I32(0),
        SqlDbType::SmallInt => SqlValue::I16(0),
        SqlDbType::TinyInt => SqlValue::U8(0),
        SqlDbType::Bit => SqlValue::Bool(false),
        SqlDbType::Real => SqlValue::F32(0.0),
        SqlDbType::Float => SqlValue::F64(0.0),
        SqlDbType::Decimal | SqlDbType::Money | SqlDbType::SmallMoney => {
            SqlValue::Decimal(Decimal::ZERO)
        }
        SqlDbType::DateTime | SqlDbType::SmallDateTime | SqlDbType::DateTime2 => {
            SqlValue::DateTime(base_datetime()?)
        }
        SqlDbType::Date => SqlValue::Date(base_date()?),
        SqlDbType::Time => SqlValue::Time(base_time()?),
        SqlDbType::DateTimeOffset => SqlValue::DateTimeOffset(base_datetime_offset()?),
        SqlDbType::UniqueIdentifier => SqlValue::Uuid(Uuid::nil()),
        SqlDbType::Char
        | SqlDbType::NChar
        | SqlDbType::VarChar
        | SqlDbType::NVarChar
        | SqlDbType::Text
        | SqlDbType::NText
        | SqlDbType::Xml => SqlValue::text_owned(String::new()),
        SqlDbType::Binary | SqlDbType::VarBinary | SqlDbType::Image | SqlDbType::Timestamp => {
            SqlValue::bytes_owned(Vec::new())
        }
        SqlDbType::Variant | SqlDbType::Udt => return None,
    };
    Some(v)
}

/// Zero value for an Access type, or `None` when the type has none.
pub fn ms_access_zero(t: OleDbType) -> Option<SqlValue<'static>> {
    let v = match t {
        OleDbType::SmallInt => SqlValue::I16(0),
        OleDbType::UnsignedSmallInt => SqlValue::U16(0),
        OleDbType::Integer => SqlValue::I32(0),
        OleDbType::UnsignedInt => SqlValue::U32(0),
        OleDbType::BigInt => SqlValue::I64(0),
        OleDbType::UnsignedBigInt => SqlValue::U64(0),
        OleDbType::TinyInt => SqlValue::I8(0),
        OleDbType::UnsignedTinyInt => SqlValue::U8(0),
        OleDbType::Single => SqlValue::F32(0.0),
        OleDbType::Double => SqlValue::F64(0.0),
        OleDbType::Currency | OleDbType::Decimal | OleDbType::Numeric | OleDbType::VarNumeric => {
            SqlValue::Decimal(Decimal::ZERO)
        }
        OleDbType::Date | OleDbType::DBTimeStamp | OleDbType::Filetime => {
            SqlValue::DateTime(base_datetime()?)
        }
        OleDbType::DBDate => SqlValue::Date(base_date()?),
        OleDbType::DBTime => SqlValue::Time(base_time()?),
        OleDbType::Boolean => SqlValue::Bool(false),
        OleDbType::Guid => SqlValue::Uuid(Uuid::nil()),
        OleDbType::BSTR
        | OleDbType::Char
        | OleDbType::WChar
        | OleDbType::VarChar
        | OleDbType::LongVarChar
        | OleDbType::VarWChar
        | OleDbType::LongVarWChar => SqlValue::text_owned(String::new()),
        OleDbType::Binary | OleDbType::VarBinary | OleDbType::LongVarBinary => {
            SqlValue::bytes_owned(Vec::new())
        }
        _ => return None,
    };
    Some(v)
}

/// Zero value for any vendor column type.
pub fn zero_value(column_type: ColumnType) -> Option<SqlValue<'static>> {
    match column_type {
        ColumnType::SqlServer(t) => sql_server_zero(t),
        ColumnType::MsAccess(t) => ms_access_zero(t),
    }
}
