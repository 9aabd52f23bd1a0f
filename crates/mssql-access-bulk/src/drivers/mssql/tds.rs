//! Conversion of [`SqlValue`]s into TDS bulk-load column data.
//!
//! Every value is coerced into the wire type of its destination column; the
//! bulk load rejects mismatched widths.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tiberius::numeric::Numeric;
use tiberius::ColumnData;
use uuid::Uuid;

use crate::core::{EnumValue, SqlValue};
use crate::defaults::parse;
use crate::error::{BulkError, Result};
use crate::schema::{ColumnSchema, SqlDbType};

/// Typed NULL for a destination column.
pub fn null_column_data(t: SqlDbType) -> ColumnData<'static> {
    match t {
        SqlDbType::BigInt => ColumnData::I64(None),
        SqlDbType::Int => ColumnData::I32(None),
        SqlDbType::SmallInt => ColumnData::I16(None),
        SqlDbType::TinyInt => ColumnData::U8(None),
        SqlDbType::Bit => ColumnData::Bit(None),
        SqlDbType::Real => ColumnData::F32(None),
        SqlDbType::Float | SqlDbType::Money | SqlDbType::SmallMoney => ColumnData::F64(None),
        SqlDbType::Decimal => ColumnData::Numeric(None),
        SqlDbType::UniqueIdentifier => ColumnData::Guid(None),
        SqlDbType::DateTime => ColumnData::DateTime(None),
        SqlDbType::SmallDateTime => ColumnData::SmallDateTime(None),
        SqlDbType::DateTime2 => ColumnData::DateTime2(None),
        SqlDbType::Date => ColumnData::Date(None),
        SqlDbType::Time => ColumnData::Time(None),
        SqlDbType::DateTimeOffset => ColumnData::DateTimeOffset(None),
        SqlDbType::Binary
        | SqlDbType::VarBinary
        | SqlDbType::Image
        | SqlDbType::Timestamp
        | SqlDbType::Udt => ColumnData::Binary(None),
        _ => ColumnData::String(None),
    }
}

/// Convert `value` into the wire type of `column`.
pub fn to_column_data(value: &SqlValue<'_>, column: &ColumnSchema) -> Result<ColumnData<'static>> {
    let Some(t) = column.sql_db_type() else {
        return Err(BulkError::unsupported_connection(
            "SQL Server bulk insert",
            column.column_type.vendor(),
        ));
    };
    if value.is_null() {
        return Ok(null_column_data(t));
    }

    let mismatch = || {
        BulkError::unsupported_data_type(
            value.type_name(),
            format!("column {} ({})", column.full_name(), t.type_name()),
            value,
        )
    };
    // datetime2/time/datetimeoffset precision is stored in the column size
    let scale = column.size.min(7) as u8;

    let data = match t {
        SqlDbType::BigInt => ColumnData::I64(Some(to_i64(value).ok_or_else(mismatch)?)),
        SqlDbType::Int => ColumnData::I32(Some(narrow(value).ok_or_else(mismatch)?)),
        SqlDbType::SmallInt => ColumnData::I16(Some(narrow(value).ok_or_else(mismatch)?)),
        SqlDbType::TinyInt => ColumnData::U8(Some(narrow(value).ok_or_else(mismatch)?)),
        SqlDbType::Bit => ColumnData::Bit(Some(to_bool(value).ok_or_else(mismatch)?)),
        SqlDbType::Real => {
            let f = to_f64(value).ok_or_else(mismatch)?;
            ColumnData::F32(Some(f as f32))
        }
        SqlDbType::Float | SqlDbType::Money | SqlDbType::SmallMoney => {
            ColumnData::F64(Some(to_f64(value).ok_or_else(mismatch)?))
        }
        SqlDbType::Decimal => {
            let mut d = to_decimal(value).ok_or_else(mismatch)?;
            d.rescale(u32::from(column.scale));
            ColumnData::Numeric(Some(Numeric::new_with_scale(
                d.mantissa(),
                d.scale() as u8,
            )))
        }
        SqlDbType::UniqueIdentifier => ColumnData::Guid(Some(to_uuid(value).ok_or_else(mismatch)?)),
        SqlDbType::DateTime => {
            let dt = to_datetime(value).ok_or_else(mismatch)?;
            ColumnData::DateTime(Some(legacy_datetime(dt).ok_or_else(mismatch)?))
        }
        SqlDbType::SmallDateTime => {
            let dt = to_datetime(value).ok_or_else(mismatch)?;
            ColumnData::SmallDateTime(Some(small_datetime(dt).ok_or_else(mismatch)?))
        }
        SqlDbType::DateTime2 => {
            let dt = to_datetime(value).ok_or_else(mismatch)?;
            ColumnData::DateTime2(Some(datetime2(dt, scale).ok_or_else(mismatch)?))
        }
        SqlDbType::Date => {
            let d = to_date(value).ok_or_else(mismatch)?;
            ColumnData::Date(Some(tds_date(d).ok_or_else(mismatch)?))
        }
        SqlDbType::Time => {
            let time = to_time(value).ok_or_else(mismatch)?;
            ColumnData::Time(Some(tds_time(time, scale)))
        }
        SqlDbType::DateTimeOffset => {
            let dto = to_datetime_offset(value).ok_or_else(mismatch)?;
            let dt2 = datetime2(dto.naive_utc(), scale).ok_or_else(mismatch)?;
            // Offset in minutes (integer division truncates sub-minute offsets)
            let offset_minutes = (dto.offset().local_minus_utc() / 60) as i16;
            ColumnData::DateTimeOffset(Some(tiberius::time::DateTimeOffset::new(
                dt2,
                offset_minutes,
            )))
        }
        SqlDbType::Binary
        | SqlDbType::VarBinary
        | SqlDbType::Image
        | SqlDbType::Timestamp
        | SqlDbType::Udt => ColumnData::Binary(Some(Cow::Owned(to_bytes(value).ok_or_else(mismatch)?))),
        _ => ColumnData::String(Some(Cow::Owned(to_text(value).ok_or_else(mismatch)?))),
    };
    Ok(data)
}

fn to_i64(value: &SqlValue<'_>) -> Option<i64> {
    match value {
        SqlValue::Bool(b) => Some(i64::from(*b)),
        SqlValue::I8(v) => Some(i64::from(*v)),
        SqlValue::U8(v) => Some(i64::from(*v)),
        SqlValue::I16(v) => Some(i64::from(*v)),
        SqlValue::U16(v) => Some(i64::from(*v)),
        SqlValue::I32(v) => Some(i64::from(*v)),
        SqlValue::U32(v) => Some(i64::from(*v)),
        SqlValue::I64(v) => Some(*v),
        SqlValue::U64(v) => i64::try_from(*v).ok(),
        SqlValue::Enum(EnumValue::I32(v)) => Some(i64::from(*v)),
        SqlValue::Enum(EnumValue::I64(v)) => Some(*v),
        SqlValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
        SqlValue::F32(f) if f.fract() == 0.0 => Some(*f as i64),
        SqlValue::F64(f) if f.fract() == 0.0 => Some(*f as i64),
        SqlValue::Text(s) => parse::parse_int(s),
        _ => None,
    }
}

fn narrow<T: TryFrom<i64>>(value: &SqlValue<'_>) -> Option<T> {
    to_i64(value).and_then(|v| T::try_from(v).ok())
}

fn to_f64(value: &SqlValue<'_>) -> Option<f64> {
    let f = match value {
        SqlValue::F32(f) => Some(f64::from(*f)),
        SqlValue::F64(f) => Some(*f),
        SqlValue::Decimal(d) => d.to_f64(),
        SqlValue::U64(v) => Some(*v as f64),
        SqlValue::Text(s) => parse::parse_f64(s),
        other => to_i64(other).map(|v| v as f64),
    };
    f.filter(|f| f.is_finite())
}

fn to_decimal(value: &SqlValue<'_>) -> Option<Decimal> {
    match value {
        SqlValue::Decimal(d) => Some(*d),
        SqlValue::F32(f) => Decimal::try_from(*f).ok(),
        SqlValue::F64(f) => Decimal::try_from(*f).ok(),
        SqlValue::U64(v) => Some(Decimal::from(*v)),
        SqlValue::Text(s) => parse::parse_decimal(s),
        other => to_i64(other).map(Decimal::from),
    }
}

fn to_bool(value: &SqlValue<'_>) -> Option<bool> {
    match value {
        SqlValue::Bool(b) => Some(*b),
        SqlValue::Text(s) => parse::parse_bool(s),
        other => to_i64(other).map(|v| v != 0),
    }
}

fn to_uuid(value: &SqlValue<'_>) -> Option<Uuid> {
    match value {
        SqlValue::Uuid(u) => Some(*u),
        SqlValue::Text(s) => parse::parse_guid(s),
        SqlValue::Bytes(b) => Uuid::from_slice(b).ok(),
        _ => None,
    }
}

fn to_datetime(value: &SqlValue<'_>) -> Option<NaiveDateTime> {
    match value {
        SqlValue::DateTime(dt) => Some(*dt),
        SqlValue::Date(d) => d.and_hms_opt(0, 0, 0),
        SqlValue::DateTimeOffset(dto) => Some(dto.naive_local()),
        SqlValue::Text(s) => parse::parse_datetime(s),
        _ => None,
    }
}

fn to_date(value: &SqlValue<'_>) -> Option<NaiveDate> {
    match value {
        SqlValue::Date(d) => Some(*d),
        SqlValue::DateTime(dt) => Some(dt.date()),
        SqlValue::DateTimeOffset(dto) => Some(dto.naive_local().date()),
        SqlValue::Text(s) => parse::parse_date(s),
        _ => None,
    }
}

fn to_time(value: &SqlValue<'_>) -> Option<NaiveTime> {
    match value {
        SqlValue::Time(t) => Some(*t),
        SqlValue::DateTime(dt) => Some(dt.time()),
        SqlValue::Text(s) => parse::parse_time(s),
        _ => None,
    }
}

fn to_datetime_offset(value: &SqlValue<'_>) -> Option<DateTime<FixedOffset>> {
    match value {
        SqlValue::DateTimeOffset(dto) => Some(*dto),
        SqlValue::DateTime(dt) => Some(DateTime::from_naive_utc_and_offset(
            *dt,
            FixedOffset::east_opt(0)?,
        )),
        SqlValue::Text(s) => parse::parse_datetime_offset(s),
        _ => None,
    }
}

fn to_bytes(value: &SqlValue<'_>) -> Option<Vec<u8>> {
    match value {
        SqlValue::Bytes(b) => Some(b.to_vec()),
        SqlValue::Uuid(u) => Some(u.as_bytes().to_vec()),
        _ => None,
    }
}

fn to_text(value: &SqlValue<'_>) -> Option<String> {
    match value {
        SqlValue::Text(s) => Some(s.to_string()),
        SqlValue::Bytes(_) => None,
        other => Some(other.to_string()),
    }
}

fn days_since(epoch: NaiveDate, date: NaiveDate) -> i64 {
    (date - epoch).num_days()
}

/// `datetime`: days since 1900-01-01 plus 1/300 second ticks.
fn legacy_datetime(dt: NaiveDateTime) -> Option<tiberius::time::DateTime> {
    let days = i32::try_from(days_since(NaiveDate::from_ymd_opt(1900, 1, 1)?, dt.date())).ok()?;
    let time = dt.time();
    let ticks = u64::from(time.num_seconds_from_midnight()) * 300
        + (u64::from(time.nanosecond()) * 300 + 500_000_000) / 1_000_000_000;
    Some(tiberius::time::DateTime::new(days, u32::try_from(ticks).ok()?))
}

/// `smalldatetime`: days since 1900-01-01 plus minutes since midnight.
fn small_datetime(dt: NaiveDateTime) -> Option<tiberius::time::SmallDateTime> {
    let days = u16::try_from(days_since(NaiveDate::from_ymd_opt(1900, 1, 1)?, dt.date())).ok()?;
    let minutes = (dt.time().num_seconds_from_midnight() / 60) as u16;
    Some(tiberius::time::SmallDateTime::new(days, minutes))
}

/// `date`: days since 0001-01-01.
fn tds_date(d: NaiveDate) -> Option<tiberius::time::Date> {
    let days = days_since(NaiveDate::from_ymd_opt(1, 1, 1)?, d);
    // Bounds check: dates before year 1 or beyond u32::MAX days are invalid
    u32::try_from(days).ok().map(tiberius::time::Date::new)
}

/// Time as increments of 10^-scale seconds since midnight.
fn tds_time(t: NaiveTime, scale: u8) -> tiberius::time::Time {
    let nanos = u64::from(t.num_seconds_from_midnight()) * 1_000_000_000 + u64::from(t.nanosecond());
    let increments = nanos / 10u64.pow(9 - u32::from(scale));
    tiberius::time::Time::new(increments, scale)
}

fn datetime2(dt: NaiveDateTime, scale: u8) -> Option<tiberius::time::DateTime2> {
    Some(tiberius::time::DateTime2::new(
        tds_date(dt.date())?,
        tds_time(dt.time(), scale),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(t: SqlDbType) -> ColumnSchema {
        ColumnSchema::sql_server("c", t).unwrap()
    }

    #[test]
    fn test_null_is_typed_by_destination() {
        let v = SqlValue::Null(crate::core::SqlNullType::Unknown);
        assert!(matches!(
            to_column_data(&v, &col(SqlDbType::BigInt)).unwrap(),
            ColumnData::I64(None)
        ));
        assert!(matches!(
            to_column_data(&v, &col(SqlDbType::NVarChar)).unwrap(),
            ColumnData::String(None)
        ));
    }

    #[test]
    fn test_integers_widen_and_narrow() {
        assert!(matches!(
            to_column_data(&SqlValue::I32(5), &col(SqlDbType::BigInt)).unwrap(),
            ColumnData::I64(Some(5))
        ));
        assert!(matches!(
            to_column_data(&SqlValue::I64(7), &col(SqlDbType::SmallInt)).unwrap(),
            ColumnData::I16(Some(7))
        ));
        assert!(to_column_data(&SqlValue::I64(70_000), &col(SqlDbType::SmallInt)).is_err());
        assert!(matches!(
            to_column_data(&SqlValue::Bool(true), &col(SqlDbType::TinyInt)).unwrap(),
            ColumnData::U8(Some(1))
        ));
    }

    #[test]
    fn test_text_column_accepts_display_values() {
        match to_column_data(&SqlValue::I32(12), &col(SqlDbType::NVarChar)).unwrap() {
            ColumnData::String(Some(s)) => assert_eq!(s, "12"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(to_column_data(&SqlValue::bytes_owned(vec![1]), &col(SqlDbType::NVarChar)).is_err());
    }

    #[test]
    fn test_decimal_rescaled_to_column() {
        let mut c = col(SqlDbType::Decimal);
        c.precision = 10;
        c.scale = 2;
        match to_column_data(&SqlValue::Decimal(Decimal::new(15, 1)), &c).unwrap() {
            ColumnData::Numeric(Some(n)) => {
                assert_eq!(n.scale(), 2);
                assert_eq!(n.value(), 150);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_legacy_datetime_ticks() {
        let dt = NaiveDate::from_ymd_opt(1900, 1, 2)
            .unwrap()
            .and_hms_milli_opt(0, 0, 1, 500)
            .unwrap();
        let v = legacy_datetime(dt).unwrap();
        assert_eq!(v.days(), 1);
        assert_eq!(v.seconds_fragments(), 450);
    }

    #[test]
    fn test_guid_from_text() {
        let u = Uuid::new_v4();
        match to_column_data(&SqlValue::text_owned(u.to_string()), &col(SqlDbType::UniqueIdentifier))
            .unwrap()
        {
            ColumnData::Guid(Some(g)) => assert_eq!(g, u),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wrong_vendor_column_rejected() {
        let c = ColumnSchema::ms_access("c", crate::schema::OleDbType::Integer).unwrap();
        assert!(to_column_data(&SqlValue::I32(1), &c).is_err());
    }
}
