//! Conversions between tiberius column data and [`SqlValue`].

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{ColumnData, FromSql, ToSql};
use tracing::warn;
use uuid::Uuid;

use crate::core::value::{SqlNullType, SqlValue};
use crate::error::Result;

/// Decode one cell of a result row.
pub fn from_column_data(data: ColumnData<'static>) -> Result<SqlValue> {
    let value = match data {
        ColumnData::Bit(v) => v.map_or(SqlValue::Null(SqlNullType::Bool), SqlValue::Bool),
        ColumnData::U8(v) => v.map_or(SqlValue::Null(SqlNullType::U8), SqlValue::U8),
        ColumnData::I16(v) => v.map_or(SqlValue::Null(SqlNullType::I16), SqlValue::I16),
        ColumnData::I32(v) => v.map_or(SqlValue::Null(SqlNullType::I32), SqlValue::I32),
        ColumnData::I64(v) => v.map_or(SqlValue::Null(SqlNullType::I64), SqlValue::I64),
        ColumnData::F32(v) => v.map_or(SqlValue::Null(SqlNullType::F32), SqlValue::F32),
        ColumnData::F64(v) => v.map_or(SqlValue::Null(SqlNullType::F64), SqlValue::F64),
        ColumnData::String(v) => v.map_or(SqlValue::Null(SqlNullType::String), |s| {
            SqlValue::String(s.into_owned())
        }),
        ColumnData::Guid(v) => v.map_or(SqlValue::Null(SqlNullType::Uuid), SqlValue::Uuid),
        ColumnData::Binary(v) => v.map_or(SqlValue::Null(SqlNullType::Bytes), |b| {
            SqlValue::Bytes(b.into_owned())
        }),
        ColumnData::Xml(v) => v.map_or(SqlValue::Null(SqlNullType::String), |x| {
            SqlValue::String(x.into_owned().into_string())
        }),
        ref numeric @ ColumnData::Numeric(_) => Decimal::from_sql(numeric)?
            .map_or(SqlValue::Null(SqlNullType::Decimal), SqlValue::Decimal),
        ref dt @ (ColumnData::DateTime(_)
        | ColumnData::SmallDateTime(_)
        | ColumnData::DateTime2(_)) => NaiveDateTime::from_sql(dt)?
            .map_or(SqlValue::Null(SqlNullType::DateTime), SqlValue::DateTime),
        ref d @ ColumnData::Date(_) => NaiveDate::from_sql(d)?
            .map_or(SqlValue::Null(SqlNullType::Date), SqlValue::Date),
        ref t @ ColumnData::Time(_) => NaiveTime::from_sql(t)?
            .map_or(SqlValue::Null(SqlNullType::Time), SqlValue::Time),
        ref dto @ ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(dto)?
            .map_or(
                SqlValue::Null(SqlNullType::DateTimeOffset),
                SqlValue::DateTimeOffset,
            ),
    };
    Ok(value)
}

/// Convert a value to a boxed parameter for `Client::execute`.
///
/// NULLs are bound with the type of the column they came from.
pub fn to_sql_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null(null_type) => null_param(*null_type),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::U8(v) => Box::new(*v),
        SqlValue::I16(v) => Box::new(*v),
        SqlValue::I32(v) => Box::new(*v),
        SqlValue::I64(v) => Box::new(*v),
        SqlValue::F32(f) => {
            if f.is_finite() {
                Box::new(*f)
            } else {
                // SQL Server has no NaN/Infinity
                warn!("Converting F32 NaN/Infinity to NULL for SQL Server compatibility");
                Box::new(Option::<f32>::None)
            }
        }
        SqlValue::F64(f) => {
            if f.is_finite() {
                Box::new(*f)
            } else {
                warn!("Converting F64 NaN/Infinity to NULL for SQL Server compatibility");
                Box::new(Option::<f64>::None)
            }
        }
        SqlValue::String(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::DateTimeOffset(dto) => Box::new(*dto),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(*t),
    }
}

fn null_param(null_type: SqlNullType) -> Box<dyn ToSql> {
    match null_type {
        SqlNullType::Bool => Box::new(Option::<bool>::None),
        SqlNullType::U8 => Box::new(Option::<u8>::None),
        SqlNullType::I16 => Box::new(Option::<i16>::None),
        SqlNullType::I32 => Box::new(Option::<i32>::None),
        SqlNullType::I64 => Box::new(Option::<i64>::None),
        SqlNullType::F32 => Box::new(Option::<f32>::None),
        SqlNullType::F64 => Box::new(Option::<f64>::None),
        SqlNullType::String => Box::new(Option::<String>::None),
        SqlNullType::Bytes => Box::new(Option::<Vec<u8>>::None),
        SqlNullType::Uuid => Box::new(Option::<Uuid>::None),
        SqlNullType::Decimal => Box::new(Option::<Decimal>::None),
        SqlNullType::DateTime => Box::new(Option::<NaiveDateTime>::None),
        SqlNullType::DateTimeOffset => Box::new(Option::<DateTime<FixedOffset>>::None),
        SqlNullType::Date => Box::new(Option::<NaiveDate>::None),
        SqlNullType::Time => Box::new(Option::<NaiveTime>::None),
    }
}
