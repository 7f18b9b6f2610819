//! SQL value types and the in-memory row snapshot used by the copier.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Type hint for NULL values.
///
/// SQL Server refuses some implicit conversions even for NULL (an nvarchar
/// NULL cannot be inserted into a varbinary column), so a NULL read from the
/// source keeps the type of its column and is bound with that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SqlNullType {
    Bool,
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SqlValue {
    /// NULL with type hint for correct parameter binding.
    Null(SqlNullType),

    /// bit
    Bool(bool),

    /// tinyint
    U8(u8),

    /// smallint
    I16(i16),

    /// int
    I32(i32),

    /// bigint
    I64(i64),

    /// real
    F32(f32),

    /// float, money, smallmoney
    F64(f64),

    /// char, varchar, nchar, nvarchar, text, ntext, xml
    String(String),

    /// binary, varbinary, image
    Bytes(Vec<u8>),

    /// uniqueidentifier
    Uuid(Uuid),

    /// decimal, numeric
    Decimal(Decimal),

    /// datetime, datetime2, smalldatetime
    DateTime(NaiveDateTime),

    /// datetimeoffset
    DateTimeOffset(DateTime<FixedOffset>),

    /// date
    Date(NaiveDate),

    /// time
    Time(NaiveTime),
}

impl SqlValue {
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
            SqlValue::U8(_) => SqlNullType::U8,
            SqlValue::I16(_) => SqlNullType::I16,
            SqlValue::I32(_) => SqlNullType::I32,
            SqlValue::I64(_) => SqlNullType::I64,
            SqlValue::F32(_) => SqlNullType::F32,
            SqlValue::F64(_) => SqlNullType::F64,
            SqlValue::String(_) => SqlNullType::String,
            SqlValue::Bytes(_) => SqlNullType::Bytes,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::Decimal(_) => SqlNullType::Decimal,
            SqlValue::DateTime(_) => SqlNullType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Time(_) => SqlNullType::Time,
        }
    }
}

// From implementations for common types
impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

/// The full contents of one table, held in memory for the duration of its copy.
///
/// Rows are positional: `rows[i][j]` is the value of `columns[j]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSnapshot {
    /// Column names in result-set order.
    pub columns: Vec<String>,

    /// Row values in the order the source returned them.
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSnapshot {
    /// Create a snapshot from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the snapshot holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_is_null() {
        assert!(SqlValue::Null(SqlNullType::String).is_null());
        assert!(!SqlValue::I32(42).is_null());
    }

    #[test]
    fn test_null_type_follows_value() {
        assert_eq!(SqlValue::Bytes(vec![1]).null_type(), SqlNullType::Bytes);
        assert_eq!(
            SqlValue::Null(SqlNullType::Date).null_type(),
            SqlNullType::Date
        );
    }

    #[test]
    fn test_from_implementations() {
        let v: SqlValue = 42i32.into();
        assert_eq!(v, SqlValue::I32(42));

        let v: SqlValue = "hello".into();
        assert_eq!(v, SqlValue::String("hello".to_string()));
    }

    #[test]
    fn test_snapshot_len() {
        let snapshot = RowSnapshot::new(
            vec!["Id".into(), "Name".into()],
            vec![
                vec![SqlValue::I32(1), "a".into()],
                vec![SqlValue::I32(2), "b".into()],
            ],
        );
        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot.is_empty());
        assert!(RowSnapshot::default().is_empty());
    }
}
