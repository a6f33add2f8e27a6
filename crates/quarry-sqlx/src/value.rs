//! Conversions between [`SqlValue`] and sqlx arguments and rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use quarry_core::{DriverError, Row, SqlValue};
use sqlx::query::Query;
use sqlx::{Column, ColumnIndex, Database, Decode, Encode, Type, ValueRef};
use tracing::warn;

/// Binds `bindings` to `query` in order.
///
/// NULL is sent as a text-typed NULL.
pub(crate) fn bind_all<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    bindings: &[SqlValue],
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Vec<u8>: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
{
    for value in bindings {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(n) => query.bind(*n),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Blob(bytes) => query.bind(bytes.clone()),
        };
    }
    query
}

fn try_decode<'r, R, T>(row: &'r R, index: usize) -> Option<T>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<T, usize>(index).ok()
}

/// Decodes one column of `row`.
///
/// Types without a [`SqlValue`] counterpart (dates, times) become text.
/// Returns `None` when no known type matches.
pub(crate) fn decode_value<'r, R>(row: &'r R, index: usize) -> Option<SqlValue>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    i16: Decode<'r, R::Database> + Type<R::Database>,
    i32: Decode<'r, R::Database> + Type<R::Database>,
    i64: Decode<'r, R::Database> + Type<R::Database>,
    f32: Decode<'r, R::Database> + Type<R::Database>,
    f64: Decode<'r, R::Database> + Type<R::Database>,
    bool: Decode<'r, R::Database> + Type<R::Database>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
    NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    NaiveTime: Decode<'r, R::Database> + Type<R::Database>,
    DateTime<Utc>: Decode<'r, R::Database> + Type<R::Database>,
{
    if row.try_get_raw(index).is_ok_and(|raw| raw.is_null()) {
        return Some(SqlValue::Null);
    }
    if let Some(n) = try_decode::<R, i64>(row, index) {
        return Some(SqlValue::Int(n));
    }
    if let Some(n) = try_decode::<R, i32>(row, index) {
        return Some(SqlValue::Int(i64::from(n)));
    }
    if let Some(n) = try_decode::<R, i16>(row, index) {
        return Some(SqlValue::Int(i64::from(n)));
    }
    if let Some(f) = try_decode::<R, f64>(row, index) {
        return Some(SqlValue::Float(f));
    }
    if let Some(f) = try_decode::<R, f32>(row, index) {
        return Some(SqlValue::Float(f64::from(f)));
    }
    if let Some(b) = try_decode::<R, bool>(row, index) {
        return Some(SqlValue::Bool(b));
    }
    if let Some(s) = try_decode::<R, String>(row, index) {
        return Some(SqlValue::Text(s));
    }
    if let Some(ts) = try_decode::<R, NaiveDateTime>(row, index) {
        return Some(SqlValue::Text(ts.format("%Y-%m-%d %H:%M:%S").to_string()));
    }
    if let Some(ts) = try_decode::<R, DateTime<Utc>>(row, index) {
        return Some(SqlValue::Text(ts.format("%Y-%m-%d %H:%M:%S").to_string()));
    }
    if let Some(date) = try_decode::<R, NaiveDate>(row, index) {
        return Some(SqlValue::Text(date.format("%Y-%m-%d").to_string()));
    }
    if let Some(time) = try_decode::<R, NaiveTime>(row, index) {
        return Some(SqlValue::Text(time.format("%H:%M:%S").to_string()));
    }
    try_decode::<R, Vec<u8>>(row, index).map(SqlValue::Blob)
}

/// Converts a sqlx row. `fallback` handles columns [`decode_value`] does not
/// know; what it cannot handle becomes NULL.
pub(crate) fn to_row<R, F>(row: &R, fallback: F) -> Row
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    F: Fn(&R, usize) -> Option<SqlValue>,
    for<'r> i16: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i32: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f32: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> bool: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> DateTime<Utc>: Decode<'r, R::Database> + Type<R::Database>,
{
    let columns: Vec<String> = row
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    let values = (0..columns.len())
        .map(|index| {
            decode_value(row, index)
                .or_else(|| fallback(row, index))
                .unwrap_or_else(|| {
                    warn!(column = %columns[index], "Undecodable column, reading NULL");
                    SqlValue::Null
                })
        })
        .collect();
    Row::new(columns, values)
}

/// Wraps a sqlx failure, keeping its message for lost-connection detection.
pub(crate) fn driver_error(error: sqlx::Error) -> DriverError {
    DriverError::from_source(error)
}
