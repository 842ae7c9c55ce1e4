//! Parameter binding and row decoding shared by the sqlx-backed drivers.

use chrono::NaiveDateTime;
use sqlx::query::Query;
use sqlx::{Column, ColumnIndex, Database, Decode, Encode, Type, TypeInfo, ValueRef};
use stmtprobe_core::{Cell, ParamType, Row, Value};

use crate::error::DriverError;

/// Timestamp bound for [`Value::CurrentTimestamp`], in local time.
fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Bind `values` to `query` by their declared parameter types.
///
/// # Errors
///
/// Returns an execution error if a value does not fit its declared type.
pub fn bind<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    params: &[ParamType],
    values: &[Value],
) -> Result<Query<'q, DB, <DB as Database>::Arguments<'q>>, DriverError>
where
    DB: Database,
    i32: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    NaiveDateTime: Encode<'q, DB> + Type<DB>,
    Option<i32>: Encode<'q, DB>,
    Option<i64>: Encode<'q, DB>,
    Option<String>: Encode<'q, DB>,
    Option<NaiveDateTime>: Encode<'q, DB>,
{
    if params.len() != values.len() {
        return Err(DriverError::execution(format!(
            "expected {} values, got {}",
            params.len(),
            values.len()
        )));
    }
    for (position, (ty, value)) in params.iter().zip(values).enumerate() {
        query = match (ty, value) {
            (ParamType::Integer, Value::Int(v)) => {
                let v = i32::try_from(*v).map_err(|_| {
                    DriverError::execution(format!("value {v} at position {position} overflows integer"))
                })?;
                query.bind(v)
            }
            (ParamType::Integer, Value::Null) => query.bind(None::<i32>),
            (ParamType::BigInt, Value::Int(v)) => query.bind(*v),
            (ParamType::BigInt, Value::Null) => query.bind(None::<i64>),
            (ParamType::Text, Value::Text(v)) => query.bind(v.clone()),
            (ParamType::Text, Value::Null) => query.bind(None::<String>),
            (ParamType::Timestamp, Value::Timestamp(v)) => query.bind(*v),
            (ParamType::Timestamp, Value::CurrentTimestamp) => query.bind(now()),
            (ParamType::Timestamp, Value::Null) => query.bind(None::<NaiveDateTime>),
            (ty, value) => {
                return Err(DriverError::execution(format!(
                    "value {value} at position {position} does not fit {ty}"
                )));
            }
        };
    }
    Ok(query)
}

fn get<'r, R, T>(row: &'r R, index: usize) -> Result<T, DriverError>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get(index)
        .map_err(|e| DriverError::execution(format!("column {index}: {e}")))
}

/// Decode every column of `row` into a [`Cell`], by backend type name.
///
/// # Errors
///
/// Returns an execution error if a column cannot be decoded as the type its
/// name announces.
pub fn decode_row<R>(row: &R) -> Result<Row, DriverError>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    for<'r> i16: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i32: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> bool: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
{
    let mut cells = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let is_null = row
            .try_get_raw(index)
            .map_err(|e| DriverError::execution(format!("column {index}: {e}")))?
            .is_null();
        if is_null {
            cells.push(Cell::Null);
            continue;
        }
        let type_name = column.type_info().name().to_ascii_uppercase();
        let cell = match type_name.as_str() {
            "INT2" | "SMALLINT" => Cell::Int(get::<_, i16>(row, index)?.into()),
            "INT4" | "INT" | "INTEGER" | "MEDIUMINT" => Cell::Int(get::<_, i32>(row, index)?.into()),
            "INT8" | "BIGINT" => Cell::Int(get(row, index)?),
            "BOOL" | "BOOLEAN" => Cell::Bool(get(row, index)?),
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "TINYTEXT" | "MEDIUMTEXT"
            | "LONGTEXT" => Cell::Text(get(row, index)?),
            "TIMESTAMP" | "DATETIME" => Cell::Timestamp(get(row, index)?),
            _ => Cell::Opaque(type_name),
        };
        cells.push(cell);
    }
    Ok(cells)
}

/// Render a decoded cell as plain text, for introspection queries.
#[must_use]
pub fn text(cell: &Cell) -> String {
    match cell {
        Cell::Text(v) => v.clone(),
        other => other.to_string(),
    }
}
