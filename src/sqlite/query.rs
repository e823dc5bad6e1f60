use rusqlite::Statement;
use rusqlite::types::Value;

use crate::driver::BufferedCursor;
use crate::types::RowValues;

/// `SQLite` storage classes onto middleware values.
pub(crate) fn from_sqlite_value(value: Value) -> RowValues {
    match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    }
}

/// Step `stmt` to completion, buffering every row.
///
/// Runs on the blocking worker, so the whole result is read before the
/// connection lock is given back.
///
/// # Errors
/// Any rusqlite error raised while binding, stepping or reading a column.
pub(crate) fn build_cursor(
    stmt: &mut Statement<'_>,
    params: &[Value],
) -> rusqlite::Result<BufferedCursor> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
    let width = columns.len();

    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            (0..width)
                .map(|idx| row.get::<_, Value>(idx).map(from_sqlite_value))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(BufferedCursor::new(columns, rows))
}
