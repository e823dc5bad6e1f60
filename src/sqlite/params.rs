use rusqlite::types::Value;

use crate::types::RowValues;

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Place `value` at the 1-based `position`, padding gaps with `NULL`.
pub(crate) fn set_positional(params: &mut Vec<Value>, position: usize, value: &RowValues) {
    if params.len() < position {
        params.resize(position, Value::Null);
    }
    params[position - 1] = row_value_to_sqlite_value(value);
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn converts_each_variant() {
        assert_eq!(row_value_to_sqlite_value(&RowValues::Bool(true)), Value::Integer(1));
        assert_eq!(row_value_to_sqlite_value(&RowValues::Null), Value::Null);
        let ts = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();
        assert_eq!(
            row_value_to_sqlite_value(&RowValues::Timestamp(ts)),
            Value::Text("2024-05-06 07:08:09".into())
        );
    }

    #[test]
    fn positional_binding_pads_with_null() {
        let mut params = Vec::new();
        set_positional(&mut params, 3, &RowValues::Int(9));
        set_positional(&mut params, 1, &RowValues::Text("a".into()));
        assert_eq!(
            params,
            vec![Value::Text("a".into()), Value::Null, Value::Integer(9)]
        );
    }
}
