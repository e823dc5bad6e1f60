use serde::ser::{Serialize, SerializeMap, Serializer};

/// Key under which a record's ordinal is serialized.
pub const INDEX_FIELD: &str = "index";

/// One marshalled row: column name to trimmed string value, plus its ordinal.
///
/// SQL `NULL` is kept as `None`. Columns keep select-list order; a repeated
/// column name overwrites the earlier value in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowRecord {
    columns: Vec<(String, Option<String>)>,
    index: usize,
}

impl RowRecord {
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            columns: Vec::new(),
            index,
        }
    }

    #[must_use]
    pub fn with_capacity(index: usize, capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            index,
        }
    }

    /// Zero-based position of the row within its result set.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Option<String>) {
        let column = column.into();
        if let Some(slot) = self.columns.iter_mut().find(|(name, _)| *name == column) {
            slot.1 = value;
        } else {
            self.columns.push((column, value));
        }
    }

    /// Value of `column`; `Some(None)` for a SQL `NULL`.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<Option<&str>> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_deref())
    }

    /// Convenience lookup that flattens `NULL` and missing columns.
    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).flatten()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for RowRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data_columns = self
            .columns
            .iter()
            .filter(|(name, _)| name != INDEX_FIELD);
        let mut map = serializer.serialize_map(None)?;
        for (name, value) in data_columns {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry(INDEX_FIELD, &self.index)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn duplicate_columns_overwrite_in_place() {
        let mut row = RowRecord::new(0);
        row.insert("A", Some("1".into()));
        row.insert("B", Some("2".into()));
        row.insert("A", Some("3".into()));
        assert_eq!(row.len(), 2);
        assert_eq!(row.get_str("A"), Some("3"));
        assert_eq!(row.columns().next(), Some(("A", Some("3"))));
    }

    #[test]
    fn null_and_missing_are_distinct() {
        let mut row = RowRecord::new(4);
        row.insert("N", None);
        assert_eq!(row.get("N"), Some(None));
        assert_eq!(row.get("MISSING"), None);
        assert_eq!(row.get_str("N"), None);
    }

    #[test]
    fn serializes_with_index_field() {
        let mut row = RowRecord::new(2);
        row.insert("NAME", Some("ABC".into()));
        row.insert("NOTE", None);
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!({"NAME": "ABC", "NOTE": null, "index": 2})
        );
    }

    #[test]
    fn index_column_is_shadowed_by_ordinal() {
        let mut row = RowRecord::new(7);
        row.insert(INDEX_FIELD, Some("99".into()));
        assert_eq!(serde_json::to_value(&row).unwrap(), json!({"index": 7}));
    }
}
