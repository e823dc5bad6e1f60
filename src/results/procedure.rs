use serde::ser::{Serialize, SerializeMap, Serializer};

use super::row::RowRecord;
use crate::types::RowValues;

/// Key under which drained result sets are serialized.
pub const RESULT_SETS_FIELD: &str = "resultSets";

/// Output of a stored-procedure call.
///
/// Output parameters are keyed by their declared field name in declaration
/// order. `result_sets` is `None` unless the call produced at least one
/// result set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcedureResult {
    outputs: Vec<(String, RowValues)>,
    result_sets: Option<Vec<Vec<RowRecord>>>,
}

impl ProcedureResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_output(&mut self, field_name: &str, value: RowValues) {
        if let Some(slot) = self.outputs.iter_mut().find(|(name, _)| name == field_name) {
            slot.1 = value;
        } else {
            self.outputs.push((field_name.to_string(), value));
        }
    }

    pub(crate) fn push_result_set(&mut self, rows: Vec<RowRecord>) {
        self.result_sets.get_or_insert_with(Vec::new).push(rows);
    }

    #[must_use]
    pub fn output(&self, field_name: &str) -> Option<&RowValues> {
        self.outputs
            .iter()
            .find(|(name, _)| name == field_name)
            .map(|(_, value)| value)
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.outputs.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn result_sets(&self) -> Option<&[Vec<RowRecord>]> {
        self.result_sets.as_deref()
    }

    #[must_use]
    pub fn into_result_sets(self) -> Option<Vec<Vec<RowRecord>>> {
        self.result_sets
    }
}

impl Serialize for ProcedureResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (name, value) in &self.outputs {
            if name != RESULT_SETS_FIELD || self.result_sets.is_none() {
                map.serialize_entry(name, value)?;
            }
        }
        if let Some(sets) = &self.result_sets {
            map.serialize_entry(RESULT_SETS_FIELD, sets)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn result_sets_absent_until_pushed() {
        let mut result = ProcedureResult::new();
        result.insert_output("OUT1", RowValues::Int(5));
        assert!(result.result_sets().is_none());
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"OUT1": 5})
        );

        let mut row = RowRecord::new(0);
        row.insert("C", Some("x".into()));
        result.push_result_set(vec![row]);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"OUT1": 5, "resultSets": [[{"C": "x", "index": 0}]]})
        );
    }

    #[test]
    fn outputs_keep_declaration_order() {
        let mut result = ProcedureResult::new();
        result.insert_output("B", RowValues::Text("b".into()));
        result.insert_output("A", RowValues::Text("a".into()));
        let names: Vec<&str> = result.outputs().map(|(n, _)| n).collect();
        assert_eq!(names, ["B", "A"]);
        assert_eq!(result.output("A"), Some(&RowValues::Text("a".into())));
    }
}
