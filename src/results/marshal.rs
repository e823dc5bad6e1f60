use tracing::trace;

use super::row::RowRecord;
use crate::driver::ResultCursor;
use crate::driver::DriverError;
use crate::error::SqlPoolError;

/// Drain a cursor into row records.
///
/// An absent cursor yields an empty sequence. Column metadata is read once;
/// each cell is rendered to its string form and trimmed, since fixed-width
/// character columns arrive space-padded. Any read failure discards the rows
/// gathered so far.
///
/// # Errors
/// `SqlPoolError::ResultSet` when the driver fails to produce a row or
/// returns a row whose width differs from the column metadata.
pub async fn marshal_rows(
    cursor: Option<&mut (dyn ResultCursor + '_)>,
) -> Result<Vec<RowRecord>, SqlPoolError> {
    let Some(cursor) = cursor else {
        return Ok(Vec::new());
    };

    let columns = cursor.columns().to_vec();
    let mut records = Vec::new();
    while let Some(cells) = cursor.next_row().await.map_err(SqlPoolError::ResultSet)? {
        if cells.len() != columns.len() {
            return Err(SqlPoolError::ResultSet(DriverError::new(format!(
                "row {} has {} values for {} columns",
                records.len(),
                cells.len(),
                columns.len()
            ))));
        }
        let mut record = RowRecord::with_capacity(records.len(), columns.len());
        for (name, cell) in columns.iter().zip(cells) {
            let value = cell.to_column_string().map(|s| s.trim().to_string());
            record.insert(name.clone(), value);
        }
        records.push(record);
    }
    trace!(rows = records.len(), columns = columns.len(), "marshalled result set");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::driver::{BufferedCursor, DriverResult};
    use crate::types::RowValues;

    struct FailingCursor {
        columns: Vec<String>,
        served: bool,
    }

    #[async_trait]
    impl ResultCursor for FailingCursor {
        fn columns(&self) -> &[String] {
            &self.columns
        }

        async fn next_row(&mut self) -> DriverResult<Option<Vec<RowValues>>> {
            if self.served {
                Err(DriverError::new("cursor lost"))
            } else {
                self.served = true;
                Ok(Some(vec![RowValues::Int(1)]))
            }
        }
    }

    #[tokio::test]
    async fn absent_cursor_is_empty() {
        assert!(marshal_rows(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn trims_and_indexes_rows() {
        let mut cursor = BufferedCursor::new(
            vec!["NAME".into(), "QTY".into()],
            vec![
                vec![RowValues::Text("  ABC   ".into()), RowValues::Int(3)],
                vec![RowValues::Text("DEF".into()), RowValues::Null],
            ],
        );
        let rows = marshal_rows(Some(&mut cursor)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_str("NAME"), Some("ABC"));
        assert_eq!(rows[0].get_str("QTY"), Some("3"));
        assert_eq!(rows[0].index(), 0);
        assert_eq!(rows[1].get("QTY"), Some(None));
        assert_eq!(rows[1].index(), 1);
    }

    #[tokio::test]
    async fn read_failure_discards_partial_rows() {
        let mut cursor = FailingCursor {
            columns: vec!["A".into()],
            served: false,
        };
        let err = marshal_rows(Some(&mut cursor)).await.unwrap_err();
        assert!(matches!(err, SqlPoolError::ResultSet(_)));
    }

    #[tokio::test]
    async fn short_row_is_rejected() {
        let mut cursor = BufferedCursor::new(
            vec!["NAME".into(), "QTY".into()],
            vec![
                vec![RowValues::Text("ABC".into()), RowValues::Int(3)],
                vec![RowValues::Text("DEF".into())],
            ],
        );
        let err = marshal_rows(Some(&mut cursor)).await.unwrap_err();
        assert!(matches!(err, SqlPoolError::ResultSet(_)));
        assert!(err.to_string().contains("row 1 has 1 values for 2 columns"));
    }
}
