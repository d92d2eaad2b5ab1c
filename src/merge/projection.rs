//! # Minimal projection
//!
//! Reduce one technology table to the four values the merge needs per row:
//! `(ts, point_id, technology, position)`.
//!
//! The `position` is the row offset in the table as given, i.e. the table's `0..N-1` row
//! space. It is the only handle later used to find the row again, so the projection never
//! reorders, filters or deduplicates.
//!
//! Key columns are normalized on the way: any numeric timestamp column is cast to `Int64`
//! milliseconds and any point column is cast to text (CSV inference reads point `101` as an
//! integer). A floating-point timestamp must hold whole milliseconds; `1000.4` is refused
//! rather than truncated, since truncation would fold distinct epochs into one key. Rows whose timestamp or point is null cannot be grouped under an epoch and are
//! not emitted; their position is simply never referenced.
use arrow_array::cast::AsArray;
use arrow_array::types::Float64Type;
use arrow_array::{Array, ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow_cast::{can_cast_types, cast};
use arrow_schema::DataType;

use crate::constants::{Position, Timestamp, POINT_ID_COLUMN, TIMESTAMP_COLUMN};
use crate::multipos_errors::MultiposError;

/// One reading of one technology, reduced to its epoch key and row handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimalRow<'a> {
    pub timestamp: Timestamp,
    pub point_id: String,
    pub technology: &'a str,
    pub position: Position,
}

/// Project `table` of `technology` onto its minimal rows.
///
/// Arguments
/// -----------------
/// * `table`: Any table exposing `ts` and `point_id` columns. Payload columns are ignored.
/// * `technology`: Name carried by every emitted row.
///
/// Return
/// ----------
/// * One [`MinimalRow`] per row with a non-null key, in table order, `position` being the row
///   offset. An empty table yields an empty vector.
/// * [`MultiposError::MissingColumn`] if a key column is absent,
///   [`MultiposError::InvalidColumnType`] if it cannot be read as a timestamp / point id.
pub fn project<'a>(
    table: &RecordBatch,
    technology: &'a str,
) -> Result<Vec<MinimalRow<'a>>, MultiposError> {
    let ts = key_column(table, technology, TIMESTAMP_COLUMN, &DataType::Int64)?;
    let points = key_column(table, technology, POINT_ID_COLUMN, &DataType::Utf8)?;

    let ts = ts
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| invalid_type(TIMESTAMP_COLUMN, &DataType::Int64))?;
    let points = points
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| invalid_type(POINT_ID_COLUMN, &DataType::Utf8))?;

    let rows = (0..table.num_rows())
        .filter(|&i| ts.is_valid(i) && points.is_valid(i))
        .map(|i| MinimalRow {
            timestamp: ts.value(i),
            point_id: points.value(i).to_string(),
            technology,
            position: i,
        })
        .collect();

    Ok(rows)
}

/// Fetch a key column by name and cast it to `target`.
fn key_column(
    table: &RecordBatch,
    technology: &str,
    name: &str,
    target: &DataType,
) -> Result<ArrayRef, MultiposError> {
    let column = table
        .column_by_name(name)
        .ok_or_else(|| MultiposError::MissingColumn {
            technology: technology.to_string(),
            column: name.to_string(),
        })?;

    if column.data_type() == target {
        return Ok(column.clone());
    }
    if !is_key_type(column.data_type()) || !can_cast_types(column.data_type(), target) {
        return Err(invalid_type(name, target));
    }
    if *target == DataType::Int64 {
        ensure_whole_millis(column.as_ref(), name)?;
    }
    Ok(cast(column.as_ref(), target)?)
}

/// Refuse a fractional or decimal timestamp column holding a value that is not a finite
/// whole number of milliseconds in `i64` range.
pub(crate) fn ensure_whole_millis(column: &dyn Array, name: &str) -> Result<(), MultiposError> {
    let data_type = column.data_type();
    if !data_type.is_floating()
        && !matches!(data_type, DataType::Decimal128(..) | DataType::Decimal256(..))
    {
        return Ok(());
    }

    let values = cast(column, &DataType::Float64)?;
    let values = values.as_primitive::<Float64Type>();
    match values.iter().flatten().find(|&v| !is_whole_millis(v)) {
        Some(value) => Err(MultiposError::InvalidColumnType {
            column: name.to_string(),
            expected: format!("whole milliseconds, found {value}"),
        }),
        None => Ok(()),
    }
}

fn is_whole_millis(value: f64) -> bool {
    value.is_finite()
        && value.fract() == 0.0
        && value >= i64::MIN as f64
        && value < i64::MAX as f64
}

fn is_key_type(data_type: &DataType) -> bool {
    data_type.is_numeric()
        || matches!(
            data_type,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Timestamp(..)
        )
}

fn invalid_type(column: &str, expected: &DataType) -> MultiposError {
    MultiposError::InvalidColumnType {
        column: column.to_string(),
        expected: expected.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Float64Array, UInt32Array};
    use arrow_schema::{Field, Schema};
    use std::sync::Arc;

    fn table(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
            .collect();
        RecordBatch::try_new(
            Arc::new(Schema::new(fields)),
            columns.into_iter().map(|(_, a)| a).collect(),
        )
        .unwrap()
    }

    #[test]
    fn positions_follow_row_order() {
        let t = table(vec![
            ("ts", Arc::new(Int64Array::from(vec![300, 100, 200])) as ArrayRef),
            ("point_id", Arc::new(StringArray::from(vec!["B", "A", "A"])) as ArrayRef),
        ]);

        let rows = project(&t, "ble").unwrap();
        let positions: Vec<_> = rows.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(rows[0].timestamp, 300);
        assert_eq!(rows[1].point_id, "A");
        assert!(rows.iter().all(|r| r.technology == "ble"));
    }

    #[test]
    fn key_columns_are_normalized() {
        let t = table(vec![
            ("point_id", Arc::new(UInt32Array::from(vec![101, 213])) as ArrayRef),
            ("ts", Arc::new(Float64Array::from(vec![1_000.0, 2_000.0])) as ArrayRef),
        ]);

        let rows = project(&t, "gnss").unwrap();
        assert_eq!(rows[0].timestamp, 1_000);
        assert_eq!(rows[1].point_id, "213");
    }

    #[test]
    fn fractional_timestamps_are_refused() {
        let t = table(vec![
            ("ts", Arc::new(Float64Array::from(vec![1_000.4, 1_000.6])) as ArrayRef),
            ("point_id", Arc::new(StringArray::from(vec!["P1", "P1"])) as ArrayRef),
        ]);
        assert_eq!(
            project(&t, "gnss").unwrap_err(),
            MultiposError::InvalidColumnType {
                column: "ts".into(),
                expected: "whole milliseconds, found 1000.4".into()
            }
        );

        let t = table(vec![
            ("ts", Arc::new(Float64Array::from(vec![Some(5.0), None, Some(f64::NAN)])) as ArrayRef),
            ("point_id", Arc::new(StringArray::from(vec!["P1", "P1", "P1"])) as ArrayRef),
        ]);
        assert!(matches!(
            project(&t, "gnss"),
            Err(MultiposError::InvalidColumnType { .. })
        ));
    }

    #[test]
    fn null_keys_are_skipped_without_shifting_positions() {
        let t = table(vec![
            (
                "ts",
                Arc::new(Int64Array::from(vec![Some(1), None, Some(3)])) as ArrayRef,
            ),
            ("point_id", Arc::new(StringArray::from(vec!["A", "A", "A"])) as ArrayRef),
        ]);

        let positions: Vec<_> = project(&t, "uwb")
            .unwrap()
            .into_iter()
            .map(|r| r.position)
            .collect();
        assert_eq!(positions, vec![0, 2]);
    }

    #[test]
    fn empty_table_projects_to_nothing() {
        let t = table(vec![
            ("ts", Arc::new(Int64Array::from(Vec::<i64>::new())) as ArrayRef),
            ("point_id", Arc::new(StringArray::from(Vec::<&str>::new())) as ArrayRef),
        ]);
        assert!(project(&t, "wifi").unwrap().is_empty());
    }

    #[test]
    fn missing_key_column_is_reported() {
        let t = table(vec![("ts", Arc::new(Int64Array::from(vec![1])) as ArrayRef)]);
        assert_eq!(
            project(&t, "nr5g").unwrap_err(),
            MultiposError::MissingColumn {
                technology: "nr5g".into(),
                column: "point_id".into()
            }
        );
    }
}
