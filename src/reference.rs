//! # Ground-truth attachment
//!
//! Tag the rows of a processed technology table with the measurement point they were
//! recorded at, and join the reference coordinates of that point.
//!
//! ## Overview
//! -----------------
//! During a campaign, the operator stands at one surveyed point per time window. The
//! [`TimeReference`] lists those windows in local time; [`PointCoordinates`] holds the
//! surveyed coordinates of every point.
//!
//! * [`TimeReference::assign_point_ids`] – `ts` (UTC ms) → local time → `point_id` of the
//!   last window containing it. Rows outside every window are dropped.
//! * [`PointCoordinates::attach_ground_truth`] – left join of the coordinate columns on
//!   `point_id`, then a stable sort by `ts`.
//! * [`PointAliases::apply`] – rename raw point labels to canonical ids and drop the rest.
//! * [`GroundTruth::apply`] – assignment followed by the join.
//!
//! Every step returns a new table; row order (and therefore the handle space used by the
//! merge) is the one of the returned table.
use std::collections::HashSet;
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Int64Type;
use arrow_array::{Array, ArrayRef, BooleanArray, RecordBatch, StringArray, UInt64Array};
use arrow_cast::cast;
use arrow_schema::{DataType, Field, Schema};
use arrow_select::filter::filter_record_batch;
use arrow_select::take::{take, take_record_batch};
use camino::Utf8Path;
use tracing::{debug, info};

use crate::constants::{FastHashMap, Timestamp, POINT_ID_COLUMN, TIMESTAMP_COLUMN};
use crate::multipos_errors::MultiposError;
use crate::tables::load_table;

/// Offset of campaign local time from UTC.
pub const DEFAULT_UTC_OFFSET_MS: i64 = 2 * 3_600_000;

/// Columns of a stored time reference table.
pub const WINDOW_START_COLUMN: &str = "start_local";
pub const WINDOW_END_COLUMN: &str = "end_local";

const REFERENCE_TABLE: &str = "reference";

/// Time span, in local milliseconds, spent at one measurement point. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementWindow {
    pub point_id: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl MeasurementWindow {
    pub fn new(point_id: &str, start: Timestamp, end: Timestamp) -> Self {
        Self {
            point_id: point_id.to_string(),
            start,
            end,
        }
    }

    pub fn contains(&self, local: Timestamp) -> bool {
        self.start <= local && local <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeReference {
    windows: Vec<MeasurementWindow>,
    utc_offset_ms: i64,
}

impl TimeReference {
    pub fn new(windows: Vec<MeasurementWindow>) -> Self {
        Self {
            windows,
            utc_offset_ms: DEFAULT_UTC_OFFSET_MS,
        }
    }

    pub fn with_utc_offset_ms(mut self, offset: i64) -> Self {
        self.utc_offset_ms = offset;
        self
    }

    pub fn windows(&self) -> &[MeasurementWindow] {
        &self.windows
    }

    /// Read windows from a table with `point_id`, `start_local` and `end_local` columns.
    pub fn from_table(table: &RecordBatch) -> Result<Self, MultiposError> {
        let points = utf8_column(table, REFERENCE_TABLE, POINT_ID_COLUMN)?;
        let starts = int64_column(table, REFERENCE_TABLE, WINDOW_START_COLUMN)?;
        let ends = int64_column(table, REFERENCE_TABLE, WINDOW_END_COLUMN)?;
        let (points, starts, ends) = (
            points.as_string::<i32>(),
            starts.as_primitive::<Int64Type>(),
            ends.as_primitive::<Int64Type>(),
        );

        let windows = (0..table.num_rows())
            .filter(|&i| points.is_valid(i) && starts.is_valid(i) && ends.is_valid(i))
            .map(|i| MeasurementWindow::new(points.value(i), starts.value(i), ends.value(i)))
            .collect();
        Ok(Self::new(windows))
    }

    /// Read windows from a stored table (any supported encoding).
    pub fn load(path: &Utf8Path) -> Result<Self, MultiposError> {
        Self::from_table(&load_table(path)?)
    }

    /// Point of the last window containing the UTC timestamp `ts`.
    ///
    /// A timestamp whose local time overflows `i64` lies outside every window.
    pub fn point_at(&self, ts: Timestamp) -> Option<&str> {
        let local = ts.checked_add(self.utc_offset_ms)?;
        self.windows
            .iter()
            .rev()
            .find(|w| w.contains(local))
            .map(|w| w.point_id.as_str())
    }

    /// Set the `point_id` of every row from its timestamp and drop rows outside all windows.
    ///
    /// Arguments
    /// -----------------
    /// * `table`: Table with a numeric `ts` column in UTC milliseconds. An existing
    ///   `point_id` column is replaced.
    ///
    /// Return
    /// ----------
    /// * The tagged rows, in their original relative order, with `point_id` as last column.
    pub fn assign_point_ids(&self, table: &RecordBatch) -> Result<RecordBatch, MultiposError> {
        let ts = int64_column(table, REFERENCE_TABLE, TIMESTAMP_COLUMN)?;
        let ts = ts.as_primitive::<Int64Type>();

        let assigned: Vec<Option<&str>> = (0..table.num_rows())
            .map(|i| ts.is_valid(i).then(|| self.point_at(ts.value(i))).flatten())
            .collect();
        let keep = BooleanArray::from_iter(assigned.iter().map(|p| Some(p.is_some())));

        let mut fields = Vec::new();
        let mut columns = Vec::new();
        for (field, column) in table.schema().fields().iter().zip(table.columns()) {
            if field.name() != POINT_ID_COLUMN {
                fields.push(field.as_ref().clone());
                columns.push(column.clone());
            }
        }
        fields.push(Field::new(POINT_ID_COLUMN, DataType::Utf8, true));
        columns.push(Arc::new(StringArray::from(assigned)) as ArrayRef);

        let tagged = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        let kept = filter_record_batch(&tagged, &keep)?;
        debug!(
            rows = table.num_rows(),
            kept = kept.num_rows(),
            windows = self.windows.len(),
            "point ids assigned"
        );
        Ok(kept)
    }
}

/// Surveyed coordinates of the measurement points.
#[derive(Debug, Clone)]
pub struct PointCoordinates {
    table: RecordBatch,
    rows_by_point: FastHashMap<String, usize>,
}

impl PointCoordinates {
    /// Wrap a reference table keyed by `point_id`; every other column is a coordinate.
    ///
    /// When a point appears several times, its first row is used.
    pub fn new(table: RecordBatch) -> Result<Self, MultiposError> {
        let points = utf8_column(&table, REFERENCE_TABLE, POINT_ID_COLUMN)?;
        let points = points.as_string::<i32>();

        let mut rows_by_point = FastHashMap::default();
        for i in (0..points.len()).filter(|&i| points.is_valid(i)) {
            rows_by_point.entry(points.value(i).to_string()).or_insert(i);
        }
        Ok(Self {
            table,
            rows_by_point,
        })
    }

    pub fn load(path: &Utf8Path) -> Result<Self, MultiposError> {
        Self::new(load_table(path)?)
    }

    pub fn contains(&self, point_id: &str) -> bool {
        self.rows_by_point.contains_key(point_id)
    }

    /// Left-join the coordinate columns onto `table`, then stably sort by `ts`.
    ///
    /// Coordinates are null for rows whose point has no reference. A coordinate column whose
    /// name is already used in `table` is added with a `_ref` suffix.
    pub fn attach_ground_truth(&self, table: &RecordBatch) -> Result<RecordBatch, MultiposError> {
        let points = utf8_column(table, REFERENCE_TABLE, POINT_ID_COLUMN)?;
        let points = points.as_string::<i32>();
        let indices: UInt64Array = (0..table.num_rows())
            .map(|i| {
                points
                    .is_valid(i)
                    .then(|| self.rows_by_point.get(points.value(i)))
                    .flatten()
                    .map(|&row| row as u64)
            })
            .collect();

        let schema = table.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns: Vec<ArrayRef> = table.columns().to_vec();
        let reference_schema = self.table.schema();
        for (field, column) in reference_schema.fields().iter().zip(self.table.columns()) {
            if field.name() == POINT_ID_COLUMN {
                continue;
            }
            let name = if schema.field_with_name(field.name()).is_ok() {
                format!("{}_ref", field.name())
            } else {
                field.name().clone()
            };
            fields.push(Field::new(name, field.data_type().clone(), true));
            columns.push(take(column.as_ref(), &indices, None)?);
        }

        let joined = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        sort_by_timestamp(&joined)
    }
}

/// Stable sort of `table` by its `ts` column, nulls last.
fn sort_by_timestamp(table: &RecordBatch) -> Result<RecordBatch, MultiposError> {
    let ts = int64_column(table, REFERENCE_TABLE, TIMESTAMP_COLUMN)?;
    let ts = ts.as_primitive::<Int64Type>();

    let mut order: Vec<usize> = (0..table.num_rows()).collect();
    order.sort_by_key(|&i| (ts.is_null(i), ts.is_valid(i).then(|| ts.value(i))));
    let order = UInt64Array::from_iter_values(order.into_iter().map(|i| i as u64));
    Ok(take_record_batch(table, &order)?)
}

/// Raw point label → canonical point id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointAliases {
    aliases: FastHashMap<String, String>,
}

impl PointAliases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alias(mut self, raw: &str, canonical: &str) -> Self {
        self.aliases.insert(raw.to_string(), canonical.to_string());
        self
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        pairs
            .into_iter()
            .fold(Self::new(), |aliases, (raw, canonical)| aliases.with_alias(raw, canonical))
    }

    pub fn canonical(&self, raw: &str) -> Option<&str> {
        self.aliases.get(raw).map(String::as_str)
    }

    /// Rename `point_id` values through the aliases and keep only canonical ids.
    ///
    /// A label that is not an alias is kept as is, so a table already using canonical ids
    /// passes through unchanged. Rows whose resulting id is not canonical are dropped.
    pub fn apply(&self, table: &RecordBatch) -> Result<RecordBatch, MultiposError> {
        let points = utf8_column(table, REFERENCE_TABLE, POINT_ID_COLUMN)?;
        let points = points.as_string::<i32>();
        let canonical: HashSet<&str> = self.aliases.values().map(String::as_str).collect();

        let renamed: Vec<Option<&str>> = points
            .iter()
            .map(|p| p.map(|p| self.canonical(p).unwrap_or(p)))
            .collect();
        let keep = BooleanArray::from_iter(
            renamed
                .iter()
                .map(|p| Some(p.is_some_and(|p| canonical.contains(p)))),
        );

        let dropped: HashSet<&str> = renamed
            .iter()
            .flatten()
            .filter(|p| !canonical.contains(*p))
            .copied()
            .collect();
        if !dropped.is_empty() {
            info!(points = ?dropped, "dropping points without a canonical id");
        }

        let schema = table.schema();
        let position = schema.index_of(POINT_ID_COLUMN)?;
        let mut columns = table.columns().to_vec();
        columns[position] = Arc::new(StringArray::from(renamed));
        let fields: Vec<Field> = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| {
                if i == position {
                    Field::new(POINT_ID_COLUMN, DataType::Utf8, true)
                } else {
                    f.as_ref().clone()
                }
            })
            .collect();

        let renamed = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Ok(filter_record_batch(&renamed, &keep)?)
    }
}

/// Time reference and point coordinates of one campaign.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    pub time: TimeReference,
    pub coordinates: PointCoordinates,
}

impl GroundTruth {
    pub fn new(time: TimeReference, coordinates: PointCoordinates) -> Self {
        Self { time, coordinates }
    }

    /// Assign point ids from timestamps, then attach the reference coordinates.
    pub fn apply(&self, table: &RecordBatch) -> Result<RecordBatch, MultiposError> {
        let tagged = self.time.assign_point_ids(table)?;
        self.coordinates.attach_ground_truth(&tagged)
    }
}

fn column<'a>(
    table: &'a RecordBatch,
    owner: &str,
    name: &str,
) -> Result<&'a ArrayRef, MultiposError> {
    table
        .column_by_name(name)
        .ok_or_else(|| MultiposError::MissingColumn {
            technology: owner.to_string(),
            column: name.to_string(),
        })
}

fn int64_column(table: &RecordBatch, owner: &str, name: &str) -> Result<ArrayRef, MultiposError> {
    let column = column(table, owner, name)?;
    match column.data_type() {
        DataType::Int64 => Ok(column.clone()),
        t if t.is_numeric() || matches!(t, DataType::Timestamp(..)) => {
            Ok(cast(column.as_ref(), &DataType::Int64)?)
        }
        _ => Err(MultiposError::InvalidColumnType {
            column: name.to_string(),
            expected: DataType::Int64.to_string(),
        }),
    }
}

fn utf8_column(table: &RecordBatch, owner: &str, name: &str) -> Result<ArrayRef, MultiposError> {
    let column = column(table, owner, name)?;
    match column.data_type() {
        DataType::Utf8 => Ok(column.clone()),
        _ => Ok(cast(column.as_ref(), &DataType::Utf8)?),
    }
}
