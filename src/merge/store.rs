//! # Merged index storage
//!
//! The merged index is persisted in the three encodings of the campaign layout:
//!
//! | Encoding | File | Cell representation |
//! |---|---|---|
//! | binary | `binary/merged.bin` | `bincode` dump of [`MergedIndex`], exact |
//! | parquet | `parquet/merged.parquet` | nullable `List<UInt64>`: null, `[k]`, `[k1, k2, ...]` |
//! | csv | `csv/merged.csv` | text: empty, `k`, `[k1, k2, ...]` |
//!
//! Binary and Parquet round-trip every cell exactly. CSV is for inspection; reading it back
//! is lenient and a cell whose text is not integer-shaped is read as empty.
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::sync::Arc;

use arrow_array::builder::{ListBuilder, StringBuilder, UInt64Builder};
use arrow_array::cast::AsArray;
use arrow_array::types::{Int64Type, UInt64Type};
use arrow_array::{Array, ArrayRef, Int64Array, RecordBatch};
use arrow_cast::cast;
use arrow_schema::{DataType, Field, Schema};
use camino::Utf8Path;
use tracing::{info, trace};

use crate::constants::{
    index_column, Position, Timestamp, INDEX_COLUMN_PREFIX, POINT_ID_COLUMN, TIMESTAMP_COLUMN,
};
use crate::multipos_errors::MultiposError;
use crate::tables::parquet_io::{read_parquet, write_parquet};
use crate::tables::{Encoding, StorageLayout};

use super::index_cell::IndexCell;
use super::merged_index::{MergedIndex, MergedIndexRow};
use super::projection::ensure_whole_millis;

/// Write `index` in every encoding under `layout`, creating the directories as needed.
pub fn save_index(index: &MergedIndex, layout: &StorageLayout) -> Result<(), MultiposError> {
    layout.create_dirs()?;
    for encoding in Encoding::ALL {
        write_index(index, &layout.merged_path(encoding), encoding)?;
    }
    info!(
        epochs = index.len(),
        technologies = ?index.technologies(),
        root = %layout.root(),
        "merged index saved"
    );
    Ok(())
}

/// Read the merged index stored under `layout` in `encoding`.
pub fn load_index(layout: &StorageLayout, encoding: Encoding) -> Result<MergedIndex, MultiposError> {
    read_index(&layout.merged_path(encoding), encoding)
}

/// Write `index` to `path` in `encoding`.
pub fn write_index(
    index: &MergedIndex,
    path: &Utf8Path,
    encoding: Encoding,
) -> Result<(), MultiposError> {
    match encoding {
        Encoding::Binary => {
            let mut writer = BufWriter::new(File::create(path)?);
            bincode::encode_into_std_write(index, &mut writer, bincode::config::standard())?;
            writer.flush()?;
            Ok(())
        }
        Encoding::Parquet => write_parquet(&to_record_batch(index)?, path),
        Encoding::Csv => write_csv_index(index, path),
    }
}

/// Read a merged index from `path`.
///
/// Return
/// ----------
/// * The index, [`MultiposError::MergedIndexNotFound`] if `path` is not a file, or
///   [`MultiposError::MalformedIndex`] if a key is null or a row has the wrong width.
///   Stored row order is kept, sorted or not.
pub fn read_index(path: &Utf8Path, encoding: Encoding) -> Result<MergedIndex, MultiposError> {
    if !path.is_file() {
        return Err(MultiposError::MergedIndexNotFound(path.to_string()));
    }
    match encoding {
        Encoding::Binary => {
            let mut reader = BufReader::new(File::open(path)?);
            let index: MergedIndex =
                bincode::decode_from_std_read(&mut reader, bincode::config::standard())?;
            Ok(index)
        }
        Encoding::Parquet => from_record_batch(&read_parquet(path, None)?),
        Encoding::Csv => read_csv_index(path),
    }
}

// -------------------------------------------------------------------------------------------------
// Columnar form
// -------------------------------------------------------------------------------------------------

fn cell_field(technology: &str) -> Field {
    Field::new(
        index_column(technology),
        DataType::List(Arc::new(Field::new_list_field(DataType::UInt64, true))),
        true,
    )
}

/// Arrow form of the index: `ts`, `point_id`, then one nullable list column per technology.
pub fn to_record_batch(index: &MergedIndex) -> Result<RecordBatch, MultiposError> {
    let mut fields = vec![
        Field::new(TIMESTAMP_COLUMN, DataType::Int64, false),
        Field::new(POINT_ID_COLUMN, DataType::Utf8, false),
    ];
    fields.extend(index.technologies().iter().map(|t| cell_field(t)));

    let ts = Int64Array::from_iter_values(index.rows().iter().map(|r| r.timestamp));
    let mut points = StringBuilder::new();
    for row in index.rows() {
        points.append_value(&row.point_id);
    }

    let mut columns: Vec<ArrayRef> = vec![Arc::new(ts), Arc::new(points.finish())];
    for slot in 0..index.technologies().len() {
        let mut cells = ListBuilder::new(UInt64Builder::new());
        for row in index.rows() {
            match row.cells.get(slot) {
                None | Some(IndexCell::Empty) => cells.append_null(),
                Some(cell) => {
                    for &position in cell.positions() {
                        cells.values().append_value(position as u64);
                    }
                    cells.append(true);
                }
            }
        }
        columns.push(Arc::new(cells.finish()));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Rebuild an index from its Arrow form.
///
/// Technology columns are the `idx_*` columns, in schema order. A list column and a plain
/// integer column (one handle per cell, null for none) are both accepted.
pub fn from_record_batch(batch: &RecordBatch) -> Result<MergedIndex, MultiposError> {
    let ts = required(batch, TIMESTAMP_COLUMN, &DataType::Int64)?;
    let ts = ts
        .as_primitive_opt::<Int64Type>()
        .ok_or_else(|| malformed_column(TIMESTAMP_COLUMN))?;
    let points = required(batch, POINT_ID_COLUMN, &DataType::Utf8)?;
    let points = points
        .as_string_opt::<i32>()
        .ok_or_else(|| malformed_column(POINT_ID_COLUMN))?;

    let mut technologies = Vec::new();
    let mut cell_columns = Vec::new();
    let schema = batch.schema();
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if let Some(technology) = field.name().strip_prefix(INDEX_COLUMN_PREFIX) {
            technologies.push(technology.to_string());
            cell_columns.push(read_cells(field.name(), column)?);
        }
    }

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if ts.is_null(i) || points.is_null(i) {
            return Err(MultiposError::MalformedIndex(format!("row {i} has a null key")));
        }
        rows.push(MergedIndexRow {
            timestamp: ts.value(i),
            point_id: points.value(i).to_string(),
            cells: cell_columns.iter().map(|cells| cells[i].clone()).collect(),
        });
    }

    MergedIndex::new(technologies, rows)
}

fn required(batch: &RecordBatch, name: &str, target: &DataType) -> Result<ArrayRef, MultiposError> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| MultiposError::MalformedIndex(format!("missing column '{name}'")))?;
    if column.data_type() == target {
        return Ok(column.clone());
    }
    if *target == DataType::Int64 {
        ensure_whole_millis(column.as_ref(), name)?;
    }
    Ok(cast(column.as_ref(), target)?)
}

fn read_cells(name: &str, column: &ArrayRef) -> Result<Vec<IndexCell>, MultiposError> {
    match column.data_type() {
        DataType::List(_) | DataType::LargeList(_) => {
            let target = DataType::List(Arc::new(Field::new_list_field(DataType::UInt64, true)));
            let column = cast(column.as_ref(), &target)?;
            let lists = column
                .as_list_opt::<i32>()
                .ok_or_else(|| malformed_column(name))?;
            Ok((0..lists.len())
                .map(|i| {
                    if lists.is_null(i) {
                        return IndexCell::Empty;
                    }
                    let values = lists.value(i);
                    let positions = values.as_primitive_opt::<UInt64Type>().and_then(|v| {
                        v.iter()
                            .map(|p| p.and_then(|p| Position::try_from(p).ok()))
                            .collect::<Option<Vec<_>>>()
                    });
                    positions.map(IndexCell::from_positions).unwrap_or_else(|| {
                        trace!(column = name, row = i, "unreadable cell read as empty");
                        IndexCell::Empty
                    })
                })
                .collect())
        }
        data_type if data_type.is_integer() => {
            let column = cast(column.as_ref(), &DataType::UInt64)?;
            let values = column
                .as_primitive_opt::<UInt64Type>()
                .ok_or_else(|| malformed_column(name))?;
            Ok(values
                .iter()
                .map(|v| {
                    v.and_then(|p| Position::try_from(p).ok())
                        .map_or(IndexCell::Empty, IndexCell::Single)
                })
                .collect())
        }
        _ => Err(MultiposError::InvalidColumnType {
            column: name.to_string(),
            expected: "List<UInt64>".to_string(),
        }),
    }
}

fn malformed_column(name: &str) -> MultiposError {
    MultiposError::MalformedIndex(format!("column '{name}' cannot be read"))
}

// -------------------------------------------------------------------------------------------------
// Text form
// -------------------------------------------------------------------------------------------------

fn write_csv_index(index: &MergedIndex, path: &Utf8Path) -> Result<(), MultiposError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(index.columns())?;
    for row in index.rows() {
        let record = [row.timestamp.to_string(), row.point_id.clone()]
            .into_iter()
            .chain(row.cells.iter().map(IndexCell::to_string));
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_csv_index(path: &Utf8Path) -> Result<MergedIndex, MultiposError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| MultiposError::MalformedIndex(format!("missing column '{name}'")))
    };
    let ts_at = position(TIMESTAMP_COLUMN)?;
    let point_at = position(POINT_ID_COLUMN)?;
    let cell_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| h.strip_prefix(INDEX_COLUMN_PREFIX).map(|t| (i, t.to_string())))
        .collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or_default();

        let timestamp = parse_timestamp(field(ts_at)).ok_or_else(|| {
            MultiposError::MalformedIndex(format!(
                "record {line}: '{}' is not a timestamp",
                field(ts_at)
            ))
        })?;
        let cells = cell_columns
            .iter()
            .map(|(i, technology)| {
                IndexCell::parse_text(field(*i)).unwrap_or_else(|| {
                    trace!(technology = %technology, record = line, "unreadable cell read as empty");
                    IndexCell::Empty
                })
            })
            .collect();

        rows.push(MergedIndexRow {
            timestamp,
            point_id: field(point_at).to_string(),
            cells,
        });
    }

    MergedIndex::new(cell_columns.into_iter().map(|(_, t)| t).collect(), rows)
}

fn parse_timestamp(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    text.parse::<Timestamp>().ok().or_else(|| {
        let value = text.parse::<f64>().ok()?;
        (value.is_finite() && value.fract() == 0.0).then_some(value as Timestamp)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn sample() -> MergedIndex {
        let row = |ts, point: &str, cells| MergedIndexRow {
            timestamp: ts,
            point_id: point.to_string(),
            cells,
        };
        MergedIndex::new(
            vec!["wifi".into(), "uwb".into()],
            vec![
                row(1_000, "101", vec![IndexCell::Many(vec![0, 1]), IndexCell::Single(0)]),
                row(2_000, "101", vec![IndexCell::Empty, IndexCell::Single(1)]),
                row(2_000, "T03", vec![IndexCell::Single(2), IndexCell::Empty]),
            ],
        )
        .unwrap()
    }

    fn temp_layout() -> (tempfile::TempDir, StorageLayout) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, StorageLayout::new(root))
    }

    #[test]
    fn every_encoding_reads_back_the_same_index() {
        let (_dir, layout) = temp_layout();
        let index = sample();
        save_index(&index, &layout).unwrap();

        for encoding in Encoding::ALL {
            assert_eq!(load_index(&layout, encoding).unwrap(), index, "{encoding}");
        }
    }

    #[test]
    fn columnar_cells_keep_cardinality() {
        let batch = to_record_batch(&sample()).unwrap();
        let wifi = batch.column_by_name("idx_wifi").unwrap().as_list::<i32>();
        assert!(wifi.is_null(1));
        assert_eq!(wifi.value(0).len(), 2);
        assert_eq!(wifi.value(2).len(), 1);
    }

    #[test]
    fn csv_text_and_lenient_reading() {
        let (_dir, layout) = temp_layout();
        layout.create_dirs().unwrap();
        let path = layout.merged_path(Encoding::Csv);

        write_index(&sample(), &path, Encoding::Csv).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ts,point_id,idx_wifi,idx_uwb\n"));
        assert!(text.contains("1000,101,\"[0, 1]\",0\n"));

        std::fs::write(&path, "ts,point_id,idx_ble\n5.0,A,oops\n6,A,2.0\n").unwrap();
        let index = read_index(&path, Encoding::Csv).unwrap();
        assert_eq!(index.cell(0, "ble"), Some(&IndexCell::Empty));
        assert_eq!(index.cell(1, "ble"), Some(&IndexCell::Single(2)));
        assert_eq!(index.row(0).unwrap().timestamp, 5);
    }

    #[test]
    fn absent_index_is_reported() {
        let (_dir, layout) = temp_layout();
        let path = layout.merged_path(Encoding::Parquet);
        assert_eq!(
            load_index(&layout, Encoding::Parquet).unwrap_err(),
            MultiposError::MergedIndexNotFound(path.to_string())
        );
    }

    #[test]
    fn scalar_integer_columns_are_accepted() {
        let schema = Schema::new(vec![
            Field::new("ts", DataType::Int64, false),
            Field::new("point_id", DataType::Utf8, false),
            Field::new("idx_gnss", DataType::Int64, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(arrow_array::StringArray::from(vec!["P", "P"])),
                Arc::new(Int64Array::from(vec![Some(4), None])),
            ],
        )
        .unwrap();

        let index = from_record_batch(&batch).unwrap();
        assert_eq!(index.cell(0, "gnss"), Some(&IndexCell::Single(4)));
        assert_eq!(index.cell(1, "gnss"), Some(&IndexCell::Empty));
    }

    #[test]
    fn fractional_stored_timestamps_are_refused() {
        let schema = Schema::new(vec![
            Field::new("ts", DataType::Float64, false),
            Field::new("point_id", DataType::Utf8, false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(arrow_array::Float64Array::from(vec![1_000.0, 1_000.5])),
                Arc::new(arrow_array::StringArray::from(vec!["P", "P"])),
            ],
        )
        .unwrap();

        assert!(matches!(
            from_record_batch(&batch),
            Err(MultiposError::InvalidColumnType { .. })
        ));
    }
}
