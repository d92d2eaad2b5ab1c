//! # Parquet I/O for campaign tables
//!
//! Columnar binary read/write of technology tables and of the merged index, through the
//! Arrow reader and writer of the `parquet` crate.
//!
//! ## Overview
//! -----------------
//! * [`read_parquet`] streams record batches and stitches them into one contiguous table, so
//!   the row order on disk is the `0..N-1` handle space of the table.
//! * [`read_parquet_columns`] does the same with a **projection mask**, materializing only the
//!   requested leaf columns. The merge uses it to read nothing but `ts` and `point_id`.
//! * [`write_parquet`] writes one batch with the default writer properties. The Arrow schema is
//!   embedded in the file metadata, so nested types (e.g. `List<UInt64>` index cells) come back
//!   with their exact Arrow type.
//!
//! ## Performance Notes
//! -----------------
//! * **Batch size** (`8192` by default) amortizes decompression and Arrow decoding.
//! * Projection avoids decoding payload columns (ranges, RSSI vectors, ...) when only keys
//!   are needed.
//!
//! ## Error Handling
//! -----------------
//! * I/O and schema issues surface as [`MultiposError::IoError`] or
//!   [`MultiposError::ParquetError`].
//! * A projected column absent from the file yields [`MultiposError::MissingColumn`].
use std::fs::File;
use std::sync::Arc;

use arrow_array::{RecordBatch, RecordBatchReader};
use camino::Utf8Path;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::errors::ParquetError;

use crate::multipos_errors::MultiposError;

use super::concat_in_order;

const DEFAULT_BATCH_SIZE: usize = 8192;

/// Read a whole Parquet file into a single table.
///
/// Arguments
/// -----------------
/// * `path`: Location of the Parquet file.
/// * `batch_size`: Optional Arrow reader batch size (default: 8192 rows).
///
/// Return
/// ----------
/// * The concatenation of every record batch, in file order.
pub fn read_parquet(
    path: &Utf8Path,
    batch_size: Option<usize>,
) -> Result<RecordBatch, MultiposError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();

    let reader = builder
        .with_batch_size(batch_size.unwrap_or(DEFAULT_BATCH_SIZE))
        .build()?;

    let batches = reader
        .map(|b| b.map_err(ParquetError::from))
        .collect::<Result<Vec<_>, _>>()?;

    concat_in_order(schema, batches)
}

/// Read only the named leaf columns of a Parquet file.
///
/// Columns are resolved by **name** against the file schema to build the projection mask.
/// The returned table keeps the file's column order, not the order of `columns`.
///
/// Arguments
/// -----------------
/// * `path`: Location of the Parquet file.
/// * `technology`: Owner of the file, used in error messages.
/// * `columns`: Names of the leaf columns to materialize.
pub fn read_parquet_columns(
    path: &Utf8Path,
    technology: &str,
    columns: &[&str],
) -> Result<RecordBatch, MultiposError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let schema_descr = builder.metadata().file_metadata().schema_descr();
    let all_fields = schema_descr.columns();
    let projection_indices: Vec<usize> = columns
        .iter()
        .map(|name| {
            all_fields
                .iter()
                .position(|f| f.name() == *name)
                .ok_or_else(|| MultiposError::MissingColumn {
                    technology: technology.to_string(),
                    column: name.to_string(),
                })
        })
        .collect::<Result<_, _>>()?;
    let mask = ProjectionMask::leaves(schema_descr, projection_indices);

    let reader = builder
        .with_projection(mask)
        .with_batch_size(DEFAULT_BATCH_SIZE)
        .build()?;
    let schema = reader.schema();

    let batches = reader
        .map(|b| b.map_err(ParquetError::from))
        .collect::<Result<Vec<_>, _>>()?;

    concat_in_order(Arc::clone(&schema), batches)
}

/// Write `table` to a Parquet file, replacing any previous content.
pub fn write_parquet(table: &RecordBatch, path: &Utf8Path) -> Result<(), MultiposError> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, table.schema(), None)?;
    writer.write(table)?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod parquet_io_tests {
    use super::*;
    use arrow_array::{Float64Array, Int64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use camino::Utf8PathBuf;

    fn sample() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("ts", DataType::Int64, false),
            Field::new("point_id", DataType::Utf8, true),
            Field::new("rssi", DataType::Float64, true),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(vec![100, 100, 200])),
                Arc::new(StringArray::from(vec![Some("P1"), Some("P1"), None])),
                Arc::new(Float64Array::from(vec![-70.5, -71.0, -65.25])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn write_then_read_keeps_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("ble.parquet")).unwrap();

        let table = sample();
        write_parquet(&table, &path).unwrap();
        let back = read_parquet(&path, Some(1)).unwrap();

        assert_eq!(back.num_rows(), 3);
        assert_eq!(back.columns(), table.columns());
    }

    #[test]
    fn projection_reads_only_requested_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("ble.parquet")).unwrap();
        write_parquet(&sample(), &path).unwrap();

        let keys = read_parquet_columns(&path, "ble", &["point_id", "ts"]).unwrap();
        assert_eq!(keys.num_columns(), 2);
        assert_eq!(keys.schema().field(0).name(), "ts");
        assert_eq!(keys.num_rows(), 3);

        let err = read_parquet_columns(&path, "ble", &["ts", "x"]).unwrap_err();
        assert_eq!(
            err,
            MultiposError::MissingColumn {
                technology: "ble".into(),
                column: "x".into()
            }
        );
    }
}
