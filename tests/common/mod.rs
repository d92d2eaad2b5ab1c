#![allow(dead_code)]

use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Int64Type;
use arrow_array::{Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use camino::Utf8PathBuf;
use multipos::tables::table_file::SourceRegistry;
use multipos::tables::{save_table, Encoding, StorageLayout};
use tempfile::TempDir;

/// Technology table with `ts`, `point_id` and an `rssi` payload column.
pub fn readings(ts: &[i64], points: &[&str], rssi: &[i64]) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("ts", DataType::Int64, false),
        Field::new("point_id", DataType::Utf8, false),
        Field::new("rssi", DataType::Int64, false),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from(ts.to_vec())),
            Arc::new(StringArray::from(points.to_vec())),
            Arc::new(Int64Array::from(rssi.to_vec())),
        ],
    )
    .unwrap()
}

/// Values of the `rssi` payload column.
pub fn rssi(table: &RecordBatch) -> Vec<i64> {
    table
        .column_by_name("rssi")
        .unwrap()
        .as_primitive::<Int64Type>()
        .values()
        .to_vec()
}

/// Temporary campaign root, removed when the guard is dropped.
pub fn temp_root() -> (TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, root)
}

/// Export every table under `root` and return a registry pointing at the binary artifacts.
pub fn write_campaign(root: &Utf8PathBuf, tables: &[(&str, RecordBatch)]) -> SourceRegistry {
    let layout = StorageLayout::new(root.clone());
    for (technology, table) in tables {
        save_table(table, &layout, technology).unwrap();
    }
    SourceRegistry::from_layout(&layout, tables.iter().map(|(t, _)| *t), Encoding::Binary)
}

/// Technologies `a` and `b` sharing one epoch: two readings of `a`, one of `b`.
pub fn two_technology_campaign() -> Vec<(&'static str, RecordBatch)> {
    vec![
        ("a", readings(&[100, 100], &["P1", "P1"], &[-60, -61])),
        ("b", readings(&[100], &["P1"], &[-70])),
    ]
}
