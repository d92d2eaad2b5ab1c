//! Canonical binary form of technology tables: the Arrow IPC file format.
//!
//! IPC keeps every Arrow type (lists, structs, dictionaries) bit-exact, which makes it the
//! preferred source when a reader needs a technology table back.
use std::fs::File;
use std::io::{BufReader, BufWriter};

use arrow_array::RecordBatch;
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use arrow_schema::ArrowError;
use camino::Utf8Path;

use crate::multipos_errors::MultiposError;

use super::concat_in_order;

/// Read every batch of an Arrow IPC file into one table, in file order.
pub fn read_ipc(path: &Utf8Path) -> Result<RecordBatch, MultiposError> {
    let file = BufReader::new(File::open(path)?);
    let reader = FileReader::try_new(file, None)?;
    let schema = reader.schema();
    let batches = reader.collect::<Result<Vec<_>, ArrowError>>()?;
    concat_in_order(schema, batches)
}

/// Write `table` as a single-batch Arrow IPC file.
pub fn write_ipc(table: &RecordBatch, path: &Utf8Path) -> Result<(), MultiposError> {
    let file = BufWriter::new(File::create(path)?);
    let mut writer = FileWriter::try_new(file, &table.schema())?;
    writer.write(table)?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::builder::{ListBuilder, StringBuilder};
    use arrow_array::{Int64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use camino::Utf8PathBuf;
    use std::sync::Arc;

    #[test]
    fn nested_columns_survive_exactly() {
        let mut anchors = ListBuilder::new(StringBuilder::new());
        anchors.values().append_value("UWB_01");
        anchors.values().append_value("UWB_07");
        anchors.append(true);

        let schema = Schema::new(vec![
            Field::new("ts", DataType::Int64, false),
            Field::new("point_id", DataType::Utf8, false),
            Field::new(
                "anchor_ids",
                DataType::List(Arc::new(Field::new_list_field(DataType::Utf8, true))),
                true,
            ),
        ]);
        let table = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(vec![42])),
                Arc::new(StringArray::from(vec!["T03"])),
                Arc::new(anchors.finish()),
            ],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("uwb.arrow")).unwrap();
        write_ipc(&table, &path).unwrap();

        assert_eq!(read_ipc(&path).unwrap(), table);
    }
}
