//! Row-oriented text form of technology tables.
//!
//! Reading infers the schema from the whole file. Writing renders nested columns (the
//! `ranges`, `anchor_ids` lists produced by several technologies) as their textual form, since
//! CSV has no list type; that makes the CSV export one-way for those columns.
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use arrow_array::{Array, ArrayRef, RecordBatch, StringArray};
use arrow_cast::display::{ArrayFormatter, FormatOptions};
use arrow_csv::reader::Format;
use arrow_csv::{ReaderBuilder, WriterBuilder};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use camino::Utf8Path;

use crate::multipos_errors::MultiposError;

use super::concat_in_order;

const CSV_BATCH_SIZE: usize = 8192;

/// Read a CSV table with a header line, inferring column types from every record.
pub fn read_csv(path: &Utf8Path) -> Result<RecordBatch, MultiposError> {
    let mut file = File::open(path)?;
    let format = Format::default().with_header(true);
    let (schema, _) = format.infer_schema(&mut file, None)?;
    let schema = Arc::new(schema);
    if schema.fields().is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    file.seek(SeekFrom::Start(0))?;
    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_format(format)
        .with_batch_size(CSV_BATCH_SIZE)
        .build(file)?;
    let batches = reader.collect::<Result<Vec<_>, ArrowError>>()?;

    concat_in_order(schema, batches)
}

/// Write `table` as CSV with a header line.
pub fn write_csv(table: &RecordBatch, path: &Utf8Path) -> Result<(), MultiposError> {
    let flat = stringify_nested_columns(table)?;
    let file = File::create(path)?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(&flat)?;
    Ok(())
}

/// Replace every nested column by its display text (`[1.5, 2.0]`), keeping nulls.
fn stringify_nested_columns(table: &RecordBatch) -> Result<RecordBatch, MultiposError> {
    if !table
        .schema()
        .fields()
        .iter()
        .any(|f| f.data_type().is_nested())
    {
        return Ok(table.clone());
    }

    let options = FormatOptions::default();
    let mut fields = Vec::with_capacity(table.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(table.num_columns());

    for (field, column) in table.schema().fields().iter().zip(table.columns()) {
        if !field.data_type().is_nested() {
            fields.push(field.as_ref().clone());
            columns.push(Arc::clone(column));
            continue;
        }

        let formatter = ArrayFormatter::try_new(column.as_ref(), &options)?;
        let text: StringArray = (0..column.len())
            .map(|i| {
                if column.is_null(i) {
                    None
                } else {
                    Some(formatter.value(i).to_string())
                }
            })
            .collect();

        fields.push(Field::new(field.name(), DataType::Utf8, true));
        columns.push(Arc::new(text));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::builder::{Float64Builder, ListBuilder};
    use arrow_array::{Int64Array, StringArray};
    use camino::Utf8PathBuf;

    fn uwb_like() -> RecordBatch {
        let mut ranges = ListBuilder::new(Float64Builder::new());
        ranges.values().append_value(1.5);
        ranges.values().append_value(2.25);
        ranges.append(true);
        ranges.append_null();

        let schema = Schema::new(vec![
            Field::new("ts", DataType::Int64, false),
            Field::new("point_id", DataType::Utf8, false),
            Field::new(
                "ranges",
                DataType::List(Arc::new(Field::new_list_field(DataType::Float64, true))),
                true,
            ),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(vec![1_000, 2_000])),
                Arc::new(StringArray::from(vec!["A13B6", "T01"])),
                Arc::new(ranges.finish()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn nested_columns_are_written_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("uwb.csv")).unwrap();

        write_csv(&uwb_like(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("ts,point_id,ranges"));
        assert_eq!(lines.next(), Some("1000,A13B6,\"[1.5, 2.25]\""));
        assert_eq!(lines.next(), Some("2000,T01,"));
    }

    #[test]
    fn read_infers_types_and_keeps_row_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("wifi.csv")).unwrap();
        std::fs::write(&path, "ts,point_id,rssi\n300,T02,-61.5\n100,T01,\n200,T01,-70.0\n")
            .unwrap();

        let table = read_csv(&path).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.schema().field(0).data_type(), &DataType::Int64);

        let ts = table
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(ts.values().to_vec(), vec![300, 100, 200]);
        assert!(table.column(2).is_null(1));
    }
}
