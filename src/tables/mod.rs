//! # Per-technology tables: storage layout and three-way I/O
//!
//! Every technology of a campaign (WiFi, GNSS, BLE, UWB, 5G) is preprocessed upstream into a
//! single Arrow [`RecordBatch`] that exposes at least a `ts` and a `point_id` column. This module
//! owns the on-disk side of those tables and of the merged index that references them.
//!
//! ## Storage layout
//! -----------------
//! A campaign root holds three parallel sub-trees, one per [`Encoding`]:
//!
//! ```text
//! <root>/
//! ├── csv/      merged.csv      wifi.csv      ble.csv      ...
//! ├── parquet/  merged.parquet  wifi.parquet  ble.parquet  ...
//! └── binary/   merged.bin      wifi.arrow    ble.arrow    ...
//! ```
//!
//! * **csv** – row-oriented text, meant for human inspection. Nested columns are stringified.
//! * **parquet** – columnar binary with exact types.
//! * **binary** – canonical native dump (Arrow IPC for technology tables, `bincode` for the
//!   merged index). This is the form preferred by readers when available.
//!
//! ## Row positions
//! -----------------
//! Handles stored in the merged index are plain row offsets. A loaded table is always a single
//! contiguous batch (multi-batch files are concatenated in file order), so its row space is
//! `0..N-1` in the order rows were written. Reordering or filtering a table after the merge
//! invalidates the handles pointing into it.
//!
//! Modules
//! -----------------
//! * [`csv_io`] – CSV read (schema inference) and write (nested columns rendered as text).
//! * [`parquet_io`] – Parquet read/write through the Arrow reader and writer.
//! * [`ipc_io`] – Arrow IPC file read/write (canonical binary form of a table).
//! * [`table_file`] – The [`TableLoader`](table_file::TableLoader) seam and its implementations.
use std::{fmt, str::FromStr, sync::Arc};

use arrow_array::RecordBatch;
use arrow_schema::Schema;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::constants::MERGED_STEM;
use crate::multipos_errors::MultiposError;

pub mod csv_io;
pub mod ipc_io;
pub mod parquet_io;
pub mod table_file;

/// On-disk encoding of a table or of the merged index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// Row-oriented text.
    Csv,
    /// Columnar binary.
    #[default]
    Parquet,
    /// Canonical native binary dump.
    Binary,
}

impl Encoding {
    /// Every encoding, in the order artifacts are written.
    pub const ALL: [Encoding; 3] = [Encoding::Binary, Encoding::Parquet, Encoding::Csv];

    /// Name of the sub-directory holding the artifacts of this encoding.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Encoding::Csv => "csv",
            Encoding::Parquet => "parquet",
            Encoding::Binary => "binary",
        }
    }

    /// File extension of a technology table written in this encoding.
    pub fn table_extension(&self) -> &'static str {
        match self {
            Encoding::Csv => "csv",
            Encoding::Parquet => "parquet",
            Encoding::Binary => "arrow",
        }
    }

    /// File extension of the merged index written in this encoding.
    pub fn index_extension(&self) -> &'static str {
        match self {
            Encoding::Csv => "csv",
            Encoding::Parquet => "parquet",
            Encoding::Binary => "bin",
        }
    }

    /// Resolve the encoding of a technology table from its file extension.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: Location of a technology table.
    ///
    /// Return
    /// ----------
    /// * The matching [`Encoding`], or [`MultiposError::UnsupportedEncoding`] when the
    ///   extension is missing or unknown.
    pub fn from_table_path(path: &Utf8Path) -> Result<Self, MultiposError> {
        match path.extension().map(str::to_ascii_lowercase).as_deref() {
            Some("csv") => Ok(Encoding::Csv),
            Some("parquet") | Some("pq") => Ok(Encoding::Parquet),
            Some("arrow") | Some("ipc") => Ok(Encoding::Binary),
            Some(other) => Err(MultiposError::UnsupportedEncoding(other.to_string())),
            None => Err(MultiposError::UnsupportedEncoding(path.to_string())),
        }
    }
}

impl FromStr for Encoding {
    type Err = MultiposError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Encoding::Csv),
            "parquet" => Ok(Encoding::Parquet),
            "binary" | "pickle" => Ok(Encoding::Binary),
            _ => Err(MultiposError::UnsupportedEncoding(s.to_string())),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Paths of every artifact under a campaign root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: Utf8PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn encoding_dir(&self, encoding: Encoding) -> Utf8PathBuf {
        self.root.join(encoding.dir_name())
    }

    /// Location of the merged index in `encoding`.
    pub fn merged_path(&self, encoding: Encoding) -> Utf8PathBuf {
        self.encoding_dir(encoding)
            .join(format!("{MERGED_STEM}.{}", encoding.index_extension()))
    }

    /// Location of the table of `technology` in `encoding`.
    pub fn table_path(&self, technology: &str, encoding: Encoding) -> Utf8PathBuf {
        self.encoding_dir(encoding)
            .join(format!("{technology}.{}", encoding.table_extension()))
    }

    /// Create the three encoding directories if they do not exist yet.
    pub fn create_dirs(&self) -> Result<(), MultiposError> {
        for encoding in Encoding::ALL {
            std::fs::create_dir_all(self.encoding_dir(encoding))?;
        }
        Ok(())
    }
}

/// A table with no columns and no rows.
///
/// Used by tolerant readers for technologies whose artifact is absent: every handle into it
/// is out of range and resolves to "no reading".
pub fn empty_table() -> RecordBatch {
    RecordBatch::new_empty(Arc::new(Schema::empty()))
}

/// Read a technology table, choosing the decoder from the file extension.
///
/// The result is a single batch whose row order is the file order, i.e. its rows are the
/// canonical `0..N-1` handle space of this table.
pub fn load_table(path: &Utf8Path) -> Result<RecordBatch, MultiposError> {
    let table = match Encoding::from_table_path(path)? {
        Encoding::Csv => csv_io::read_csv(path)?,
        Encoding::Parquet => parquet_io::read_parquet(path, None)?,
        Encoding::Binary => ipc_io::read_ipc(path)?,
    };
    debug!(path = %path, rows = table.num_rows(), "loaded table");
    Ok(table)
}

/// Write `table` to `path` in `encoding`.
pub fn write_table(
    table: &RecordBatch,
    path: &Utf8Path,
    encoding: Encoding,
) -> Result<(), MultiposError> {
    match encoding {
        Encoding::Csv => csv_io::write_csv(table, path),
        Encoding::Parquet => parquet_io::write_parquet(table, path),
        Encoding::Binary => ipc_io::write_ipc(table, path),
    }
}

/// Export the table of `technology` to all three encodings under `layout`.
///
/// Arguments
/// -----------------
/// * `table`: The processed table. Its current row order becomes the handle space used by
///   the merge.
/// * `layout`: Campaign root receiving the artifacts.
/// * `technology`: Name used as the artifact file stem.
///
/// Return
/// ----------
/// * `Ok(())` once the CSV, Parquet and Arrow IPC files are written.
pub fn save_table(
    table: &RecordBatch,
    layout: &StorageLayout,
    technology: &str,
) -> Result<(), MultiposError> {
    layout.create_dirs()?;
    for encoding in Encoding::ALL {
        write_table(table, &layout.table_path(technology, encoding), encoding)?;
    }
    debug!(technology, rows = table.num_rows(), root = %layout.root(), "saved table");
    Ok(())
}

/// Stitch consecutive batches of one file into a single contiguous table.
pub(crate) fn concat_in_order(
    schema: Arc<Schema>,
    batches: Vec<RecordBatch>,
) -> Result<RecordBatch, MultiposError> {
    match batches.len() {
        0 => Ok(RecordBatch::new_empty(schema)),
        1 => Ok(batches.into_iter().next().unwrap_or_else(empty_table)),
        _ => Ok(arrow_select::concat::concat_batches(&schema, &batches)?),
    }
}
