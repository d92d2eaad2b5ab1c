//! # Multi-technology merge
//!
//! Build and persist the **merged index** of a measurement campaign: a sparse table that
//! aligns the readings of every technology on their shared `(ts, point_id)` epoch, storing
//! only row handles into the technology tables.
//!
//! ## Overview
//! -----------------
//! Two technologies `a` and `b`, where `a` logged two readings and `b` one reading at the
//! same epoch:
//!
//! ```text
//! a: ts point_id            b: ts point_id          merged: ts point_id idx_a   idx_b
//! 0  10 P1                  0  10 P1                        10 P1       [0, 1]  0
//! 1  10 P1
//! ```
//!
//! The merge is split into small steps, each in its own module:
//!
//! * [`projection`] – Table → `(ts, point_id, technology, position)` rows.
//! * [`index_cell`] – Cardinality collapse of a group of positions.
//! * [`merger`] – Grouping and pivot into a [`MergedIndex`].
//! * [`merged_index`] – The index type, lookups and coverage statistics.
//! * [`store`] – Binary, Parquet and CSV persistence.
//! * [`display`] – Terminal table rendering.
//!
//! The usual entry point is [`data_merge`], which merges and writes the three artifacts.
use camino::Utf8Path;
use tracing::info;

use crate::multipos_errors::MultiposError;
use crate::tables::table_file::SourceRegistry;
use crate::tables::StorageLayout;

pub mod display;
pub mod index_cell;
pub mod merged_index;
pub mod merger;
pub mod projection;
pub mod store;

pub use index_cell::IndexCell;
pub use merged_index::{CoverageStats, MergedIndex, MergedIndexRow};

/// Merge the tables of `technologies` and persist the index under `root`.
///
/// Arguments
/// -----------------
/// * `technologies`: Technologies to merge, in the column order of the index.
/// * `sources`: Location of the processed table of every technology.
/// * `root`: Campaign root. `merged.bin`, `merged.parquet` and `merged.csv` are written to
///   its `binary/`, `parquet/` and `csv/` sub-directories, created as needed.
///
/// Return
/// ----------
/// * The merged index that was written.
/// * [`MultiposError::UnknownSystem`] if a technology has no registered location,
///   [`MultiposError::SourceNotFound`] if its file is missing. Nothing is written on error.
///
/// See also
/// ------------
/// * [`merger::merge`] – The in-memory merge, for any [`TableLoader`](crate::tables::table_file::TableLoader).
/// * [`store::load_index`] – Read an index back.
pub fn data_merge<S: AsRef<str>>(
    technologies: &[S],
    sources: &SourceRegistry,
    root: &Utf8Path,
) -> Result<MergedIndex, MultiposError> {
    let index = merger::merge(technologies, sources)?;
    let layout = StorageLayout::new(root);
    store::save_index(&index, &layout)?;

    for (technology, stats) in index.coverage() {
        info!(technology = %technology, %stats, "index coverage");
    }
    Ok(index)
}
