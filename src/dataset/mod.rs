//! # Epoch dataset
//!
//! Walk a merged index epoch by epoch and materialize, for every requested technology, the
//! rows its handles point to.
//!
//! ## Overview
//! -----------------
//! A [`Dataset`] owns a [`MergedIndex`] and a [`TableLoader`]. Technology tables are loaded on
//! first reference and cached for the life of the instance; two datasets over the same files
//! each keep their own cache.
//!
//! Every index cell resolves as follows:
//!
//! | cell | reading |
//! |---|---|
//! | empty | `None` |
//! | `k` | [`TechnologyMatch::One`] holding row `k` |
//! | `[k1, k2, ...]` | [`TechnologyMatch::Many`] holding rows `k1, k2, ...` in that order |
//!
//! Matched rows are copied out of the cached table. A handle outside the table bounds (e.g.
//! a table regenerated after the merge) resolves to `None` for that technology only; the
//! rest of the record is unaffected.
//!
//! ## Example
//! -----------------
//! ```rust,no_run
//! use multipos::dataset::{Dataset, DatasetConfig};
//!
//! # fn demo() -> Result<(), multipos::multipos_errors::MultiposError> {
//! let config = DatasetConfig::builder().technologies(["uwb", "ble"]).build()?;
//! let dataset = Dataset::new(&config)?;
//!
//! for record in &dataset {
//!     if let Some(uwb) = record.reading("uwb") {
//!         println!("{} {} -> {} uwb rows", record.timestamp, record.point_id, uwb.num_rows());
//!     }
//! }
//! # Ok(()) }
//! ```
use std::cell::OnceCell;
use std::fmt;

use arrow_array::{RecordBatch, UInt64Array};
use arrow_select::take::take_record_batch;
use tracing::{debug, info, trace, warn};

use crate::constants::{FastHashMap, Technology};
use crate::merge::index_cell::IndexCell;
use crate::merge::merged_index::MergedIndex;
use crate::merge::store::load_index;
use crate::multipos_errors::MultiposError;
use crate::tables::table_file::{StoredTables, TableLoader};
use crate::tables::{empty_table, StorageLayout};

pub mod config;
#[cfg(feature = "progress")]
pub mod progress_bar;
pub mod record;

pub use config::{DatasetConfig, DatasetConfigBuilder};
pub use record::{EpochRecord, TechnologyMatch};

pub struct Dataset {
    index: MergedIndex,
    /// Requested technologies with their column slot in `index`.
    slots: Vec<(Technology, usize)>,
    loader: Box<dyn TableLoader>,
    cache: FastHashMap<Technology, OnceCell<RecordBatch>>,
    progress: bool,
}

impl Dataset {
    /// Open the dataset described by `config`.
    ///
    /// The merged index is read in `config.encoding`; technology tables are read from the
    /// binary artifact when present, else from the artifact of `config.encoding`, else they
    /// are treated as empty.
    ///
    /// Return
    /// ----------
    /// * The dataset, or [`MultiposError::MergedIndexNotFound`] if the root holds no merged
    ///   index in that encoding.
    pub fn new(config: &DatasetConfig) -> Result<Self, MultiposError> {
        let layout = StorageLayout::new(config.root.clone());
        let index = load_index(&layout, config.encoding)?;
        info!(
            root = %config.root,
            encoding = %config.encoding,
            epochs = index.len(),
            "merged index loaded"
        );

        let loader = StoredTables::new(layout, config.encoding);
        let dataset = Self::from_parts(index, config.technologies.clone(), loader)
            .with_progress(config.progress);
        if config.progress && cfg!(not(feature = "progress")) {
            debug!("progress reporting requested but the `progress` feature is disabled");
        }
        Ok(dataset)
    }

    /// Build a dataset over an index and tables already at hand.
    ///
    /// Arguments
    /// -----------------
    /// * `index`: The merged index. Requested technologies it has no column for get an
    ///   all-empty one.
    /// * `technologies`: Technologies to resolve, in record order. Repeated names are kept once.
    /// * `loader`: Source of the technology tables.
    pub fn from_parts<I, S, L>(mut index: MergedIndex, technologies: I, loader: L) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Technology>,
        L: TableLoader + 'static,
    {
        let mut requested: Vec<Technology> = Vec::new();
        for technology in technologies.into_iter().map(Into::into) {
            if !requested.contains(&technology) {
                requested.push(technology);
            }
        }

        let mut slots = Vec::with_capacity(requested.len());
        for technology in requested {
            if index.ensure_technology(&technology) {
                debug!(technology = %technology, "no index column, synthesized an empty one");
            }
            if let Some(slot) = index.technology_slot(&technology) {
                slots.push((technology, slot));
            }
        }

        let cache = slots
            .iter()
            .map(|(technology, _)| (technology.clone(), OnceCell::new()))
            .collect();

        Self {
            index,
            slots,
            loader: Box::new(loader),
            cache,
            progress: false,
        }
    }

    /// Show a progress bar on every pass (no effect without the `progress` feature).
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &MergedIndex {
        &self.index
    }

    /// Requested technologies, in record order.
    pub fn technologies(&self) -> impl Iterator<Item = &str> + '_ {
        self.slots.iter().map(|(t, _)| t.as_str())
    }

    /// Record of epoch `i`, or `None` past the end.
    pub fn get(&self, i: usize) -> Option<EpochRecord> {
        let row = self.index.row(i)?;
        let readings = self
            .slots
            .iter()
            .map(|(technology, slot)| {
                let reading = row
                    .cells
                    .get(*slot)
                    .and_then(|cell| self.resolve(technology, cell, i));
                (technology.clone(), reading)
            })
            .collect();

        Some(EpochRecord {
            timestamp: row.timestamp,
            point_id: row.point_id.clone(),
            readings,
        })
    }

    /// A fresh pass over every epoch, from the first.
    pub fn iter(&self) -> EpochIter<'_> {
        EpochIter::new(self)
    }

    /// Cached table of `technology`, loaded on first call.
    ///
    /// A table that fails to load is cached as empty: every handle into it resolves to absent.
    fn table(&self, technology: &str) -> Option<&RecordBatch> {
        let cell = self.cache.get(technology)?;
        Some(cell.get_or_init(|| match self.loader.load(technology) {
            Ok(table) => {
                debug!(technology, rows = table.num_rows(), "technology table cached");
                table
            }
            Err(error) => {
                warn!(technology, %error, "technology table unavailable, readings resolve to absent");
                empty_table()
            }
        }))
    }

    fn resolve(&self, technology: &str, cell: &IndexCell, row: usize) -> Option<TechnologyMatch> {
        if cell.is_empty() {
            return None;
        }
        let table = self.table(technology)?;

        let positions = cell.positions();
        if let Some(&position) = positions.iter().find(|&&p| p >= table.num_rows()) {
            trace!(
                technology,
                row,
                position,
                table_rows = table.num_rows(),
                "unresolvable handle"
            );
            return None;
        }

        let indices = UInt64Array::from_iter_values(positions.iter().map(|&p| p as u64));
        let rows = match take_record_batch(table, &indices) {
            Ok(rows) => rows,
            Err(error) => {
                trace!(technology, row, %error, "unresolvable handle");
                return None;
            }
        };

        Some(match cell {
            IndexCell::Many(_) => TechnologyMatch::Many(rows),
            _ => TechnologyMatch::One(rows),
        })
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("epochs", &self.index.len())
            .field("technologies", &self.slots)
            .field(
                "cached",
                &self.cache.iter().filter(|(_, c)| c.get().is_some()).count(),
            )
            .field("progress", &self.progress)
            .finish()
    }
}

/// Sequential pass over a [`Dataset`], in merged-index row order.
pub struct EpochIter<'a> {
    dataset: &'a Dataset,
    next: usize,
    #[cfg(feature = "progress")]
    progress: Option<progress_bar::EpochProgress>,
}

impl<'a> EpochIter<'a> {
    fn new(dataset: &'a Dataset) -> Self {
        Self {
            dataset,
            next: 0,
            #[cfg(feature = "progress")]
            progress: dataset
                .progress
                .then(|| progress_bar::EpochProgress::new(dataset.len())),
        }
    }
}

impl EpochIter<'_> {
    #[cfg(feature = "progress")]
    fn report(&mut self, advanced: bool) {
        if advanced {
            if let Some(progress) = self.progress.as_mut() {
                progress.step();
            }
        } else if let Some(progress) = self.progress.take() {
            progress.finish();
        }
    }

    #[cfg(not(feature = "progress"))]
    fn report(&mut self, _advanced: bool) {}
}

impl Iterator for EpochIter<'_> {
    type Item = EpochRecord;

    fn next(&mut self) -> Option<EpochRecord> {
        let record = self.dataset.get(self.next);
        if record.is_some() {
            self.next += 1;
        }
        self.report(record.is_some());
        record
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.dataset.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for EpochIter<'_> {}

impl<'a> IntoIterator for &'a Dataset {
    type Item = EpochRecord;
    type IntoIter = EpochIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merger::merge;
    use crate::tables::table_file::InMemoryTables;
    use arrow_array::{Int64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use std::sync::Arc;

    fn table(ts: Vec<i64>, points: Vec<&str>, values: Vec<i64>) -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("ts", DataType::Int64, false),
            Field::new("point_id", DataType::Utf8, false),
            Field::new("value", DataType::Int64, false),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(ts)),
                Arc::new(StringArray::from(points)),
                Arc::new(Int64Array::from(values)),
            ],
        )
        .unwrap()
    }

    fn values(batch: &RecordBatch) -> Vec<i64> {
        batch
            .column_by_name("value")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .values()
            .to_vec()
    }

    fn tables() -> InMemoryTables {
        InMemoryTables::new()
            .with_table("a", table(vec![100, 100, 200], vec!["P1", "P1", "P2"], vec![7, 8, 9]))
            .with_table("b", table(vec![100], vec!["P1"], vec![42]))
    }

    #[test]
    fn cells_resolve_to_rows() {
        let index = merge(&["a", "b"], &tables()).unwrap();
        let dataset = Dataset::from_parts(index, ["a", "b"], tables());

        let first = dataset.get(0).unwrap();
        assert_eq!((first.timestamp, first.point_id.as_str()), (100, "P1"));
        let a = first.reading("a").unwrap();
        assert!(a.is_many());
        assert_eq!(values(a.rows()), vec![7, 8]);
        assert_eq!(values(first.reading("b").unwrap().rows()), vec![42]);

        let second = dataset.get(1).unwrap();
        assert!(matches!(second.reading("a"), Some(TechnologyMatch::One(_))));
        assert!(second.reading("b").is_none());

        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn out_of_range_handles_degrade_one_field() {
        let index = merge(&["a", "b"], &tables()).unwrap();
        let shrunk = InMemoryTables::new()
            .with_table("a", table(vec![100], vec!["P1"], vec![7]))
            .with_table("b", table(vec![100], vec!["P1"], vec![42]));
        let dataset = Dataset::from_parts(index, ["a", "b"], shrunk);

        let record = dataset.get(0).unwrap();
        assert!(record.reading("a").is_none());
        assert_eq!(values(record.reading("b").unwrap().rows()), vec![42]);
    }

    #[test]
    fn missing_column_and_missing_table_resolve_to_absent() {
        let index = merge(&["a"], &tables()).unwrap();
        let dataset = Dataset::from_parts(index, ["a", "ghost"], tables());

        assert!(dataset.index().has_technology("ghost"));
        let record = dataset.get(0).unwrap();
        assert!(record.reading("a").is_some());
        assert!(record.reading("ghost").is_none());
        assert_eq!(record.present().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn iteration_is_restartable() {
        let index = merge(&["a", "b"], &tables()).unwrap();
        let dataset = Dataset::from_parts(index, ["b", "a"], tables());

        let first: Vec<_> = dataset.iter().collect();
        let second: Vec<_> = (&dataset).into_iter().collect();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(dataset.iter().len(), 2);
        assert_eq!(
            dataset.technologies().collect::<Vec<_>>(),
            vec!["b", "a"]
        );
        assert_eq!(first[0].readings[0].0, "b");
    }

    #[cfg(feature = "progress")]
    #[test]
    fn progress_leaves_records_unchanged() {
        let index = merge(&["a", "b"], &tables()).unwrap();
        let plain = Dataset::from_parts(index.clone(), ["a", "b"], tables());
        let reported = Dataset::from_parts(index, ["a", "b"], tables()).with_progress(true);

        let expected: Vec<_> = plain.iter().collect();
        assert_eq!(expected.len(), 2);
        assert_eq!(reported.iter().collect::<Vec<_>>(), expected);
        assert_eq!(reported.iter().len(), 2);
        assert_eq!(reported.iter().collect::<Vec<_>>(), expected);
    }
}
