//! # Merged index
//!
//! In-memory form of the merged index: one row per distinct `(ts, point_id)` epoch seen in
//! at least one technology, and one [`IndexCell`] per technology on every row.
//!
//! ## Overview
//! -----------------
//! | ts | point_id | idx_a | idx_b |
//! |---|---|---|---|
//! | 10 | P1 | `[0, 1]` | `0` |
//! | 20 | P2 | | `1` |
//!
//! * The merge emits rows sorted by `ts`, then by `point_id` (byte-wise), each epoch once.
//!   An index read back from storage keeps its stored row order, sorted or not.
//! * Technology columns keep the order the technologies were requested in.
//! * A technology that contributed no row at all still owns a column of empty cells.
//!
//! The index carries handles only. Resolving a handle into a row of a technology table is
//! the job of [`Dataset`](crate::dataset::Dataset).
use std::fmt;

use bincode::{Decode, Encode};

use crate::constants::{
    index_column, Technology, Timestamp, POINT_ID_COLUMN, TIMESTAMP_COLUMN,
};
use crate::multipos_errors::MultiposError;

use super::index_cell::IndexCell;

/// One epoch of the merged index.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct MergedIndexRow {
    pub timestamp: Timestamp,
    pub point_id: String,
    /// One cell per technology of the owning index, in column order.
    pub cells: Vec<IndexCell>,
}

impl MergedIndexRow {
    fn key(&self) -> (Timestamp, &str) {
        (self.timestamp, self.point_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode)]
pub struct MergedIndex {
    technologies: Vec<Technology>,
    rows: Vec<MergedIndexRow>,
}

impl MergedIndex {
    /// Assemble an index from its technology columns and rows.
    ///
    /// Arguments
    /// -----------------
    /// * `technologies`: Technology names, in column order. Must be unique.
    /// * `rows`: Epoch rows, each holding exactly one cell per technology.
    ///
    /// Return
    /// ----------
    /// * The index, or [`MultiposError::MalformedIndex`] if a technology is repeated or a row
    ///   has the wrong number of cells. Row order is kept as given; it need not be sorted.
    pub fn new(
        technologies: Vec<Technology>,
        rows: Vec<MergedIndexRow>,
    ) -> Result<Self, MultiposError> {
        for (i, technology) in technologies.iter().enumerate() {
            if technologies[..i].contains(technology) {
                return Err(MultiposError::MalformedIndex(format!(
                    "technology '{technology}' appears twice"
                )));
            }
        }
        if let Some(row) = rows.iter().find(|r| r.cells.len() != technologies.len()) {
            return Err(MultiposError::MalformedIndex(format!(
                "epoch ({}, {}) holds {} cells for {} technologies",
                row.timestamp,
                row.point_id,
                row.cells.len(),
                technologies.len()
            )));
        }
        Ok(Self { technologies, rows })
    }

    /// Assemble an index whose rows are known to be sorted, unique and of the right width.
    pub(crate) fn from_sorted_rows(
        technologies: Vec<Technology>,
        rows: Vec<MergedIndexRow>,
    ) -> Self {
        Self { technologies, rows }
    }

    /// An index with the given technology columns and no rows.
    pub fn empty(technologies: Vec<Technology>) -> Self {
        Self {
            technologies,
            rows: Vec::new(),
        }
    }

    pub fn technologies(&self) -> &[Technology] {
        &self.technologies
    }

    pub fn rows(&self) -> &[MergedIndexRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, i: usize) -> Option<&MergedIndexRow> {
        self.rows.get(i)
    }

    /// Column names in on-disk order: `ts`, `point_id`, then `idx_<technology>` per column.
    pub fn columns(&self) -> Vec<String> {
        [TIMESTAMP_COLUMN.to_string(), POINT_ID_COLUMN.to_string()]
            .into_iter()
            .chain(self.technologies.iter().map(|t| index_column(t)))
            .collect()
    }

    /// Column slot of `technology`, if the index has one.
    pub fn technology_slot(&self, technology: &str) -> Option<usize> {
        self.technologies.iter().position(|t| t == technology)
    }

    pub fn has_technology(&self, technology: &str) -> bool {
        self.technology_slot(technology).is_some()
    }

    /// Cell of `technology` on row `i`.
    pub fn cell(&self, i: usize, technology: &str) -> Option<&IndexCell> {
        let slot = self.technology_slot(technology)?;
        self.rows.get(i).and_then(|row| row.cells.get(slot))
    }

    /// Every cell of `technology`, in row order.
    pub fn column(&self, technology: &str) -> Option<impl Iterator<Item = &IndexCell> + '_> {
        let slot = self.technology_slot(technology)?;
        Some(self.rows.iter().filter_map(move |row| row.cells.get(slot)))
    }

    /// Append an all-empty column for `technology` if the index does not have one.
    ///
    /// Return
    /// ----------
    /// * `true` if a column was added, `false` if it already existed.
    pub fn ensure_technology(&mut self, technology: &str) -> bool {
        if self.has_technology(technology) {
            return false;
        }
        self.technologies.push(technology.to_string());
        for row in &mut self.rows {
            row.cells.push(IndexCell::Empty);
        }
        true
    }

    /// Whether rows are strictly increasing in `(ts, point_id)`, as the merge writes them.
    pub fn is_sorted(&self) -> bool {
        self.rows.windows(2).all(|w| w[0].key() < w[1].key())
    }

    /// Row number of the epoch `(timestamp, point_id)`.
    ///
    /// Binary search over sorted rows; an unsorted index is scanned linearly.
    pub fn position_of(&self, timestamp: Timestamp, point_id: &str) -> Option<usize> {
        let key = (timestamp, point_id);
        if let Ok(i) = self.rows.binary_search_by(|row| row.key().cmp(&key)) {
            return Some(i);
        }
        if self.is_sorted() {
            return None;
        }
        self.rows.iter().position(|row| row.key() == key)
    }

    /// Per-technology summary of the cell cardinalities.
    ///
    /// Return
    /// ----------
    /// * One `(technology, stats)` pair per column, in column order.
    ///
    /// See also
    /// ------------
    /// * [`CoverageStats`] – Compact and pretty (`{:#}`) renderings.
    pub fn coverage(&self) -> Vec<(Technology, CoverageStats)> {
        self.technologies
            .iter()
            .enumerate()
            .map(|(slot, technology)| {
                let stats = self
                    .rows
                    .iter()
                    .filter_map(|row| row.cells.get(slot))
                    .fold(CoverageStats::default(), CoverageStats::count);
                (technology.clone(), stats)
            })
            .collect()
    }
}

/// Cardinality summary of one `idx_<technology>` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoverageStats {
    /// Epochs without a reading.
    pub empty: usize,
    /// Epochs with exactly one reading.
    pub single: usize,
    /// Epochs with several readings.
    pub many: usize,
    /// Largest number of readings at one epoch.
    pub max_multiplicity: usize,
}

impl CoverageStats {
    fn count(mut self, cell: &IndexCell) -> Self {
        match cell {
            IndexCell::Empty => self.empty += 1,
            IndexCell::Single(_) => self.single += 1,
            IndexCell::Many(_) => self.many += 1,
        }
        self.max_multiplicity = self.max_multiplicity.max(cell.multiplicity());
        self
    }

    /// Number of epochs with at least one reading.
    pub fn covered(&self) -> usize {
        self.single + self.many
    }
}

impl fmt::Display for CoverageStats {
    /// Compact by default; multi-line when using the alternate flag (`{:#}`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Index coverage")?;
            writeln!(f, "--------------")?;
            writeln!(f, "empty            : {}", self.empty)?;
            writeln!(f, "single           : {}", self.single)?;
            writeln!(f, "many             : {}", self.many)?;
            write!(f, "max multiplicity : {}", self.max_multiplicity)
        } else {
            write!(
                f,
                "empty={}, single={}, many={}, max={}",
                self.empty, self.single, self.many, self.max_multiplicity
            )
        }
    }
}
