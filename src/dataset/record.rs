//! Records produced by a [`Dataset`](super::Dataset).
use arrow_array::RecordBatch;

use crate::constants::{Technology, Timestamp};

/// Rows of one technology matched to an epoch.
///
/// Both variants own a deep copy of the matched rows: mutating or dropping them never
/// touches the dataset's cached tables.
#[derive(Debug, Clone, PartialEq)]
pub enum TechnologyMatch {
    /// Exactly one reading, as a one-row table.
    One(RecordBatch),
    /// Several readings, rows in the order of the index cell.
    Many(RecordBatch),
}

impl TechnologyMatch {
    pub fn rows(&self) -> &RecordBatch {
        match self {
            TechnologyMatch::One(rows) | TechnologyMatch::Many(rows) => rows,
        }
    }

    pub fn into_rows(self) -> RecordBatch {
        match self {
            TechnologyMatch::One(rows) | TechnologyMatch::Many(rows) => rows,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows().num_rows()
    }

    pub fn is_many(&self) -> bool {
        matches!(self, TechnologyMatch::Many(_))
    }
}

/// One epoch of the merged index, with the readings of every requested technology.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochRecord {
    pub timestamp: Timestamp,
    pub point_id: String,
    /// One entry per requested technology, in request order. `None` means no reading, or a
    /// handle that could not be resolved against the current table.
    pub readings: Vec<(Technology, Option<TechnologyMatch>)>,
}

impl EpochRecord {
    /// Reading of `technology`, if it was requested and matched.
    pub fn reading(&self, technology: &str) -> Option<&TechnologyMatch> {
        self.readings
            .iter()
            .find(|(t, _)| t == technology)
            .and_then(|(_, reading)| reading.as_ref())
    }

    /// Technologies with a reading at this epoch, in request order.
    pub fn present(&self) -> impl Iterator<Item = &str> + '_ {
        self.readings
            .iter()
            .filter(|(_, reading)| reading.is_some())
            .map(|(t, _)| t.as_str())
    }
}
