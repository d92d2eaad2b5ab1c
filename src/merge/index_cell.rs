//! # Index cells
//!
//! One cell of an `idx_<technology>` column of the merged index. A technology may log zero,
//! one, or many readings for the same `(ts, point_id)` epoch, and the three cases are kept
//! apart by the type instead of by inspecting a dynamically typed value at read time.
//!
//! ## Cardinality collapse
//! -----------------
//! [`IndexCell::from_positions`] is the only place the merge builds cells:
//!
//! | positions | cell |
//! |---|---|
//! | `[]` | [`IndexCell::Empty`] |
//! | `[k]` | [`IndexCell::Single`]`(k)` |
//! | `[k1, k2, ...]` | [`IndexCell::Many`]`(vec![k1, k2, ...])`, order kept, duplicates kept |
//!
//! A `Many` built this way always holds at least two positions, which is what lets the
//! columnar encoding store every cell as a nullable list and still tell `Single` from `Many`.
//!
//! ## Text form
//! -----------------
//! [`Display`](std::fmt::Display) gives the CSV rendering: empty string, plain decimal, or a
//! bracketed list (`[0, 1]`). [`IndexCell::parse_text`] reads it back leniently.
use std::fmt;

use bincode::{Decode, Encode};
use itertools::Itertools;

use crate::constants::Position;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Encode, Decode)]
pub enum IndexCell {
    /// No reading of the technology at this epoch.
    #[default]
    Empty,
    /// Exactly one reading, at this row position.
    Single(Position),
    /// Several readings, in original table order.
    Many(Vec<Position>),
}

impl IndexCell {
    /// Collapse the positions of one `(ts, point_id, technology)` group into a cell.
    pub fn from_positions(mut positions: Vec<Position>) -> Self {
        match positions.len() {
            0 => IndexCell::Empty,
            1 => IndexCell::Single(positions.remove(0)),
            _ => IndexCell::Many(positions),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, IndexCell::Empty)
    }

    /// Number of readings referenced by the cell.
    pub fn multiplicity(&self) -> usize {
        match self {
            IndexCell::Empty => 0,
            IndexCell::Single(_) => 1,
            IndexCell::Many(positions) => positions.len(),
        }
    }

    /// Referenced positions, in cell order.
    pub fn positions(&self) -> &[Position] {
        match self {
            IndexCell::Empty => &[],
            IndexCell::Single(position) => std::slice::from_ref(position),
            IndexCell::Many(positions) => positions,
        }
    }

    /// Parse the CSV rendering of a cell.
    ///
    /// Accepts an empty field, a plain non-negative integer, an integral float (`"3.0"`, as
    /// written by tools that widen integer columns holding gaps), or a bracketed list of those.
    ///
    /// Return
    /// ----------
    /// * `Some(cell)` on success, `None` when the text is not integer-shaped (a negative
    ///   number, a fraction, a word, ...). Callers treat `None` as an unresolvable handle.
    pub fn parse_text(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("nan") {
            return Some(IndexCell::Empty);
        }

        match text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            Some(inner) => {
                let positions = inner
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(parse_position)
                    .collect::<Option<Vec<_>>>()?;
                Some(IndexCell::from_positions(positions))
            }
            None => parse_position(text).map(IndexCell::Single),
        }
    }
}

fn parse_position(text: &str) -> Option<Position> {
    if let Ok(position) = text.parse::<Position>() {
        return Some(position);
    }
    let value = text.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= Position::MAX as f64)
        .then_some(value as Position)
}

impl fmt::Display for IndexCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexCell::Empty => Ok(()),
            IndexCell::Single(position) => write!(f, "{position}"),
            IndexCell::Many(positions) => write!(f, "[{}]", positions.iter().join(", ")),
        }
    }
}
