//! # Tabular display of the merged index
//!
//! Pretty-print a merged index with [`comfy-table`](https://docs.rs/comfy-table), for quick
//! inspection from a terminal or a log.
//!
//! ```rust,ignore
//! use multipos::merge::display::MergedIndexDisplayExt;
//!
//! println!("{}", index.show());                 // first 20 epochs
//! println!("{}", index.show().head(5));         // first 5 epochs
//! println!("{}", index.show().all().coverage(true));
//! ```
use std::fmt;

use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Row, Table};

use super::merged_index::MergedIndex;

const DEFAULT_HEAD: usize = 20;

/// Display adaptor over a borrowed [`MergedIndex`].
#[derive(Debug, Clone, Copy)]
pub struct MergedIndexDisplay<'a> {
    index: &'a MergedIndex,
    limit: Option<usize>,
    coverage: bool,
}

impl<'a> MergedIndexDisplay<'a> {
    /// Build a display of the first 20 epochs, without coverage footer.
    pub fn new(index: &'a MergedIndex) -> Self {
        Self {
            index,
            limit: Some(DEFAULT_HEAD),
            coverage: false,
        }
    }

    /// Only render the first `n` epochs.
    pub fn head(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Render every epoch.
    pub fn all(mut self) -> Self {
        self.limit = None;
        self
    }

    /// Append the per-technology [`coverage`](MergedIndex::coverage) below the table.
    pub fn coverage(mut self, yes: bool) -> Self {
        self.coverage = yes;
        self
    }

    fn shown(&self) -> usize {
        self.limit.map_or(self.index.len(), |n| n.min(self.index.len()))
    }

    fn render_comfy(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(self.index.columns());

        for row in self.index.rows().iter().take(self.shown()) {
            let mut cells = vec![
                Cell::new(row.timestamp).set_alignment(CellAlignment::Right),
                Cell::new(&row.point_id),
            ];
            cells.extend(
                row.cells
                    .iter()
                    .map(|cell| Cell::new(cell).set_alignment(CellAlignment::Right)),
            );
            table.add_row(Row::from(cells));
        }

        table.to_string()
    }
}

/// Extension trait giving [`MergedIndex`] a `show()` entry point.
pub trait MergedIndexDisplayExt {
    fn show(&self) -> MergedIndexDisplay<'_>;

    /// Convenience: the default display as an owned `String`.
    fn show_string(&self) -> String {
        self.show().to_string()
    }
}

impl MergedIndexDisplayExt for MergedIndex {
    fn show(&self) -> MergedIndexDisplay<'_> {
        MergedIndexDisplay::new(self)
    }
}

impl fmt::Display for MergedIndexDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.index.len();
        writeln!(f, "Merged index (epochs={n}, technologies={})", self.index.technologies().len())?;
        writeln!(f, "-------------------")?;
        f.write_str(&self.render_comfy())?;

        let hidden = n - self.shown();
        if hidden > 0 {
            write!(f, "\n... {hidden} more epochs")?;
        }

        if self.coverage {
            for (technology, stats) in self.index.coverage() {
                write!(f, "\n{technology:<8} {stats}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::index_cell::IndexCell;
    use crate::merge::merged_index::MergedIndexRow;

    fn sample() -> MergedIndex {
        let rows = (0..3)
            .map(|i| MergedIndexRow {
                timestamp: 100 * i,
                point_id: format!("P{i}"),
                cells: vec![IndexCell::Many(vec![0, 1]), IndexCell::Empty],
            })
            .collect();
        MergedIndex::new(vec!["wifi".into(), "ble".into()], rows).unwrap()
    }

    #[test]
    fn header_and_cells_are_rendered() {
        let out = sample().show_string();
        assert!(out.starts_with("Merged index (epochs=3, technologies=2)"));
        assert!(out.contains("idx_wifi"));
        assert!(out.contains("idx_ble"));
        assert!(out.contains("[0, 1]"));
        assert!(!out.contains("more epochs"));
    }

    #[test]
    fn head_truncates_and_reports_hidden_rows() {
        let index = sample();
        let out = index.show().head(1).to_string();
        assert!(out.contains("P0"));
        assert!(!out.contains("P2"));
        assert!(out.ends_with("... 2 more epochs"));
    }

    #[test]
    fn coverage_footer() {
        let index = sample();
        let out = index.show().all().coverage(true).to_string();
        assert!(out.contains("wifi     empty=0, single=0, many=3, max=2"));
        assert!(out.contains("ble      empty=3, single=0, many=0, max=0"));
    }
}
