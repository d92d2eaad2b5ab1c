//! # Index merger
//!
//! Align the technology tables of a campaign on their shared `(ts, point_id)` keys.
//!
//! ## Algorithm
//! -----------------
//! 1. Every technology table is projected onto its minimal rows
//!    `(ts, point_id, technology, position)`, positions being the table's own row offsets.
//! 2. The projections are concatenated, technology by technology in the requested order.
//! 3. Rows are grouped on `(ts, point_id, technology)`. Within a group the positions keep the
//!    order they had in the table.
//! 4. Each group collapses into an [`IndexCell`]; groups are pivoted into one row per epoch
//!    with one cell per technology, epochs sorted by `ts` then `point_id`.
//!
//! The merge never looks at payload columns and never moves rows of the source tables.
//! Any load or projection failure aborts the whole merge: no partial index is produced.
use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::constants::{Position, Timestamp};
use crate::multipos_errors::MultiposError;
use crate::tables::table_file::TableLoader;

use super::index_cell::IndexCell;
use super::merged_index::{MergedIndex, MergedIndexRow};
use super::projection::{project, MinimalRow};

/// Build the merged index of `technologies` from the tables served by `loader`.
///
/// Arguments
/// -----------------
/// * `technologies`: Technologies to merge, in the column order of the result. An empty
///   slice yields an index with only the `ts` and `point_id` columns and no rows.
/// * `loader`: Source of the technology tables. Only the key columns are requested.
///
/// Return
/// ----------
/// * The [`MergedIndex`], or the first error met while loading or projecting a table
///   (e.g. [`MultiposError::UnknownSystem`], [`MultiposError::SourceNotFound`],
///   [`MultiposError::MissingColumn`]). A technology requested twice is rejected with
///   [`MultiposError::InvalidConfig`].
///
/// See also
/// ------------
/// * [`merge_rows`] – The grouping step, on already projected rows.
/// * [`data_merge`](crate::merge::data_merge) – Merge and persist in every encoding.
pub fn merge<L, S>(technologies: &[S], loader: &L) -> Result<MergedIndex, MultiposError>
where
    L: TableLoader + ?Sized,
    S: AsRef<str>,
{
    let technologies: Vec<&str> = technologies.iter().map(AsRef::as_ref).collect();
    if let Some(repeated) = first_repeated(&technologies) {
        return Err(MultiposError::InvalidConfig(format!(
            "technology '{repeated}' requested more than once"
        )));
    }

    let tables = technologies
        .iter()
        .map(|&technology| {
            let table = loader.load_keys(technology)?;
            debug!(technology, rows = table.num_rows(), "projecting table");
            Ok(table)
        })
        .collect::<Result<Vec<_>, MultiposError>>()?;

    let mut projected = Vec::new();
    for (table, &technology) in tables.iter().zip(&technologies) {
        projected.extend(project(table, technology)?);
    }

    let index = merge_rows(&technologies, projected);
    info!(
        technologies = ?technologies,
        epochs = index.len(),
        "merged index built"
    );
    Ok(index)
}

/// Group projected rows into the merged index.
///
/// Rows of a technology absent from `technologies` are ignored. Positions of one group are
/// kept in the order the rows are given, so callers pass each table's rows in table order.
pub fn merge_rows<'a>(
    technologies: &[&str],
    rows: impl IntoIterator<Item = MinimalRow<'a>>,
) -> MergedIndex {
    let mut groups: BTreeMap<(Timestamp, String), Vec<Vec<Position>>> = BTreeMap::new();

    for row in rows {
        let Some(slot) = technologies.iter().position(|&t| t == row.technology) else {
            continue;
        };
        groups
            .entry((row.timestamp, row.point_id))
            .or_insert_with(|| vec![Vec::new(); technologies.len()])[slot]
            .push(row.position);
    }

    let rows = groups
        .into_iter()
        .map(|((timestamp, point_id), slots)| MergedIndexRow {
            timestamp,
            point_id,
            cells: slots.into_iter().map(IndexCell::from_positions).collect(),
        })
        .collect();

    // BTreeMap keys are sorted and unique, and every row has one cell per slot.
    MergedIndex::from_sorted_rows(technologies.iter().map(|t| t.to_string()).collect(), rows)
}

fn first_repeated<'a>(technologies: &[&'a str]) -> Option<&'a str> {
    technologies
        .iter()
        .enumerate()
        .find(|&(i, t)| technologies[..i].contains(t))
        .map(|(_, t)| *t)
}
