//! # Constants and type definitions for multipos
//!
//! This module centralizes the **column names**, **technology identifiers**, and
//! **common type aliases** shared by the merge, storage, and dataset layers.
//!
//! ## Overview
//!
//! - Column names every per-technology table must expose (`ts`, `point_id`)
//! - The `idx_` prefix used for merged-index columns
//! - The five technologies recorded during a measurement campaign
//! - Type aliases for timestamps, row positions, and hash maps
//!
//! These definitions are used by all main modules, so changing a column name here
//! changes the on-disk contract of every artifact produced by the crate.

use std::collections::HashMap;

use ahash::RandomState;

// -------------------------------------------------------------------------------------------------
// Column names
// -------------------------------------------------------------------------------------------------

/// Name of the timestamp column (milliseconds since the Unix epoch).
pub const TIMESTAMP_COLUMN: &str = "ts";

/// Name of the measurement point identifier column.
pub const POINT_ID_COLUMN: &str = "point_id";

/// Prefix of the per-technology columns of the merged index (`idx_wifi`, `idx_ble`, ...).
pub const INDEX_COLUMN_PREFIX: &str = "idx_";

/// File stem of the merged index artifact inside every encoding directory.
pub const MERGED_STEM: &str = "merged";

/// Default root of the processed campaign data.
pub const DEFAULT_ROOT: &str = "data/processed";

// -------------------------------------------------------------------------------------------------
// Technologies
// -------------------------------------------------------------------------------------------------

pub const WIFI: &str = "wifi";
pub const GNSS: &str = "gnss";
pub const BLE: &str = "ble";
pub const UWB: &str = "uwb";
pub const NR5G: &str = "nr5g";

/// All technologies recorded during a campaign, in the default dataset order.
pub const KNOWN_TECHNOLOGIES: [&str; 5] = [WIFI, GNSS, BLE, UWB, NR5G];

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Epoch timestamp in milliseconds.
pub type Timestamp = i64;

/// 0-based row offset inside a technology table whose rows were reset to `0..N-1`.
pub type Position = usize;

/// Name of a positioning technology (`"wifi"`, `"uwb"`, ...).
pub type Technology = String;

/// Hash map using [`ahash`](https://docs.rs/ahash) for fast hashing.
pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

/// Name of the merged-index column holding the handles of `technology`.
///
/// ```
/// assert_eq!(multipos::constants::index_column("uwb"), "idx_uwb");
/// ```
pub fn index_column(technology: &str) -> String {
    format!("{INDEX_COLUMN_PREFIX}{technology}")
}
