//! # Table loaders
//!
//! The merge and the dataset never open files themselves: they ask a [`TableLoader`] for the
//! table of a technology by name. Three loaders cover the ways a table can be located.
//!
//! | Loader | Used by | Unknown name | Missing artifact |
//! |---|---|---|---|
//! | [`SourceRegistry`] | merge | `UnknownSystem` | `SourceNotFound` (fatal) |
//! | [`StoredTables`] | dataset | empty table | empty table (tolerant) |
//! | [`InMemoryTables`] | tests, in-process pipelines | `UnknownSystem` | n/a |
//!
//! A merge against a partially written campaign would desynchronize handles from data, so the
//! registry aborts. A dataset opened over an index built for fewer technologies keeps working
//! and reports "no reading" for the others.
//!
//! ## Example
//! -----------------
//! ```no_run
//! use multipos::tables::table_file::{SourceRegistry, TableLoader};
//!
//! # fn demo() -> Result<(), multipos::multipos_errors::MultiposError> {
//! let sources = SourceRegistry::new()
//!     .with_source("wifi", "data/processed/binary/wifi.arrow")
//!     .with_source("uwb", "data/processed/parquet/uwb.parquet");
//!
//! let wifi = sources.load("wifi")?;
//! println!("{} wifi rows", wifi.num_rows());
//! # Ok(()) }
//! ```
use arrow_array::RecordBatch;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::constants::{FastHashMap, POINT_ID_COLUMN, TIMESTAMP_COLUMN};
use crate::multipos_errors::MultiposError;

use super::parquet_io::read_parquet_columns;
use super::{empty_table, load_table, Encoding, StorageLayout};

/// Source of per-technology tables.
pub trait TableLoader {
    /// Load the full table of `technology`, rows in canonical `0..N-1` order.
    fn load(&self, technology: &str) -> Result<RecordBatch, MultiposError>;

    /// Load a table holding at least the `ts` and `point_id` columns of `technology`, in the
    /// same row order as [`load`](TableLoader::load).
    ///
    /// The merge only needs the key columns, so loaders able to project columns on read
    /// override this to skip the payload.
    fn load_keys(&self, technology: &str) -> Result<RecordBatch, MultiposError> {
        self.load(technology)
    }
}

/// Technology name → location of its processed table.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: FastHashMap<String, Utf8PathBuf>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the location of `technology`, builder style.
    pub fn with_source(mut self, technology: &str, location: impl Into<Utf8PathBuf>) -> Self {
        self.insert(technology, location);
        self
    }

    pub fn insert(&mut self, technology: &str, location: impl Into<Utf8PathBuf>) {
        self.sources.insert(technology.to_string(), location.into());
    }

    pub fn get(&self, technology: &str) -> Option<&Utf8Path> {
        self.sources.get(technology).map(Utf8PathBuf::as_path)
    }

    pub fn contains(&self, technology: &str) -> bool {
        self.sources.contains_key(technology)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Registry pointing every technology at its artifact under a campaign root.
    pub fn from_layout<'a>(
        layout: &StorageLayout,
        technologies: impl IntoIterator<Item = &'a str>,
        encoding: Encoding,
    ) -> Self {
        let mut registry = Self::new();
        for technology in technologies {
            registry.insert(technology, layout.table_path(technology, encoding));
        }
        registry
    }

    /// Resolve the location of `technology` and check that it exists.
    fn resolve(&self, technology: &str) -> Result<&Utf8Path, MultiposError> {
        let location = self
            .get(technology)
            .ok_or_else(|| MultiposError::UnknownSystem(technology.to_string()))?;
        if !location.is_file() {
            return Err(MultiposError::SourceNotFound {
                technology: technology.to_string(),
                location: location.to_string(),
            });
        }
        Ok(location)
    }
}

impl TableLoader for SourceRegistry {
    fn load(&self, technology: &str) -> Result<RecordBatch, MultiposError> {
        load_table(self.resolve(technology)?)
    }

    fn load_keys(&self, technology: &str) -> Result<RecordBatch, MultiposError> {
        let location = self.resolve(technology)?;
        match Encoding::from_table_path(location)? {
            Encoding::Parquet => {
                read_parquet_columns(location, technology, &[TIMESTAMP_COLUMN, POINT_ID_COLUMN])
            }
            _ => load_table(location),
        }
    }
}

/// Tables stored under a campaign root, as read back by a dataset.
///
/// The canonical binary artifact is preferred; the artifact of the configured encoding is the
/// fallback. A technology with neither loads as [`empty_table`].
#[derive(Debug, Clone)]
pub struct StoredTables {
    layout: StorageLayout,
    encoding: Encoding,
}

impl StoredTables {
    pub fn new(layout: StorageLayout, encoding: Encoding) -> Self {
        Self { layout, encoding }
    }

    /// First existing artifact of `technology`, if any.
    pub fn locate(&self, technology: &str) -> Option<Utf8PathBuf> {
        [Encoding::Binary, self.encoding]
            .into_iter()
            .map(|encoding| self.layout.table_path(technology, encoding))
            .find(|path| path.is_file())
    }
}

impl TableLoader for StoredTables {
    fn load(&self, technology: &str) -> Result<RecordBatch, MultiposError> {
        match self.locate(technology) {
            Some(path) => load_table(&path),
            None => {
                debug!(
                    technology,
                    root = %self.layout.root(),
                    "no stored table, every reading resolves to absent"
                );
                Ok(empty_table())
            }
        }
    }
}

/// Tables already held in memory, keyed by technology.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTables {
    tables: FastHashMap<String, RecordBatch>,
}

impl InMemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, technology: &str, table: RecordBatch) -> Self {
        self.insert(technology, table);
        self
    }

    pub fn insert(&mut self, technology: &str, table: RecordBatch) {
        self.tables.insert(technology.to_string(), table);
    }
}

impl TableLoader for InMemoryTables {
    fn load(&self, technology: &str) -> Result<RecordBatch, MultiposError> {
        self.tables
            .get(technology)
            .cloned()
            .ok_or_else(|| MultiposError::UnknownSystem(technology.to_string()))
    }
}
