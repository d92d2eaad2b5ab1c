//! # multipos
//!
//! Cross-technology alignment of indoor/outdoor positioning measurements (WiFi, GNSS, BLE,
//! UWB, 5G) recorded during one measurement campaign.
//!
//! Each technology is preprocessed into its own table keyed by `(ts, point_id)`. The crate
//! builds a **merged index** holding, per epoch, row handles into every technology table,
//! and a **dataset** that walks the index and materializes the matching rows.
//!
//! ```rust,no_run
//! use camino::Utf8Path;
//! use multipos::dataset::{Dataset, DatasetConfig};
//! use multipos::merge::data_merge;
//! use multipos::tables::{table_file::SourceRegistry, Encoding, StorageLayout};
//!
//! # fn demo() -> Result<(), multipos::multipos_errors::MultiposError> {
//! let root = Utf8Path::new("data/processed");
//! let technologies = ["wifi", "uwb"];
//! let sources = SourceRegistry::from_layout(&StorageLayout::new(root), technologies, Encoding::Binary);
//! data_merge(&technologies, &sources, root)?;
//!
//! let dataset = Dataset::new(&DatasetConfig::builder().root(root).technologies(technologies).build()?)?;
//! for record in &dataset {
//!     println!("{} {}: {:?}", record.timestamp, record.point_id, record.present().collect::<Vec<_>>());
//! }
//! # Ok(()) }
//! ```
pub mod constants;
pub mod dataset;
pub mod merge;
pub mod multipos_errors;
pub mod pipeline;
pub mod reference;
pub mod tables;

pub use dataset::{Dataset, DatasetConfig, EpochRecord, TechnologyMatch};
pub use merge::{data_merge, IndexCell, MergedIndex};
pub use multipos_errors::MultiposError;
pub use tables::Encoding;
