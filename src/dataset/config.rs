//! Construction parameters of a [`Dataset`](super::Dataset).
//!
//! ```rust,no_run
//! use multipos::dataset::{Dataset, DatasetConfig};
//!
//! # fn demo() -> Result<(), multipos::multipos_errors::MultiposError> {
//! let config = DatasetConfig::builder()
//!     .root("campaign/processed")
//!     .technologies(["uwb", "ble"])
//!     .encoding_name("binary")?
//!     .progress(true)
//!     .build()?;
//!
//! let dataset = Dataset::new(&config)?;
//! # Ok(()) }
//! ```
use camino::Utf8PathBuf;

use crate::constants::{Technology, DEFAULT_ROOT, KNOWN_TECHNOLOGIES};
use crate::multipos_errors::MultiposError;
use crate::tables::Encoding;

/// Where a dataset reads from and what it resolves.
///
/// Defaults: root `data/processed`, the five known technologies in the order
/// `wifi, gnss, ble, uwb, nr5g`, Parquet encoding, no progress bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    /// Campaign root holding the `csv/`, `parquet/` and `binary/` trees.
    pub root: Utf8PathBuf,
    /// Technologies resolved in every record, in record order.
    pub technologies: Vec<Technology>,
    /// Encoding of the merged index to read. Technology tables prefer the binary artifact.
    pub encoding: Encoding,
    /// Show a progress bar while iterating (requires the `progress` feature).
    pub progress: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from(DEFAULT_ROOT),
            technologies: KNOWN_TECHNOLOGIES.iter().map(|t| t.to_string()).collect(),
            encoding: Encoding::default(),
            progress: false,
        }
    }
}

impl DatasetConfig {
    pub fn builder() -> DatasetConfigBuilder {
        DatasetConfigBuilder::new()
    }
}

#[derive(Debug, Clone)]
pub struct DatasetConfigBuilder {
    config: DatasetConfig,
}

impl Default for DatasetConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetConfigBuilder {
    /// Create a new builder initialized with default values.
    pub fn new() -> Self {
        Self {
            config: DatasetConfig::default(),
        }
    }

    pub fn root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.config.root = root.into();
        self
    }

    pub fn technologies<I, S>(mut self, technologies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Technology>,
    {
        self.config.technologies = technologies.into_iter().map(Into::into).collect();
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    /// Select the encoding by name (`csv`, `parquet`, `binary`, or its alias `pickle`).
    ///
    /// Return
    /// ----------
    /// * The builder, or [`MultiposError::UnsupportedEncoding`] for any other name.
    pub fn encoding_name(mut self, name: &str) -> Result<Self, MultiposError> {
        self.config.encoding = name.parse()?;
        Ok(self)
    }

    pub fn progress(mut self, yes: bool) -> Self {
        self.config.progress = yes;
        self
    }

    /// Validate and return the configuration.
    ///
    /// Return
    /// ----------
    /// * [`MultiposError::InvalidConfig`] if the root is empty, a technology name is empty,
    ///   or a technology is listed twice.
    pub fn build(self) -> Result<DatasetConfig, MultiposError> {
        let c = &self.config;

        if c.root.as_str().trim().is_empty() {
            return Err(MultiposError::InvalidConfig(
                "dataset root must not be empty".into(),
            ));
        }
        if c.technologies.iter().any(|t| t.trim().is_empty()) {
            return Err(MultiposError::InvalidConfig(
                "technology names must not be empty".into(),
            ));
        }
        for (i, technology) in c.technologies.iter().enumerate() {
            if c.technologies[..i].contains(technology) {
                return Err(MultiposError::InvalidConfig(format!(
                    "technology '{technology}' listed more than once"
                )));
            }
        }

        Ok(self.config)
    }
}
