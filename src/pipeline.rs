//! # Preprocessing pipeline
//!
//! Run the per-technology preprocessing jobs of a campaign in parallel, wait for all of them,
//! then merge their outputs.
//!
//! ## Overview
//! -----------------
//! * Each technology is converted from its raw logs into a processed table by a
//!   [`Preprocessor`]. Jobs share nothing and run on a fixed-size `rayon` pool.
//! * The pool is a barrier: [`run_preprocessing`] returns only once every job has finished,
//!   with one outcome per job in a [`PreprocessReport`]. A job that fails (or panics) does
//!   not stop its siblings; its error is kept for the report.
//! * [`run_pipeline`] refuses to merge as soon as one requested technology has no usable
//!   table, naming the first such technology in request order.
//!
//! ```rust,no_run
//! use camino::Utf8Path;
//! use multipos::pipeline::{run_pipeline, PipelineConfig, Preprocessor, TaskFn};
//!
//! # fn demo() -> Result<(), multipos::multipos_errors::MultiposError> {
//! let config = PipelineConfig::from_json_file(Utf8Path::new("pipeline.json"))?;
//! let tasks: Vec<Box<dyn Preprocessor>> = vec![
//!     Box::new(TaskFn::new("uwb", || Ok("data/processed/binary/uwb.arrow".into()))),
//! ];
//! let index = run_pipeline(&tasks, &config)?;
//! # Ok(()) }
//! ```
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{info, warn};

use crate::constants::{Technology, DEFAULT_ROOT, KNOWN_TECHNOLOGIES};
use crate::merge::{data_merge, MergedIndex};
use crate::multipos_errors::MultiposError;
use crate::tables::table_file::SourceRegistry;
use crate::tables::{Encoding, StorageLayout};

/// Conversion of one technology's raw logs into its processed table.
pub trait Preprocessor: Send + Sync {
    fn technology(&self) -> &str;

    /// Produce the processed table and return its location.
    fn run(&self) -> Result<Utf8PathBuf, MultiposError>;
}

/// A [`Preprocessor`] backed by a closure.
pub struct TaskFn<F> {
    technology: Technology,
    job: F,
}

impl<F> TaskFn<F>
where
    F: Fn() -> Result<Utf8PathBuf, MultiposError> + Send + Sync,
{
    pub fn new(technology: &str, job: F) -> Self {
        Self {
            technology: technology.to_string(),
            job,
        }
    }
}

impl<F> Preprocessor for TaskFn<F>
where
    F: Fn() -> Result<Utf8PathBuf, MultiposError> + Send + Sync,
{
    fn technology(&self) -> &str {
        &self.technology
    }

    fn run(&self) -> Result<Utf8PathBuf, MultiposError> {
        (self.job)()
    }
}

/// Outcome of every preprocessing job, in submission order.
#[derive(Debug)]
pub struct PreprocessReport {
    outcomes: Vec<(Technology, Result<Utf8PathBuf, MultiposError>)>,
}

impl PreprocessReport {
    pub fn outcomes(&self) -> &[(Technology, Result<Utf8PathBuf, MultiposError>)] {
        &self.outcomes
    }

    pub fn outcome(&self, technology: &str) -> Option<&Result<Utf8PathBuf, MultiposError>> {
        self.outcomes
            .iter()
            .find(|(t, _)| t == technology)
            .map(|(_, outcome)| outcome)
    }

    /// Technologies whose job produced a table.
    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &Utf8Path)> + '_ {
        self.outcomes
            .iter()
            .filter_map(|(t, outcome)| outcome.as_ref().ok().map(|p| (t.as_str(), p.as_path())))
    }

    /// Technologies whose job failed, with the error.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &MultiposError)> + '_ {
        self.outcomes
            .iter()
            .filter_map(|(t, outcome)| outcome.as_ref().err().map(|e| (t.as_str(), e)))
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Location of every produced table.
    pub fn into_sources(self) -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        for (technology, outcome) in self.outcomes {
            if let Ok(path) = outcome {
                registry.insert(&technology, path);
            }
        }
        registry
    }
}

impl fmt::Display for PreprocessReport {
    /// Compact by default; one line per job when using the alternate flag (`{:#}`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Preprocessing report")?;
            write!(f, "--------------------")?;
            for (technology, outcome) in &self.outcomes {
                match outcome {
                    Ok(path) => write!(f, "\n{technology:<8} ok     {path}")?,
                    Err(error) => write!(f, "\n{technology:<8} failed {error}")?,
                }
            }
            Ok(())
        } else {
            write!(
                f,
                "succeeded=[{}], failed=[{}]",
                self.succeeded().map(|(t, _)| t).join(", "),
                self.failed().map(|(t, _)| t).join(", ")
            )
        }
    }
}

/// Run every job on a pool of `workers` threads and wait for all of them.
///
/// Arguments
/// -----------------
/// * `tasks`: One job per technology.
/// * `workers`: Pool size. Clamped to the number of jobs.
///
/// Return
/// ----------
/// * The [`PreprocessReport`], once every job has returned. A job that returns an error or
///   panics is recorded as failed ([`MultiposError::PreprocessingFailed`] for panics).
/// * [`MultiposError::InvalidConfig`] if `workers` is zero,
///   [`MultiposError::ThreadPoolError`] if the pool cannot be built.
pub fn run_preprocessing(
    tasks: &[Box<dyn Preprocessor>],
    workers: usize,
) -> Result<PreprocessReport, MultiposError> {
    if workers == 0 {
        return Err(MultiposError::InvalidConfig(
            "at least one preprocessing worker is required".into(),
        ));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.min(tasks.len()).max(1))
        .thread_name(|i| format!("multipos-preprocess-{i}"))
        .build()?;

    let outcomes: Vec<_> = pool.install(|| {
        tasks
            .par_iter()
            .map(|task| (task.technology().to_string(), run_task(task.as_ref())))
            .collect()
    });

    for (technology, outcome) in &outcomes {
        match outcome {
            Ok(path) => info!(technology = %technology, path = %path, "preprocessing finished"),
            Err(error) => warn!(technology = %technology, %error, "preprocessing failed"),
        }
    }

    Ok(PreprocessReport { outcomes })
}

fn run_task(task: &dyn Preprocessor) -> Result<Utf8PathBuf, MultiposError> {
    match catch_unwind(AssertUnwindSafe(|| task.run())) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            Err(MultiposError::PreprocessingFailed {
                technology: task.technology().to_string(),
                reason,
            })
        }
    }
}

/// Parameters of a full preprocessing + merge run.
///
/// ```json
/// {
///   "root": "data/processed",
///   "technologies": ["wifi", "ble", "uwb"],
///   "workers": 3,
///   "sources": { "wifi": "data/processed/binary/wifi.arrow" }
/// }
/// ```
///
/// Every field is optional. `sources` gives the table of technologies that have no
/// preprocessing job in the run; other technologies default to their binary artifact under
/// `root`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub root: Utf8PathBuf,
    pub technologies: Vec<Technology>,
    pub workers: usize,
    pub sources: BTreeMap<Technology, Utf8PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from(DEFAULT_ROOT),
            technologies: KNOWN_TECHNOLOGIES.iter().map(|t| t.to_string()).collect(),
            workers: KNOWN_TECHNOLOGIES.len(),
            sources: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Read and validate a configuration from a JSON file.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, MultiposError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MultiposError> {
        if self.workers == 0 {
            return Err(MultiposError::InvalidConfig("workers must be > 0".into()));
        }
        if let Some(repeated) = self.technologies.iter().duplicates().next() {
            return Err(MultiposError::InvalidConfig(format!(
                "technology '{repeated}' listed more than once"
            )));
        }
        Ok(())
    }

    /// Where each requested technology's table is expected when no job produces it.
    fn default_sources(&self) -> SourceRegistry {
        let layout = StorageLayout::new(self.root.clone());
        let mut registry = SourceRegistry::from_layout(
            &layout,
            self.technologies.iter().map(String::as_str),
            Encoding::Binary,
        );
        for (technology, path) in &self.sources {
            registry.insert(technology, path.clone());
        }
        registry
    }
}

/// Preprocess, then merge the requested technologies under `config.root`.
///
/// Return
/// ----------
/// * The merged index written by [`data_merge`].
/// * [`MultiposError::SourceNotFound`] for the first requested technology (in
///   `config.technologies` order) whose job failed; nothing is merged in that case.
///
/// See also
/// ------------
/// * [`run_preprocessing`] – The worker pool alone.
pub fn run_pipeline(
    tasks: &[Box<dyn Preprocessor>],
    config: &PipelineConfig,
) -> Result<MergedIndex, MultiposError> {
    config.validate()?;
    let report = run_preprocessing(tasks, config.workers)?;
    info!(%report, "preprocessing barrier reached");

    let mut sources = config.default_sources();
    for technology in &config.technologies {
        match report.outcome(technology) {
            Some(Err(error)) => {
                let location = sources
                    .get(technology)
                    .map(Utf8Path::to_string)
                    .unwrap_or_default();
                warn!(technology = %technology, %error, "refusing to merge");
                return Err(MultiposError::SourceNotFound {
                    technology: technology.clone(),
                    location,
                });
            }
            Some(Ok(path)) => sources.insert(technology, path.clone()),
            None => {}
        }
    }

    data_merge(&config.technologies, &sources, &config.root)
}
