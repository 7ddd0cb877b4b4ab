//! Error types for sweep orchestration.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use qcal_core::SamplespaceError;
use qcal_hal::HalError;
use qcal_store::StoreError;
use thiserror::Error;

use crate::dataset::AssembledDataset;

/// Boxed error returned by node hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for sweep stages.
pub type SweepResult<T> = Result<T, SweepError>;

/// Result type for dataset assembly.
pub type AssemblyResult<T> = Result<T, AssemblyError>;

/// Result type for dataset persistence.
pub type PersistResult<T> = Result<T, PersistError>;

/// Errors raised by a single stage of a node run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SweepError {
    /// A prerequisite parameter is missing or awaiting recalibration.
    #[error("Prerequisite '{field}' on {element} is not calibrated")]
    PrerequisiteMissing { element: String, field: String },

    /// The hardware returned a different set of acquisitions than declared.
    #[error("Acquisition mismatch: program declared {expected:?}, hardware returned {found:?}")]
    AcquisitionMismatch {
        expected: BTreeSet<u32>,
        found: BTreeSet<u32>,
    },

    /// The hardware did not finish within the allowed time.
    #[error("Hardware did not finish within {0:?}")]
    HardwareTimeout(Duration),

    /// A node hook returned an error.
    #[error("{hook} hook failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: HookError,
    },

    /// The experiment compiler failed.
    #[error("Compiler error: {0}")]
    Compiler(#[source] HalError),

    /// The hardware driver failed.
    #[error("Hardware error: {0}")]
    Hardware(#[source] HalError),

    /// Raw data could not be shaped into a dataset.
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// The node's samplespaces are inconsistent.
    #[error("Samplespace error: {0}")]
    Samplespace(#[from] SamplespaceError),

    /// The parameter store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A dataset or snapshot could not be written.
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

impl SweepError {
    /// Wrap an error returned by a node hook.
    pub fn hook(hook: &'static str, error: anyhow::Error) -> Self {
        SweepError::Hook {
            hook,
            source: error.into(),
        }
    }
}

/// Errors raised while shaping raw results into labeled arrays.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AssemblyError {
    /// The raw result has no buffer for a declared acquisition.
    #[error("No data for acquisition {index} ({element})")]
    MissingAcquisition { index: u32, element: String },

    /// The buffer size does not match the swept dimensions.
    #[error("Shape mismatch for {element}: expected {expected} values, found {found}")]
    ShapeMismatch {
        element: String,
        expected: usize,
        found: usize,
    },

    /// Axis lengths disagree with the data shape.
    #[error("Axis lengths {axes:?} do not match data shape {data:?}")]
    AxisLengths { axes: Vec<usize>, data: Vec<usize> },

    /// `shots` and `loop_repetitions` were both requested.
    #[error("Reshape hints set both shots ({shots}) and loop repetitions ({loop_repetitions})")]
    ConflictingHints {
        shots: usize,
        loop_repetitions: usize,
    },

    /// Two datasets cannot be joined.
    #[error("Cannot merge datasets for {element}: {reason}")]
    MergeMismatch { element: String, reason: String },

    /// Samplespace invariant violated.
    #[error(transparent)]
    Samplespace(#[from] SamplespaceError),

    /// ndarray shape error.
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Errors raised while writing or reading dataset files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistError {
    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5Error(#[from] hdf5::Error),

    /// The file is not a dataset this build can read.
    #[error("Unsupported dataset file: {0}")]
    UnsupportedFormat(PathBuf),

    /// The file contents are inconsistent.
    #[error("Corrupt dataset file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// A node run that stopped before completing.
///
/// Carries whatever was measured before the failure so the caller can
/// inspect or persist it.
#[derive(Debug, Error)]
#[error(
    "Node '{node}' failed at iteration {iteration}: {source} (last dataset: {})",
    display_path(.last_dataset)
)]
pub struct NodeFailed {
    /// Node name.
    pub node: String,
    /// Iteration during which the failure occurred. Analysis failures report
    /// the last iteration.
    pub iteration: usize,
    /// The stage error.
    #[source]
    pub source: SweepError,
    /// Merged data of every iteration that completed.
    pub partial: Option<AssembledDataset>,
    /// Path of the last dataset written to disk.
    pub last_dataset: Option<PathBuf>,
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "none".to_string(),
    }
}
