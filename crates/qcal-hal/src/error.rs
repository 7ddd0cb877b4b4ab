//! Error types for the HAL crate.

use thiserror::Error;

/// Errors reported by the compiler and hardware collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HalError {
    /// The experiment could not be compiled into a program.
    #[error("Compilation failed: {0}")]
    Compilation(String),

    /// The device snapshot lacks something the compiler needs.
    #[error("Invalid device configuration: {0}")]
    InvalidDevice(String),

    /// A driver call was made out of order.
    #[error("Driver not prepared: {0}")]
    NotPrepared(String),

    /// The instrument reported an error.
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Timeout waiting for the hardware to finish.
    #[error("Timeout waiting for hardware after {0:?}")]
    Timeout(std::time::Duration),

    /// Acquired data could not be retrieved.
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for HAL operations.
pub type HalResult<T> = Result<T, HalError>;
