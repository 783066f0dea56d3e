//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole panel core.
//! Using the `thiserror` crate, it gives every controller the same vocabulary for
//! reporting failures back to the presentation layer:
//!
//! - **`DriverCommunication`**: a read or write to a device failed. The core never retries
//!   these on its own; the status surface is updated and the caller decides.
//! - **`NotStabilized`**: an acquisition was requested before the cooling gate opened.
//! - **`InvalidInput`**: a move target that is not a finite number, or a bad step request.
//! - **`AcquisitionFailed`**: some step of the acquisition sequence failed; the whole
//!   sequence is void and must be restarted from the top.
//! - **`Config`** / **`Configuration`**: loading or semantic validation of settings failed.
//!
//! None of these are fatal to the process. Every controller stays in a retryable state
//! after returning one.

use thiserror::Error;

use crate::camera::AcquisitionStep;
use crate::hardware::DriverError;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// The primary error type for the panel core.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Settings could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Settings loaded but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A device read or write failed.
    #[error("Driver communication error: {0}")]
    DriverCommunication(String),

    /// Acquisition requested before the cooling gate opened.
    #[error("Temperature not stabilized; acquisition is not allowed yet")]
    NotStabilized,

    /// The cooler was already enabled for the current cycle.
    #[error("Cooler is already enabled for this cycle")]
    CoolerAlreadyEnabled,

    /// A user-supplied value was rejected before reaching a driver.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A step of the acquisition sequence failed; the sequence is void.
    #[error("Acquisition failed at {step}: {reason}")]
    AcquisitionFailed {
        /// The step that failed
        step: AcquisitionStep,
        /// Driver error or unexpected result code
        reason: String,
    },

    /// A spawned task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    TaskJoin(String),

    /// One or more errors occurred while shutting down.
    #[error("Shutdown failed with errors")]
    ShutdownFailed(Vec<DaqError>),
}

impl From<DriverError> for DaqError {
    fn from(err: DriverError) -> Self {
        DaqError::DriverCommunication(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DaqError {
    fn from(err: tokio::task::JoinError) -> Self {
        DaqError::TaskJoin(err.to_string())
    }
}
