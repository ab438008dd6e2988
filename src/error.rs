//! Error types for nvsonar

use std::io;
use thiserror::Error;

/// Result type alias for nvsonar operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
///
/// None of these are process-fatal inside the library: the sampler turns them
/// into skipped devices or skipped ticks. Only the binary decides to exit.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// NVML error (NVIDIA GPUs)
    #[cfg(feature = "nvidia")]
    #[error("NVML error: {0}")]
    Nvml(#[from] nvml_wrapper::error::NvmlError),

    /// Telemetry library failed to load
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Telemetry context used before `initialize` (or after `shutdown`)
    #[error("Telemetry library not initialized")]
    NotInitialized,

    /// A specific device index could not be opened
    #[error("Device {index} unavailable: {reason}")]
    DeviceUnavailable { index: u32, reason: String },

    /// A snapshot or identity read failed
    #[error("Failed to read device {index}: {reason}")]
    ReadFailed { index: u32, reason: String },

    /// No usable device was found
    #[error("No GPU devices found")]
    NoDevicesFound,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a failed read on `index`
    pub fn read_failed(index: u32, reason: impl ToString) -> Self {
        Error::ReadFailed {
            index,
            reason: reason.to_string(),
        }
    }

    /// Shorthand for an unavailable device
    pub fn device_unavailable(index: u32, reason: impl ToString) -> Self {
        Error::DeviceUnavailable {
            index,
            reason: reason.to_string(),
        }
    }
}
