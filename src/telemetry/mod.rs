//! GPU telemetry sources
//!
//! One abstraction over the vendor library: a [`TelemetryBackend`] opens
//! [`DeviceHandle`]s, and a [`TelemetryContext`] owns the backend's
//! initialize/shutdown lifecycle.

pub mod context;
pub mod nvidia;
pub mod traits;

#[cfg(test)]
pub(crate) mod fake;

pub use context::{ContextState, TelemetryContext};
pub use nvidia::NvidiaBackend;
pub use traits::{
    format_cuda_version, DeviceHandle, DeviceIdentity, MetricsSnapshot, TelemetryBackend,
};
