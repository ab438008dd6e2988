//! # nvsonar
//!
//! Active GPU diagnostics: polls device telemetry at a fixed cadence, keeps a
//! rolling window of analyzed snapshots per device, and classifies each
//! snapshot into a bottleneck category (compute, memory, thermal, power,
//! balanced, idle).
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Instant;
//! use nvsonar::{Config, Sampler, TelemetryContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let mut sampler = Sampler::start(TelemetryContext::nvidia(), config.sampler_config());
//!
//! sampler.tick_all(Instant::now());
//! for session in sampler.sessions() {
//!     if let Some((metrics, analysis)) = session.current_view() {
//!         println!("GPU {}: {}°C, {}", session.index(), metrics.temperature, analysis);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `nvidia` - NVIDIA GPU support via NVML (requires the NVIDIA driver)
//! - `cli` - Command-line interface and TUI
//! - `full` - All features enabled

pub mod analyzer; // Rule-based bottleneck classification
pub mod baseline; // Thermal baselines per GPU model
pub mod config; // Configuration management with TOML persistence
pub mod error;
pub mod history; // Windowed history and peak extraction
pub mod sampler; // Per-device sampling sessions
pub mod telemetry; // Telemetry backends (NVML)

#[cfg(feature = "cli")]
pub mod tui; // Terminal UI

pub use analyzer::{classify, Analysis, Analyzer, Bottleneck};
pub use baseline::Baseline;
pub use config::{Config, DeviceConfig, GeneralConfig, ThermalConfig};
pub use error::{Error, Result};
pub use history::{HistoryRecord, MetricsHistory, PeakSet, DEFAULT_PEAK_WINDOW};
pub use sampler::{DeviceSession, Sampler, SamplerConfig, TickReport, DEFAULT_UPDATE_INTERVAL};
pub use telemetry::{
    DeviceHandle, DeviceIdentity, MetricsSnapshot, TelemetryBackend, TelemetryContext,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
