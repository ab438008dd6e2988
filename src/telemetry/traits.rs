//! Unified traits and types for GPU telemetry
//!
//! This module defines the narrow interface every telemetry backend
//! implements. The sampler only ever talks to these traits, so the NVML
//! binding and the in-memory test backend are interchangeable.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One hardware read at one instant
///
/// Optional fields are `None` when the device does not report them; that is
/// reduced fidelity, not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// GPU core temperature in Celsius
    pub temperature: f32,
    /// Current power draw in Watts
    pub power_draw: Option<f32>,
    /// Enforced power limit in Watts
    pub power_limit: Option<f32>,
    /// Fan speed (0-100%)
    pub fan_speed: Option<u32>,
    /// Compute (SM) utilization (0-100%)
    pub compute_utilization: u32,
    /// Memory controller utilization (0-100%)
    pub memory_utilization: u32,
    /// Used memory in bytes
    pub memory_used: u64,
    /// Total memory in bytes
    pub memory_total: u64,
    /// Graphics/core clock in MHz
    pub core_clock: u32,
    /// Memory clock in MHz
    pub memory_clock: u32,
}

impl MetricsSnapshot {
    /// Used memory as a percentage of total
    pub fn memory_used_percent(&self) -> f32 {
        if self.memory_total == 0 {
            0.0
        } else {
            (self.memory_used as f64 / self.memory_total as f64 * 100.0) as f32
        }
    }
}

/// Static identity of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub index: u32,
    /// Marketing name (e.g. "NVIDIA GeForce RTX 4090")
    pub name: String,
    pub uuid: String,
    /// Total memory in bytes
    pub memory_total: u64,
    pub driver_version: String,
    /// CUDA driver version as "major.minor"
    pub cuda_version: String,
    /// PCI bus id, e.g. "00000000:01:00.0"
    pub pci_bus_id: String,
}

/// Format the driver's integer CUDA version (e.g. 12040) as "12.4"
pub fn format_cuda_version(version: i32) -> String {
    format!("{}.{}", version / 1000, (version % 1000) / 10)
}

/// A vendor telemetry library (NVML or equivalent)
pub trait TelemetryBackend: Send {
    /// Short backend name for logs (e.g. "NVML")
    fn name(&self) -> &'static str;

    /// Load and initialize the library
    fn initialize(&mut self) -> Result<()>;

    /// Number of devices the library reports
    fn device_count(&self) -> Result<u32>;

    /// Acquire a handle for the device at `index`
    fn open_device(&self, index: u32) -> Result<Box<dyn DeviceHandle>>;

    /// Release the library. Called once, after every handle has been released.
    fn shutdown(&mut self) -> Result<()>;
}

/// A live handle to one device
pub trait DeviceHandle: Send {
    /// Device index (0-based)
    fn index(&self) -> u32;

    /// Read one metrics snapshot
    fn read_snapshot(&self) -> Result<MetricsSnapshot>;

    /// Read the device identity
    fn identity(&self) -> Result<DeviceIdentity>;

    /// Release the handle
    fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
