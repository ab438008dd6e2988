//! Explicitly owned telemetry library lifecycle
//!
//! A `TelemetryContext` wraps one backend and tracks whether it has been
//! initialized. There is no process-wide state: whoever owns the context
//! controls `initialize` and `shutdown`.

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::telemetry::nvidia::NvidiaBackend;
use crate::telemetry::traits::{DeviceHandle, DeviceIdentity, TelemetryBackend};

/// Lifecycle state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// `initialize` not called yet (or it failed)
    Uninitialized,
    /// Library loaded
    Active,
    /// `shutdown` called; not resumable
    Stopped,
}

/// Owner of a telemetry backend and its init/shutdown lifecycle
pub struct TelemetryContext {
    backend: Box<dyn TelemetryBackend>,
    state: ContextState,
}

impl TelemetryContext {
    /// Wrap a backend without initializing it
    pub fn new(backend: Box<dyn TelemetryBackend>) -> Self {
        Self {
            backend,
            state: ContextState::Uninitialized,
        }
    }

    /// Context over the NVML backend
    pub fn nvidia() -> Self {
        Self::new(Box::new(NvidiaBackend::new()))
    }

    /// Current lifecycle state
    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == ContextState::Active
    }

    /// Initialize the library. Idempotent; returns `false` on failure.
    pub fn initialize(&mut self) -> bool {
        match self.state {
            ContextState::Active => true,
            ContextState::Stopped => false,
            ContextState::Uninitialized => match self.backend.initialize() {
                Ok(()) => {
                    info!("{} initialized", self.backend.name());
                    self.state = ContextState::Active;
                    true
                }
                Err(e) => {
                    warn!("{} unavailable: {}", self.backend.name(), e);
                    false
                }
            },
        }
    }

    /// Number of devices; 0 when the library is not initialized or the query fails
    pub fn device_count(&self) -> u32 {
        if !self.is_initialized() {
            return 0;
        }

        self.backend.device_count().unwrap_or_else(|e| {
            warn!("Failed to get device count: {}", e);
            0
        })
    }

    /// Acquire a handle for one device
    pub fn open_device(&self, index: u32) -> Result<Box<dyn DeviceHandle>> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        self.backend.open_device(index)
    }

    /// Identity of one device, or `None` if it cannot be opened or read
    pub fn device_identity(&self, index: u32) -> Option<DeviceIdentity> {
        let handle = self.open_device(index).ok()?;
        let identity = handle.identity();
        if let Err(e) = handle.release() {
            debug!("Failed to release device {}: {}", index, e);
        }
        identity.ok()
    }

    /// Identities of every device that can be opened and read
    pub fn list_devices(&self) -> Vec<DeviceIdentity> {
        (0..self.device_count())
            .filter_map(|i| self.device_identity(i))
            .collect()
    }

    /// Release the library. Best-effort: failures are logged, never returned.
    pub fn shutdown(&mut self) {
        if self.state == ContextState::Active {
            if let Err(e) = self.backend.shutdown() {
                warn!("Failed to shut down {}: {}", self.backend.name(), e);
            }
        }
        self.state = ContextState::Stopped;
    }
}

impl Default for TelemetryContext {
    fn default() -> Self {
        Self::nvidia()
    }
}

impl Drop for TelemetryContext {
    fn drop(&mut self) {
        if self.state == ContextState::Active {
            self.shutdown();
        }
    }
}
