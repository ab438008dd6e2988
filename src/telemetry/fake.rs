//! Scripted in-memory telemetry backend for tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::telemetry::traits::*;

/// Ordered record of lifecycle calls ("init", "open:0", "release:0", "shutdown")
pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

/// Queue of scripted reads; `None` is a failed read
pub(crate) type Script = Arc<Mutex<VecDeque<Option<MetricsSnapshot>>>>;

pub(crate) struct FakeDevice {
    name: String,
    openable: bool,
    script: Script,
}

impl FakeDevice {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            openable: true,
            script: Arc::default(),
        }
    }

    pub(crate) fn unopenable(mut self) -> Self {
        self.openable = false;
        self
    }

    /// Handle for pushing readings after the backend has been boxed
    pub(crate) fn script(&self) -> Script {
        self.script.clone()
    }
}

pub(crate) struct FakeBackend {
    devices: Vec<FakeDevice>,
    fail_init: bool,
    events: EventLog,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            devices: Vec::new(),
            fail_init: false,
            events: EventLog::default(),
        }
    }

    /// Backend whose library never loads
    pub(crate) fn failing() -> Self {
        Self {
            fail_init: true,
            ..Self::new()
        }
    }

    pub(crate) fn with_device(mut self, device: FakeDevice) -> Self {
        self.devices.push(device);
        self
    }

    pub(crate) fn events(&self) -> EventLog {
        self.events.clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl TelemetryBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn initialize(&mut self) -> Result<()> {
        if self.fail_init {
            return Err(Error::InitializationFailed("library not found".to_string()));
        }
        self.record("init".to_string());
        Ok(())
    }

    fn device_count(&self) -> Result<u32> {
        Ok(self.devices.len() as u32)
    }

    fn open_device(&self, index: u32) -> Result<Box<dyn DeviceHandle>> {
        let device = self
            .devices
            .get(index as usize)
            .filter(|d| d.openable)
            .ok_or_else(|| Error::device_unavailable(index, "not found"))?;

        self.record(format!("open:{}", index));
        Ok(Box::new(FakeHandle {
            index,
            name: device.name.clone(),
            script: device.script.clone(),
            events: self.events.clone(),
        }))
    }

    fn shutdown(&mut self) -> Result<()> {
        self.record("shutdown".to_string());
        Ok(())
    }
}

struct FakeHandle {
    index: u32,
    name: String,
    script: Script,
    events: EventLog,
}

impl DeviceHandle for FakeHandle {
    fn index(&self) -> u32 {
        self.index
    }

    fn read_snapshot(&self) -> Result<MetricsSnapshot> {
        match self.script.lock().unwrap().pop_front() {
            Some(Some(snapshot)) => Ok(snapshot),
            Some(None) => Err(Error::read_failed(self.index, "GPU is lost")),
            None => Err(Error::read_failed(self.index, "no scripted reading")),
        }
    }

    fn identity(&self) -> Result<DeviceIdentity> {
        Ok(DeviceIdentity {
            index: self.index,
            name: self.name.clone(),
            uuid: format!("GPU-fake-{}", self.index),
            memory_total: 24 * 1024 * 1024 * 1024,
            driver_version: "550.54.14".to_string(),
            cuda_version: format_cuda_version(12040),
            pci_bus_id: format!("00000000:{:02X}:00.0", self.index + 1),
        })
    }

    fn release(self: Box<Self>) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("release:{}", self.index));
        Ok(())
    }
}
