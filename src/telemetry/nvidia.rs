//! NVIDIA telemetry backend via NVML
//!
//! Required readings (temperature, utilization, memory, clocks) fail the
//! whole snapshot. Power draw, power limit and fan speed are optional and
//! collapse to `None` on any NVML error.

use crate::error::{Error, Result};
use crate::telemetry::traits::*;

#[cfg(feature = "nvidia")]
use nvml_wrapper::{
    enum_wrappers::device::{Clock, TemperatureSensor},
    Device as NvmlDevice, Nvml,
};

#[cfg(feature = "nvidia")]
use std::sync::Arc;

/// NVML library backend
#[derive(Default)]
pub struct NvidiaBackend {
    #[cfg(feature = "nvidia")]
    nvml: Option<Arc<Nvml>>,
}

impl NvidiaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "nvidia")]
    fn nvml(&self) -> Result<&Arc<Nvml>> {
        self.nvml.as_ref().ok_or(Error::NotInitialized)
    }
}

#[cfg(feature = "nvidia")]
impl TelemetryBackend for NvidiaBackend {
    fn name(&self) -> &'static str {
        "NVML"
    }

    fn initialize(&mut self) -> Result<()> {
        if self.nvml.is_some() {
            return Ok(());
        }

        let nvml = Nvml::init().map_err(|e| {
            Error::InitializationFailed(format!("Failed to initialize NVML: {}", e))
        })?;
        self.nvml = Some(Arc::new(nvml));
        Ok(())
    }

    fn device_count(&self) -> Result<u32> {
        Ok(self.nvml()?.device_count()?)
    }

    fn open_device(&self, index: u32) -> Result<Box<dyn DeviceHandle>> {
        Ok(Box::new(NvidiaDevice::open(self.nvml()?.clone(), index)?))
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(nvml) = self.nvml.take() else {
            return Ok(());
        };

        match Arc::try_unwrap(nvml) {
            Ok(nvml) => Ok(nvml.shutdown()?),
            Err(_) => Err(Error::InitializationFailed(
                "NVML still referenced by open device handles".to_string(),
            )),
        }
    }
}

#[cfg(not(feature = "nvidia"))]
impl TelemetryBackend for NvidiaBackend {
    fn name(&self) -> &'static str {
        "NVML"
    }

    fn initialize(&mut self) -> Result<()> {
        Err(Error::InitializationFailed(
            "NVIDIA support not compiled in".to_string(),
        ))
    }

    fn device_count(&self) -> Result<u32> {
        Err(Error::NotInitialized)
    }

    fn open_device(&self, index: u32) -> Result<Box<dyn DeviceHandle>> {
        Err(Error::device_unavailable(
            index,
            "NVIDIA support not compiled in",
        ))
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// NVIDIA GPU device handle
#[cfg(feature = "nvidia")]
pub struct NvidiaDevice {
    index: u32,
    // Declared before `nvml` so it is dropped first.
    device: NvmlDevice<'static>,
    nvml: Arc<Nvml>,
}

#[cfg(feature = "nvidia")]
impl NvidiaDevice {
    fn open(nvml: Arc<Nvml>, index: u32) -> Result<Self> {
        let device = nvml
            .device_by_index(index)
            .map_err(|e| Error::device_unavailable(index, e))?;

        // Safety: the NVML instance is kept alive by the Arc held in this struct
        let device = unsafe { std::mem::transmute::<NvmlDevice<'_>, NvmlDevice<'static>>(device) };

        Ok(Self {
            index,
            device,
            nvml,
        })
    }

    fn watts(milliwatts: u32) -> f32 {
        milliwatts as f32 / 1000.0
    }
}

#[cfg(feature = "nvidia")]
impl DeviceHandle for NvidiaDevice {
    fn index(&self) -> u32 {
        self.index
    }

    fn read_snapshot(&self) -> Result<MetricsSnapshot> {
        let index = self.index;

        let temperature = self
            .device
            .temperature(TemperatureSensor::Gpu)
            .map_err(|e| Error::read_failed(index, format!("temperature: {}", e)))?;

        let power_draw = self.device.power_usage().ok().map(Self::watts);
        let power_limit = self.device.power_management_limit().ok().map(Self::watts);
        let fan_speed = self.device.fan_speed(0).ok();

        let util = self
            .device
            .utilization_rates()
            .map_err(|e| Error::read_failed(index, format!("utilization: {}", e)))?;

        let mem = self
            .device
            .memory_info()
            .map_err(|e| Error::read_failed(index, format!("memory info: {}", e)))?;

        let core_clock = self
            .device
            .clock_info(Clock::Graphics)
            .map_err(|e| Error::read_failed(index, format!("graphics clock: {}", e)))?;
        let memory_clock = self
            .device
            .clock_info(Clock::Memory)
            .map_err(|e| Error::read_failed(index, format!("memory clock: {}", e)))?;

        Ok(MetricsSnapshot {
            temperature: temperature as f32,
            power_draw,
            power_limit,
            fan_speed,
            compute_utilization: util.gpu,
            memory_utilization: util.memory,
            memory_used: mem.used,
            memory_total: mem.total,
            core_clock,
            memory_clock,
        })
    }

    fn identity(&self) -> Result<DeviceIdentity> {
        let index = self.index;
        let name = self
            .device
            .name()
            .map_err(|e| Error::read_failed(index, format!("name: {}", e)))?;
        let uuid = self
            .device
            .uuid()
            .map_err(|e| Error::read_failed(index, format!("UUID: {}", e)))?;
        let memory = self
            .device
            .memory_info()
            .map_err(|e| Error::read_failed(index, format!("memory info: {}", e)))?;
        let driver_version = self
            .nvml
            .sys_driver_version()
            .map_err(|e| Error::read_failed(index, format!("driver version: {}", e)))?;
        let cuda_version = self
            .nvml
            .sys_cuda_driver_version()
            .map_err(|e| Error::read_failed(index, format!("CUDA version: {}", e)))?;
        let pci = self
            .device
            .pci_info()
            .map_err(|e| Error::read_failed(index, format!("PCI info: {}", e)))?;

        Ok(DeviceIdentity {
            index,
            name,
            uuid,
            memory_total: memory.total,
            driver_version,
            cuda_version: format_cuda_version(cuda_version),
            pci_bus_id: pci.bus_id,
        })
    }
}
