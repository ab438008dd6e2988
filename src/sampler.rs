//! Per-device sampling sessions
//!
//! A [`Sampler`] owns the telemetry context and one [`DeviceSession`] per
//! device that opened at startup. Every tick reads a snapshot, classifies it
//! and appends it to that device's windowed history. Failures stay local to
//! the device and tick that produced them.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::analyzer::{Analysis, Analyzer};
use crate::baseline::Baseline;
use crate::error::{Error, Result};
use crate::history::{HistoryRecord, MetricsHistory, PeakSet, DEFAULT_PEAK_WINDOW};
use crate::telemetry::{DeviceHandle, DeviceIdentity, MetricsSnapshot, TelemetryContext};

/// Default sampling interval
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// Sampler settings
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Peak window
    pub window: Duration,
    /// Device indices to monitor (empty = all)
    pub devices: Vec<u32>,
    /// Baseline applied to every device instead of resolving one
    pub max_temperature: Option<u32>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_UPDATE_INTERVAL,
            window: DEFAULT_PEAK_WINDOW,
            devices: Vec::new(),
            max_temperature: None,
        }
    }
}

/// Monitoring state for one device
pub struct DeviceSession {
    index: u32,
    name: String,
    identity: Option<DeviceIdentity>,
    handle: Option<Box<dyn DeviceHandle>>,
    analyzer: Analyzer,
    history: MetricsHistory,
}

impl DeviceSession {
    /// Acquire the device handle and resolve its baseline
    pub fn open(ctx: &TelemetryContext, index: u32, config: &SamplerConfig) -> Result<Self> {
        let handle = ctx.open_device(index)?;

        let identity = match handle.identity() {
            Ok(identity) => Some(identity),
            Err(e) => {
                debug!("No identity for GPU {}: {}", index, e);
                None
            }
        };
        let name = identity
            .as_ref()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| format!("GPU {}", index));

        let baseline = match config.max_temperature {
            Some(max) => Some(Baseline::new(max)),
            None => Baseline::resolve(ctx, index, &name),
        };

        Ok(Self {
            index,
            name,
            identity,
            handle: Some(handle),
            analyzer: Analyzer::new(baseline),
            history: MetricsHistory::new(config.window),
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Device name, or "GPU n" if the identity could not be read
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.analyzer.baseline()
    }

    /// True until the handle has been released
    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn history(&self) -> &MetricsHistory {
        &self.history
    }

    /// Sample once. On a failed read the history is left untouched.
    pub fn tick(&mut self, now: Instant) -> Result<Analysis> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| Error::device_unavailable(self.index, "session stopped"))?;

        let metrics = handle.read_snapshot()?;
        let analysis = self.analyzer.analyze(&metrics);
        let thermal_percent = self
            .analyzer
            .baseline()
            .map(|b| b.thermal_percent(metrics.temperature));

        self.history.push(HistoryRecord {
            captured_at: now,
            metrics,
            analysis,
            thermal_percent,
        });

        Ok(analysis)
    }

    /// Latest snapshot and its verdict; `None` before the first successful tick
    pub fn current_view(&self) -> Option<(&MetricsSnapshot, &Analysis)> {
        self.history.latest().map(|r| (&r.metrics, &r.analysis))
    }

    /// Latest full record
    pub fn latest(&self) -> Option<&HistoryRecord> {
        self.history.latest()
    }

    /// Peaks over the window ending at `now`
    pub fn peaks(&mut self, now: Instant) -> Option<PeakSet> {
        self.history.peaks(now)
    }

    pub fn reset_history(&mut self) {
        self.history.clear();
    }

    /// Release the handle. Later ticks fail; history stays readable.
    pub fn release(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.release(),
            None => Ok(()),
        }
    }
}

/// Outcome of one tick across all sessions
#[derive(Debug, Default)]
pub struct TickReport {
    /// Devices sampled successfully
    pub sampled: Vec<u32>,
    /// Devices whose read failed this tick
    pub failed: Vec<(u32, Error)>,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Requested indices at or past `count`
pub fn unmatched_indices(requested: &[u32], count: u32) -> Vec<u32> {
    requested.iter().copied().filter(|&i| i >= count).collect()
}

/// Owner of the telemetry context and every device session
pub struct Sampler {
    context: TelemetryContext,
    sessions: Vec<DeviceSession>,
    config: SamplerConfig,
    unmatched: Vec<u32>,
    stopped: bool,
}

impl Sampler {
    /// Initialize the context and open a session per usable device
    ///
    /// A library that fails to load or devices that fail to open are logged
    /// and skipped; zero sessions is a valid result.
    pub fn start(mut context: TelemetryContext, config: SamplerConfig) -> Self {
        let mut sessions = Vec::new();
        let mut unmatched = Vec::new();

        if context.initialize() {
            let count = context.device_count();
            unmatched = unmatched_indices(&config.devices, count);
            for index in &unmatched {
                warn!("Requested GPU {} not found ({} reported)", index, count);
            }
            for index in 0..count {
                if !config.devices.is_empty() && !config.devices.contains(&index) {
                    continue;
                }
                match DeviceSession::open(&context, index, &config) {
                    Ok(session) => {
                        info!(
                            "Monitoring GPU {} ({}), baseline {:?}",
                            index,
                            session.name(),
                            session.baseline().map(|b| b.max_temperature)
                        );
                        sessions.push(session);
                    }
                    Err(e) => warn!("Skipping GPU {}: {}", index, e),
                }
            }
        }

        Self {
            context,
            sessions,
            config,
            unmatched,
            stopped: false,
        }
    }

    /// Requested device indices the library did not report
    pub fn unmatched_devices(&self) -> &[u32] {
        &self.unmatched
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn context(&self) -> &TelemetryContext {
        &self.context
    }

    pub fn sessions(&self) -> &[DeviceSession] {
        &self.sessions
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Session for a device index
    pub fn session(&self, index: u32) -> Option<&DeviceSession> {
        self.sessions.iter().find(|s| s.index == index)
    }

    fn session_mut(&mut self, index: u32) -> Option<&mut DeviceSession> {
        self.sessions.iter_mut().find(|s| s.index == index)
    }

    /// Static identities of the monitored devices
    pub fn identities(&self) -> Vec<DeviceIdentity> {
        self.sessions
            .iter()
            .filter_map(|s| s.identity().cloned())
            .collect()
    }

    /// Tick every session once
    pub fn tick_all(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        for session in &mut self.sessions {
            match session.tick(now) {
                Ok(analysis) => {
                    debug!("GPU {}: {}", session.index, analysis);
                    report.sampled.push(session.index);
                }
                Err(e) => {
                    debug!("GPU {} tick skipped: {}", session.index, e);
                    report.failed.push((session.index, e));
                }
            }
        }
        report
    }

    pub fn current_view(&self, index: u32) -> Option<(&MetricsSnapshot, &Analysis)> {
        self.session(index)?.current_view()
    }

    pub fn peaks(&mut self, index: u32, now: Instant) -> Option<PeakSet> {
        self.session_mut(index)?.peaks(now)
    }

    /// Clear every device's history
    pub fn reset_history(&mut self) {
        for session in &mut self.sessions {
            session.reset_history();
        }
    }

    /// Release handles in reverse acquisition order, then the library.
    /// Best-effort and idempotent.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        for session in self.sessions.iter_mut().rev() {
            if let Err(e) = session.release() {
                warn!("Failed to release GPU {}: {}", session.index, e);
            }
        }
        self.context.shutdown();
        self.stopped = true;
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Bottleneck;
    use crate::telemetry::fake::{FakeBackend, FakeDevice, Script};

    fn snapshot(compute: u32, memory: u32, temperature: f32) -> MetricsSnapshot {
        MetricsSnapshot {
            temperature,
            power_draw: Some(150.0),
            power_limit: Some(300.0),
            fan_speed: Some(40),
            compute_utilization: compute,
            memory_utilization: memory,
            memory_used: 8 * 1024 * 1024 * 1024,
            memory_total: 24 * 1024 * 1024 * 1024,
            core_clock: 2520,
            memory_clock: 10501,
        }
    }

    fn push(script: &Script, reading: Option<MetricsSnapshot>) {
        script.lock().unwrap().push_back(reading);
    }

    fn sampler_with(devices: Vec<FakeDevice>) -> Sampler {
        let mut fake = FakeBackend::new();
        for device in devices {
            fake = fake.with_device(device);
        }
        Sampler::start(TelemetryContext::new(Box::new(fake)), SamplerConfig::default())
    }

    #[test]
    fn test_failed_library_yields_no_sessions() {
        let mut sampler = Sampler::start(
            TelemetryContext::new(Box::new(FakeBackend::failing())),
            SamplerConfig::default(),
        );
        assert!(sampler.is_empty());
        assert!(sampler.tick_all(Instant::now()).is_clean());
        assert!(sampler.identities().is_empty());
    }

    #[test]
    fn test_unopenable_device_is_skipped() {
        let sampler = sampler_with(vec![
            FakeDevice::new("NVIDIA GeForce RTX 4090"),
            FakeDevice::new("broken").unopenable(),
            FakeDevice::new("NVIDIA GeForce RTX 3080"),
        ]);
        let indices: Vec<_> = sampler.sessions().iter().map(|s| s.index()).collect();
        assert_eq!(indices, [0, 2]);
        assert_eq!(sampler.session(2).unwrap().name(), "NVIDIA GeForce RTX 3080");
    }

    #[test]
    fn test_device_filter() {
        let mut fake = FakeBackend::new();
        for name in ["a", "b", "c"] {
            fake = fake.with_device(FakeDevice::new(name));
        }
        let config = SamplerConfig {
            devices: vec![1],
            ..Default::default()
        };
        let sampler = Sampler::start(TelemetryContext::new(Box::new(fake)), config);
        assert_eq!(sampler.sessions().len(), 1);
        assert_eq!(sampler.sessions()[0].index(), 1);
        assert!(sampler.unmatched_devices().is_empty());
    }

    #[test]
    fn test_requested_device_past_count_is_reported() {
        let fake = FakeBackend::new().with_device(FakeDevice::new("only"));
        let config = SamplerConfig {
            devices: vec![0, 7, 9],
            ..Default::default()
        };
        let sampler = Sampler::start(TelemetryContext::new(Box::new(fake)), config);
        assert_eq!(sampler.sessions().len(), 1);
        assert_eq!(sampler.unmatched_devices(), [7, 9]);

        assert_eq!(unmatched_indices(&[7], 1), [7]);
        assert!(unmatched_indices(&[], 0).is_empty());
    }

    #[test]
    fn test_tick_records_and_classifies() {
        let device = FakeDevice::new("NVIDIA GeForce RTX 4090");
        let script = device.script();
        let mut sampler = sampler_with(vec![device]);

        assert!(sampler.current_view(0).is_none());
        assert!(sampler.peaks(0, Instant::now()).is_none());

        push(&script, Some(snapshot(96, 40, 70.0)));
        let report = sampler.tick_all(Instant::now());
        assert_eq!(report.sampled, [0]);

        let (metrics, analysis) = sampler.current_view(0).unwrap();
        assert_eq!(metrics.compute_utilization, 96);
        assert_eq!(analysis.bottleneck, Bottleneck::ComputeBound);
        assert_eq!(analysis.confidence, 85.0);

        // Hardware tier baseline: 83 °C
        let record = sampler.session(0).unwrap().latest().unwrap();
        let thermal = record.thermal_percent.unwrap();
        assert!((thermal - 70.0 / 83.0 * 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_failed_read_keeps_history() {
        let first = FakeDevice::new("first");
        let second = FakeDevice::new("second");
        let (s0, s1) = (first.script(), second.script());
        let mut sampler = sampler_with(vec![first, second]);
        let t = Instant::now();

        push(&s0, Some(snapshot(50, 90, 60.0)));
        push(&s1, Some(snapshot(10, 10, 40.0)));
        assert!(sampler.tick_all(t).is_clean());

        push(&s0, None);
        push(&s1, Some(snapshot(96, 40, 70.0)));
        let report = sampler.tick_all(t + Duration::from_millis(500));
        assert_eq!(report.sampled, [1]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 0);
        assert!(matches!(report.failed[0].1, Error::ReadFailed { index: 0, .. }));

        // Device 0 still shows its previous reading
        let (metrics, analysis) = sampler.current_view(0).unwrap();
        assert_eq!(metrics.memory_utilization, 90);
        assert_eq!(analysis.bottleneck, Bottleneck::MemoryBound);
        assert_eq!(sampler.session(0).unwrap().history().len(), 1);
        assert_eq!(sampler.session(1).unwrap().history().len(), 2);
    }

    #[test]
    fn test_window_excludes_stale_ticks() {
        let device = FakeDevice::new("NVIDIA GeForce RTX 3080");
        let script = device.script();
        let mut sampler = sampler_with(vec![device]);
        let t = Instant::now();

        push(&script, Some(snapshot(99, 10, 70.0)));
        push(&script, Some(snapshot(60, 30, 65.0)));
        push(&script, Some(snapshot(40, 20, 60.0)));
        sampler.tick_all(t);
        sampler.tick_all(t + Duration::from_secs(30));
        sampler.tick_all(t + Duration::from_secs(61));

        let now = t + Duration::from_secs(61);
        let peaks = sampler.peaks(0, now).unwrap();
        assert_eq!(peaks.samples, 2);
        assert_eq!(peaks.compute_utilization, 60);
        assert_eq!(peaks.temperature, 65.0);
        assert_eq!(peaks.status, Bottleneck::ComputeBound);
        assert_eq!(sampler.peaks(0, now), Some(peaks));
    }

    #[test]
    fn test_config_baseline_override() {
        let device = FakeDevice::new("NVIDIA GeForce RTX 4090");
        let script = device.script();
        let fake = FakeBackend::new().with_device(device);
        let config = SamplerConfig {
            max_temperature: Some(70),
            ..Default::default()
        };
        let mut sampler = Sampler::start(TelemetryContext::new(Box::new(fake)), config);
        assert_eq!(sampler.session(0).unwrap().baseline(), Some(&Baseline::new(70)));

        push(&script, Some(snapshot(96, 40, 68.0)));
        sampler.tick_all(Instant::now());
        let (_, analysis) = sampler.current_view(0).unwrap();
        assert_eq!(analysis.bottleneck, Bottleneck::ThermalThrottling);
        assert_eq!(analysis.confidence, 85.0);
    }

    #[test]
    fn test_shutdown_releases_in_reverse_order() {
        let fake = FakeBackend::new()
            .with_device(FakeDevice::new("a"))
            .with_device(FakeDevice::new("b"))
            .with_device(FakeDevice::new("c"));
        let events = fake.events();
        let mut sampler =
            Sampler::start(TelemetryContext::new(Box::new(fake)), SamplerConfig::default());

        sampler.shutdown();
        sampler.shutdown();
        assert!(sampler.sessions().iter().all(|s| !s.is_active()));
        assert!(matches!(
            sampler.tick_all(Instant::now()).failed[0].1,
            Error::DeviceUnavailable { index: 0, .. }
        ));
        drop(sampler);

        assert_eq!(
            events.lock().unwrap().as_slice(),
            ["init", "open:0", "open:1", "open:2", "release:2", "release:1", "release:0", "shutdown"]
        );
    }
}
