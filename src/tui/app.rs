//! Application state management

use std::time::{Duration, Instant};

use crate::baseline::Baseline;
use crate::history::{HistoryRecord, PeakSet};
use crate::sampler::Sampler;
use crate::telemetry::DeviceIdentity;

/// How long a status message stays in the footer
const STATUS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(3);

/// Everything the UI needs to draw one device
#[derive(Clone, Debug)]
pub struct DevicePanel {
    pub index: u32,
    pub name: String,
    pub baseline: Option<Baseline>,
    /// Latest analyzed snapshot
    pub current: Option<HistoryRecord>,
    /// Peaks over the window
    pub peaks: Option<PeakSet>,
    /// Error from the most recent tick, if it failed
    pub last_error: Option<String>,
}

impl DevicePanel {
    /// Total memory from the latest reading, falling back to 0
    pub fn memory_total(&self) -> u64 {
        self.current
            .as_ref()
            .map(|r| r.metrics.memory_total)
            .unwrap_or(0)
    }

    /// Power limit from the latest reading
    pub fn power_limit(&self) -> Option<f32> {
        self.current.as_ref().and_then(|r| r.metrics.power_limit)
    }
}

/// Application state
pub struct App {
    /// Currently selected tab
    pub selected_tab: usize,
    /// Tab names
    pub tabs: Vec<&'static str>,
    /// Static identities of monitored GPUs
    pub devices: Vec<DeviceIdentity>,
    /// Per-device view data, refreshed every update
    pub panels: Vec<DevicePanel>,
    /// Whether the telemetry library loaded
    pub library_available: bool,
    /// Host name shown in the header
    pub hostname: String,
    /// Peak window length in seconds
    pub window_secs: u64,
    /// Status message to display (cleared after timeout)
    pub status_message: Option<(String, Instant)>,
    sampler: Sampler,
}

impl App {
    pub fn new(sampler: Sampler) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());

        let panels = sampler
            .sessions()
            .iter()
            .map(|s| DevicePanel {
                index: s.index(),
                name: s.name().to_string(),
                baseline: s.baseline().copied(),
                current: None,
                peaks: None,
                last_error: None,
            })
            .collect();

        Self {
            selected_tab: 0,
            tabs: vec!["Overview", "History"],
            devices: sampler.identities(),
            panels,
            library_available: sampler.context().is_initialized(),
            hostname,
            window_secs: sampler.config().window.as_secs(),
            status_message: None,
            sampler,
        }
    }

    /// Sampling interval
    pub fn tick_rate(&self) -> Duration {
        self.sampler.interval()
    }

    /// Tick every device and refresh the panels
    pub fn update(&mut self) {
        let now = Instant::now();
        let report = self.sampler.tick_all(now);

        for panel in &mut self.panels {
            panel.last_error = report
                .failed
                .iter()
                .find(|(index, _)| *index == panel.index)
                .map(|(_, e)| e.to_string());
            panel.current = self
                .sampler
                .session(panel.index)
                .and_then(|s| s.latest().cloned());
            panel.peaks = self.sampler.peaks(panel.index, now);
        }
    }

    pub fn next_tab(&mut self) {
        self.selected_tab = (self.selected_tab + 1) % self.tabs.len();
    }

    pub fn previous_tab(&mut self) {
        self.selected_tab = (self.selected_tab + self.tabs.len() - 1) % self.tabs.len();
    }

    pub fn set_tab(&mut self, tab: usize) {
        if tab < self.tabs.len() {
            self.selected_tab = tab;
        }
    }

    /// Drop all history; peaks restart from the next tick
    pub fn reset_history(&mut self) {
        self.sampler.reset_history();
        for panel in &mut self.panels {
            panel.peaks = None;
        }
        self.set_status_message("History cleared".to_string());
    }

    pub fn set_status_message(&mut self, message: String) {
        self.status_message = Some((message, Instant::now()));
    }

    /// Current status message, if it has not expired
    pub fn get_status_message(&self) -> Option<&str> {
        self.status_message
            .as_ref()
            .filter(|(_, at)| at.elapsed() < STATUS_MESSAGE_TIMEOUT)
            .map(|(msg, _)| msg.as_str())
    }

    /// Release devices and the telemetry library
    pub fn shutdown(&mut self) {
        self.sampler.shutdown();
    }
}
