//! Time-windowed metrics history
//!
//! Each device keeps its analyzed snapshots in insertion order. Records older
//! than the window are dropped from the front whenever the history is
//! written or queried, so no read ever sees a stale record.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::analyzer::{Analysis, Bottleneck};
use crate::telemetry::MetricsSnapshot;

/// Default peak window
pub const DEFAULT_PEAK_WINDOW: Duration = Duration::from_secs(60);

/// One analyzed snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub captured_at: Instant,
    pub metrics: MetricsSnapshot,
    pub analysis: Analysis,
    /// Temperature relative to the device baseline, if it has one
    pub thermal_percent: Option<f32>,
}

/// Peak values over the current window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakSet {
    pub temperature: f32,
    /// `None` if no record in the window reported power
    pub power_draw: Option<f32>,
    pub fan_speed: Option<u32>,
    pub compute_utilization: u32,
    pub memory_utilization: u32,
    pub memory_used: u64,
    pub core_clock: u32,
    pub memory_clock: u32,
    pub thermal_percent: Option<f32>,
    /// Verdict at the record with the highest compute utilization
    /// (earliest one on ties)
    pub status: Bottleneck,
    /// Number of records the peaks were taken over
    pub samples: usize,
}

fn max_opt<T: PartialOrd>(acc: Option<T>, value: Option<T>) -> Option<T> {
    match (acc, value) {
        (Some(a), Some(v)) => Some(if v > a { v } else { a }),
        (a, v) => a.or(v),
    }
}

/// Windowed history for one device
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    records: VecDeque<HistoryRecord>,
    window: Duration,
}

impl MetricsHistory {
    pub fn new(window: Duration) -> Self {
        Self {
            records: VecDeque::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Append a record and evict everything that fell out of the window
    /// relative to its capture time.
    ///
    /// A record stamped earlier than the newest one is re-stamped to the
    /// newest timestamp so timestamps never decrease.
    pub fn push(&mut self, mut record: HistoryRecord) {
        if let Some(last) = self.records.back() {
            if record.captured_at < last.captured_at {
                record.captured_at = last.captured_at;
            }
        }
        let now = record.captured_at;
        self.records.push_back(record);
        self.evict(now);
    }

    /// Drop records more than one window older than `now`
    pub fn evict(&mut self, now: Instant) {
        while let Some(front) = self.records.front() {
            if now.saturating_duration_since(front.captured_at) > self.window {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }

    /// Most recent record
    pub fn latest(&self) -> Option<&HistoryRecord> {
        self.records.back()
    }

    /// Records currently held, oldest first
    pub fn records(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Peak values over the window ending at `now`; `None` if it is empty
    pub fn peaks(&mut self, now: Instant) -> Option<PeakSet> {
        self.evict(now);

        let first = self.records.front()?;
        let mut peaks = PeakSet {
            temperature: first.metrics.temperature,
            power_draw: first.metrics.power_draw,
            fan_speed: first.metrics.fan_speed,
            compute_utilization: first.metrics.compute_utilization,
            memory_utilization: first.metrics.memory_utilization,
            memory_used: first.metrics.memory_used,
            core_clock: first.metrics.core_clock,
            memory_clock: first.metrics.memory_clock,
            thermal_percent: first.thermal_percent,
            status: first.analysis.bottleneck,
            samples: self.records.len(),
        };

        for record in self.records.iter().skip(1) {
            let m = &record.metrics;
            peaks.temperature = peaks.temperature.max(m.temperature);
            peaks.power_draw = max_opt(peaks.power_draw, m.power_draw);
            peaks.fan_speed = max_opt(peaks.fan_speed, m.fan_speed);
            peaks.memory_utilization = peaks.memory_utilization.max(m.memory_utilization);
            peaks.memory_used = peaks.memory_used.max(m.memory_used);
            peaks.core_clock = peaks.core_clock.max(m.core_clock);
            peaks.memory_clock = peaks.memory_clock.max(m.memory_clock);
            peaks.thermal_percent = max_opt(peaks.thermal_percent, record.thermal_percent);

            // Strictly greater keeps the earliest record on ties
            if m.compute_utilization > peaks.compute_utilization {
                peaks.compute_utilization = m.compute_utilization;
                peaks.status = record.analysis.bottleneck;
            }
        }

        Some(peaks)
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_PEAK_WINDOW)
    }
}
