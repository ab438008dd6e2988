//! GPU workload analyzer
//!
//! Detects bottleneck patterns from a metrics snapshot with a fixed decision
//! table. Rules are evaluated top to bottom and the first match wins:
//!
//! | # | Condition                                           | Verdict            | Confidence |
//! |---|-----------------------------------------------------|--------------------|-----------:|
//! | 1 | compute < 5                                         | Idle               | 95         |
//! | 2 | temperature > baseline - 3 (or > 83 without one)    | ThermalThrottling  | 85 / 80    |
//! | 3 | power / limit > 0.95                                | PowerLimited       | 85         |
//! | 4 | compute > 90 and memory < 80                        | ComputeBound       | 85         |
//! | 5 | memory > 85 and compute < 90                        | MemoryBound        | 80         |
//! | 6 | compute > 75 and memory > 70                        | Balanced           | 70         |
//! | 7 | compute >= 30 and memory < 50                       | ComputeBound       | 60         |
//! | 8 | memory >= 40 and compute < 60                       | MemoryBound        | 55         |
//! | 9 | compute >= 20 or memory >= 20                       | Balanced           | 50         |
//! | - | otherwise                                           | Unknown            | 30         |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::baseline::{Baseline, DEFAULT_MAX_TEMPERATURE};
use crate::telemetry::MetricsSnapshot;

/// Types of GPU bottlenecks we can detect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bottleneck {
    MemoryBound,
    ComputeBound,
    ThermalThrottling,
    PowerLimited,
    Balanced,
    Idle,
    Unknown,
}

impl Bottleneck {
    /// All categories, in declaration order
    pub const ALL: [Bottleneck; 7] = [
        Bottleneck::MemoryBound,
        Bottleneck::ComputeBound,
        Bottleneck::ThermalThrottling,
        Bottleneck::PowerLimited,
        Bottleneck::Balanced,
        Bottleneck::Idle,
        Bottleneck::Unknown,
    ];

    /// Stable snake_case identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Bottleneck::MemoryBound => "memory_bound",
            Bottleneck::ComputeBound => "compute_bound",
            Bottleneck::ThermalThrottling => "thermal_throttling",
            Bottleneck::PowerLimited => "power_limited",
            Bottleneck::Balanced => "balanced",
            Bottleneck::Idle => "idle",
            Bottleneck::Unknown => "unknown",
        }
    }

    /// Human-readable explanation
    pub fn explanation(&self) -> &'static str {
        match self {
            Bottleneck::MemoryBound => "Memory subsystem is the limiting factor",
            Bottleneck::ComputeBound => "GPU cores are the limiting factor",
            Bottleneck::ThermalThrottling => "Temperature too high, reducing performance",
            Bottleneck::PowerLimited => "Power draw at limit, reducing performance",
            Bottleneck::Balanced => "GPU and memory working efficiently together",
            Bottleneck::Idle => "No significant workload detected",
            Bottleneck::Unknown => "Workload pattern unclear",
        }
    }
}

impl fmt::Display for Bottleneck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of bottleneck analysis for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub bottleneck: Bottleneck,
    /// 0-100; only comparable within the same category
    pub confidence: f32,
    /// Compute utilization the verdict was based on (0-100%)
    pub compute_utilization: u32,
    /// Memory utilization the verdict was based on (0-100%)
    pub memory_utilization: u32,
    /// Power draw in Watts (0 when not reported)
    pub power_draw: f32,
    /// Temperature in Celsius
    pub temperature: f32,
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.0}% confidence)", self.bottleneck, self.confidence)
    }
}

/// Classify one set of readings
///
/// Total over its inputs: utilization is clamped to 0-100, a non-finite
/// temperature yields `Unknown` once the idle rule has been checked, and a
/// non-finite or non-positive power reading or limit skips the power rule.
pub fn classify(
    compute_util: u32,
    memory_util: u32,
    temperature: f32,
    power: f32,
    power_limit: Option<f32>,
    baseline: Option<&Baseline>,
) -> (Bottleneck, f32) {
    let compute = compute_util.min(100);
    let memory = memory_util.min(100);

    if compute < 5 {
        return (Bottleneck::Idle, 95.0);
    }

    if !temperature.is_finite() {
        return (Bottleneck::Unknown, 30.0);
    }

    let thermal_threshold = baseline
        .map(Baseline::throttle_threshold)
        .unwrap_or(DEFAULT_MAX_TEMPERATURE as f32);
    if temperature > thermal_threshold {
        let confidence = if baseline.is_some() { 85.0 } else { 80.0 };
        return (Bottleneck::ThermalThrottling, confidence);
    }

    if let Some(limit) = power_limit.filter(|l| l.is_finite() && *l > 0.0) {
        if power.is_finite() && power > 0.0 && power / limit > 0.95 {
            return (Bottleneck::PowerLimited, 85.0);
        }
    }

    match (compute, memory) {
        // Heavy compute: cores maxed out
        (c, m) if c > 90 && m < 80 => (Bottleneck::ComputeBound, 85.0),
        // Heavy memory: memory maxed out
        (c, m) if m > 85 && c < 90 => (Bottleneck::MemoryBound, 80.0),
        (c, m) if c > 75 && m > 70 => (Bottleneck::Balanced, 70.0),
        // Moderate compute-leaning
        (c, m) if c >= 30 && m < 50 => (Bottleneck::ComputeBound, 60.0),
        // Moderate memory-leaning
        (c, m) if m >= 40 && c < 60 => (Bottleneck::MemoryBound, 55.0),
        // Light mixed load
        (c, m) if c >= 20 || m >= 20 => (Bottleneck::Balanced, 50.0),
        _ => (Bottleneck::Unknown, 30.0),
    }
}

/// Classifier bound to one device's baseline
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    baseline: Option<Baseline>,
}

impl Analyzer {
    pub fn new(baseline: Option<Baseline>) -> Self {
        Self { baseline }
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    /// Analyze a snapshot; a missing power reading counts as 0 W
    pub fn analyze(&self, metrics: &MetricsSnapshot) -> Analysis {
        let power = metrics.power_draw.unwrap_or(0.0);
        let (bottleneck, confidence) = classify(
            metrics.compute_utilization,
            metrics.memory_utilization,
            metrics.temperature,
            power,
            metrics.power_limit,
            self.baseline.as_ref(),
        );

        Analysis {
            bottleneck,
            confidence,
            compute_utilization: metrics.compute_utilization,
            memory_utilization: metrics.memory_utilization,
            power_draw: power,
            temperature: metrics.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_regardless_of_other_inputs() {
        for compute in 0..5 {
            for (memory, temp, power, limit) in [
                (0, 35.0, 0.0, None),
                (100, 99.0, 450.0, Some(300.0)),
                (90, f32::NAN, f32::NAN, Some(0.0)),
            ] {
                let (bottleneck, confidence) =
                    classify(compute, memory, temp, power, limit, Some(&Baseline::new(70)));
                assert_eq!(bottleneck, Bottleneck::Idle);
                assert_eq!(confidence, 95.0);
            }
        }
        assert_eq!(classify(3, 2, 35.0, 0.0, None, None), (Bottleneck::Idle, 95.0));
    }

    #[test]
    fn test_thermal_throttling() {
        // Default threshold is 83 without a baseline
        assert_eq!(
            classify(50, 50, 83.5, 0.0, None, None),
            (Bottleneck::ThermalThrottling, 80.0)
        );
        assert_ne!(classify(50, 50, 83.0, 0.0, None, None).0, Bottleneck::ThermalThrottling);

        // Baseline threshold is max - 3
        let baseline = Baseline::new(80);
        assert_eq!(
            classify(5, 0, 77.5, 0.0, None, Some(&baseline)),
            (Bottleneck::ThermalThrottling, 85.0)
        );
        assert_ne!(
            classify(50, 50, 77.0, 0.0, None, Some(&baseline)).0,
            Bottleneck::ThermalThrottling
        );
    }

    #[test]
    fn test_thermal_beats_compute_bound() {
        let baseline = Baseline::new(83);
        assert_eq!(
            classify(95, 10, 90.0, 0.0, None, Some(&baseline)),
            (Bottleneck::ThermalThrottling, 85.0)
        );
    }

    #[test]
    fn test_power_limited() {
        assert_eq!(
            classify(96, 40, 70.0, 290.0, Some(300.0), None),
            (Bottleneck::PowerLimited, 85.0)
        );
        // Exactly 95% is not over the limit
        assert_eq!(
            classify(96, 40, 70.0, 285.0, Some(300.0), None),
            (Bottleneck::ComputeBound, 85.0)
        );
        // A zero limit means "not reported"
        assert_eq!(
            classify(96, 40, 70.0, 290.0, Some(0.0), None),
            (Bottleneck::ComputeBound, 85.0)
        );
    }

    #[test]
    fn test_scenarios() {
        assert_eq!(
            classify(96, 40, 70.0, 250.0, Some(300.0), None),
            (Bottleneck::ComputeBound, 85.0)
        );
        assert_eq!(
            classify(50, 90, 70.0, 200.0, None, None),
            (Bottleneck::MemoryBound, 80.0)
        );
        assert_eq!(classify(10, 10, 40.0, 0.0, None, None), (Bottleneck::Unknown, 30.0));
    }

    #[test]
    fn test_rule_table() {
        let cases = [
            ((80, 75), (Bottleneck::Balanced, 70.0)),
            ((40, 20), (Bottleneck::ComputeBound, 60.0)),
            ((20, 45), (Bottleneck::MemoryBound, 55.0)),
            ((25, 5), (Bottleneck::Balanced, 50.0)),
            ((6, 20), (Bottleneck::Balanced, 50.0)),
            ((19, 19), (Bottleneck::Unknown, 30.0)),
            ((95, 85), (Bottleneck::Balanced, 70.0)),
            ((91, 79), (Bottleneck::ComputeBound, 85.0)),
            ((90, 86), (Bottleneck::Balanced, 70.0)),
            ((89, 86), (Bottleneck::MemoryBound, 80.0)),
            ((60, 45), (Bottleneck::ComputeBound, 60.0)),
            ((65, 55), (Bottleneck::Balanced, 50.0)),
        ];

        for ((compute, memory), expected) in cases {
            assert_eq!(
                classify(compute, memory, 50.0, 0.0, None, None),
                expected,
                "compute={} memory={}",
                compute,
                memory
            );
        }
    }

    #[test]
    fn test_out_of_range_inputs() {
        // Utilization above 100 is clamped
        assert_eq!(
            classify(250, 10, 50.0, 0.0, None, None),
            (Bottleneck::ComputeBound, 85.0)
        );
        assert_eq!(
            classify(50, 50, f32::NAN, 0.0, None, None),
            (Bottleneck::Unknown, 30.0)
        );
        assert_eq!(
            classify(96, 40, 70.0, f32::INFINITY, Some(300.0), None),
            (Bottleneck::ComputeBound, 85.0)
        );
    }

    #[test]
    fn test_analyzer_echoes_inputs() {
        let analyzer = Analyzer::new(None);
        let metrics = MetricsSnapshot {
            temperature: 70.0,
            power_draw: None,
            power_limit: None,
            compute_utilization: 50,
            memory_utilization: 90,
            ..Default::default()
        };

        let analysis = analyzer.analyze(&metrics);
        assert_eq!(analysis.bottleneck, Bottleneck::MemoryBound);
        assert_eq!(analysis.confidence, 80.0);
        assert_eq!(analysis.compute_utilization, 50);
        assert_eq!(analysis.memory_utilization, 90);
        assert_eq!(analysis.power_draw, 0.0);
        assert_eq!(analysis.to_string(), "memory_bound (80% confidence)");
    }

    #[test]
    fn test_every_category_has_text() {
        for category in Bottleneck::ALL {
            assert!(!category.explanation().is_empty());
            assert_eq!(
                serde_json::to_string(&category).unwrap(),
                format!("\"{}\"", category.as_str())
            );
        }
    }
}
