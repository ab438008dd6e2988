//! Thermal baselines for GPU models
//!
//! A baseline is a calibration aid for the classifier and the temperature
//! bars, not a safety limit. Resolution is deliberately approximate.

use serde::{Deserialize, Serialize};

use crate::telemetry::TelemetryContext;

/// Max safe temperature assumed for a generic modern discrete GPU (°C)
pub const DEFAULT_MAX_TEMPERATURE: u32 = 83;

/// Ceiling for older or unrecognized hardware (°C)
pub const CONSERVATIVE_MAX_TEMPERATURE: u32 = 80;

/// Degrees below the max temperature at which throttling is assumed
pub const THROTTLE_MARGIN: f32 = 3.0;

/// Name tokens of desktop parts known to run up to the default ceiling.
/// Matched as lowercase substrings, in this order.
const KNOWN_MODEL_TOKENS: &[&[&str]] = &[
    &["4090", "4080", "4070"],
    &["3090", "3080", "3070"],
    &["20", "16", "2080", "2070", "1660"],
];

/// Per-device thermal calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    /// Max safe operating temperature (°C)
    pub max_temperature: u32,
}

impl Baseline {
    pub fn new(max_temperature: u32) -> Self {
        Self { max_temperature }
    }

    /// Temperature above which the device is treated as thermally throttled
    pub fn throttle_threshold(&self) -> f32 {
        self.max_temperature as f32 - THROTTLE_MARGIN
    }

    /// Temperature as a percentage of the max safe temperature
    pub fn thermal_percent(&self, temperature: f32) -> f32 {
        if self.max_temperature == 0 {
            return 0.0;
        }
        temperature / self.max_temperature as f32 * 100.0
    }

    /// Resolve a baseline for a device
    ///
    /// Hardware first: if the telemetry library is up and reports the device,
    /// the generic default applies. Otherwise fall back to the model name.
    /// Returns `None` when neither is available.
    pub fn resolve(ctx: &TelemetryContext, device_index: u32, device_name: &str) -> Option<Self> {
        Self::from_hardware(ctx, device_index).or_else(|| Self::from_device_name(device_name))
    }

    /// Hardware-backed tier
    pub fn from_hardware(ctx: &TelemetryContext, device_index: u32) -> Option<Self> {
        if ctx.is_initialized() && device_index < ctx.device_count() {
            Some(Self::new(DEFAULT_MAX_TEMPERATURE))
        } else {
            None
        }
    }

    /// Name-based tier; `None` for an empty name
    pub fn from_device_name(device_name: &str) -> Option<Self> {
        if device_name.is_empty() {
            return None;
        }

        let name = device_name.to_lowercase();
        let known = KNOWN_MODEL_TOKENS
            .iter()
            .any(|tokens| tokens.iter().any(|token| name.contains(token)));

        if known {
            Some(Self::new(DEFAULT_MAX_TEMPERATURE))
        } else {
            Some(Self::new(CONSERVATIVE_MAX_TEMPERATURE))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::fake::{FakeBackend, FakeDevice};

    fn offline_context() -> TelemetryContext {
        let mut ctx = TelemetryContext::new(Box::new(FakeBackend::failing()));
        assert!(!ctx.initialize());
        ctx
    }

    #[test]
    fn test_name_fallback() {
        let ctx = offline_context();
        assert_eq!(
            Baseline::resolve(&ctx, 0, "NVIDIA GeForce RTX 3080"),
            Some(Baseline::new(83))
        );
        assert_eq!(
            Baseline::resolve(&ctx, 0, "NVIDIA GeForce GTX 960"),
            Some(Baseline::new(80))
        );
        assert_eq!(Baseline::resolve(&ctx, 0, ""), None);
    }

    #[test]
    fn test_name_tokens() {
        for name in ["RTX 4090", "rtx 4070 ti", "GeForce RTX 3070", "GTX 1660 SUPER", "RTX 2080"] {
            assert_eq!(Baseline::from_device_name(name), Some(Baseline::new(83)), "{}", name);
        }
        for name in ["Quadro P4000", "GTX 970", "Radeon VII"] {
            assert_eq!(Baseline::from_device_name(name), Some(Baseline::new(80)), "{}", name);
        }
    }

    #[test]
    fn test_hardware_tier_wins() {
        let fake = FakeBackend::new().with_device(FakeDevice::new("GTX 960"));
        let mut ctx = TelemetryContext::new(Box::new(fake));
        assert!(ctx.initialize());

        assert_eq!(Baseline::resolve(&ctx, 0, "GTX 960"), Some(Baseline::new(83)));
        assert_eq!(Baseline::resolve(&ctx, 0, ""), Some(Baseline::new(83)));
        // Index the library does not report: name tier only
        assert_eq!(Baseline::resolve(&ctx, 5, ""), None);
    }

    #[test]
    fn test_thermal_math() {
        let baseline = Baseline::new(83);
        assert_eq!(baseline.throttle_threshold(), 80.0);
        assert!((baseline.thermal_percent(41.5) - 50.0).abs() < f32::EPSILON);
        assert_eq!(Baseline::new(0).thermal_percent(50.0), 0.0);
    }
}
