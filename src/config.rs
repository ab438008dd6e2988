//! Configuration management for nvsonar
//!
//! Settings are read from `~/.config/nvsonar/config.toml` (or
//! `%APPDATA%\nvsonar\config.toml` on Windows). A missing file means defaults.

use crate::error::{Error, Result};
use crate::sampler::SamplerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// nvsonar configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sampling options
    #[serde(default)]
    pub general: GeneralConfig,
    /// Device selection
    #[serde(default)]
    pub devices: DeviceConfig,
    /// Thermal calibration
    #[serde(default)]
    pub thermal: ThermalConfig,
}

/// Sampling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Update interval in milliseconds
    #[serde(default = "default_update_interval")]
    pub update_interval_ms: u32,
    /// Peak window in seconds
    #[serde(default = "default_peak_window")]
    pub peak_window_secs: u32,
}

/// Device selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// List of GPU indices to monitor (empty = all)
    #[serde(default)]
    pub monitored: Vec<u32>,
}

/// Thermal calibration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermalConfig {
    /// Max safe temperature applied to every GPU instead of the resolved baseline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_temperature: Option<u32>,
}

/// Lowest accepted `[thermal] max_temperature` (°C)
pub const MIN_MAX_TEMPERATURE: u32 = 40;

// Default value functions
fn default_update_interval() -> u32 {
    500
}

fn default_peak_window() -> u32 {
    60
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval(),
            peak_window_secs: default_peak_window(),
        }
    }
}

impl Config {
    /// Get the default configuration directory
    pub fn default_path() -> PathBuf {
        let config_dir = if cfg!(windows) {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from(".config"))
        };

        config_dir.join("nvsonar")
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_file = Self::default_path().join("config.toml");

        if !config_file.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_file)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::default_path();
        std::fs::create_dir_all(&config_dir)?;
        self.save_to(&config_dir.join("config.toml"))
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the sampler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.general.update_interval_ms == 0 {
            return Err(Error::Config("update_interval_ms must be > 0".to_string()));
        }
        if self.general.peak_window_secs == 0 {
            return Err(Error::Config("peak_window_secs must be > 0".to_string()));
        }
        if let Some(max) = self.thermal.max_temperature {
            // Below this the throttle threshold sits under any idle temperature
            if max < MIN_MAX_TEMPERATURE {
                return Err(Error::Config(format!(
                    "max_temperature must be at least {} (got {})",
                    MIN_MAX_TEMPERATURE, max
                )));
            }
        }
        Ok(())
    }

    /// Sampler settings derived from this configuration
    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(self.general.update_interval_ms as u64),
            window: Duration::from_secs(self.general.peak_window_secs as u64),
            devices: self.devices.monitored.clone(),
            max_temperature: self.thermal.max_temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.update_interval_ms, 500);
        assert_eq!(config.general.peak_window_secs, 60);
        assert!(config.devices.monitored.is_empty());
        assert!(config.thermal.max_temperature.is_none());
        assert_eq!(config.sampler_config(), SamplerConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [devices]
            monitored = [0, 2]

            [thermal]
            max_temperature = 87
            "#,
        )
        .unwrap();

        assert_eq!(config.general, GeneralConfig::default());
        let sampler = config.sampler_config();
        assert_eq!(sampler.devices, vec![0, 2]);
        assert_eq!(sampler.max_temperature, Some(87));
        assert_eq!(sampler.interval, Duration::from_millis(500));
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.general.update_interval_ms = 250;
        config.thermal.max_temperature = Some(90);

        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let path = std::env::temp_dir().join(format!("nvsonar-test-{}.toml", std::process::id()));
        std::fs::write(&path, "[general]\nupdate_interval_ms = 0\n").unwrap();
        let result = Config::load_from(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_low_max_temperature_rejected() {
        for max in [0, 3, MIN_MAX_TEMPERATURE - 1] {
            let config: Config =
                toml::from_str(&format!("[thermal]\nmax_temperature = {}\n", max)).unwrap();
            assert!(matches!(config.validate(), Err(Error::Config(_))), "accepted {}", max);
        }

        let config: Config = toml::from_str("[thermal]\nmax_temperature = 40\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!("nvsonar-save-{}.toml", std::process::id()));
        let mut config = Config::default();
        config.general.peak_window_secs = 120;
        config.devices.monitored = vec![1, 3];
        config.thermal.max_temperature = Some(85);

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded.unwrap(), config);
    }
}
