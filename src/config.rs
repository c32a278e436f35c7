//! Configuration loading using Figment.
//!
//! Configuration is layered from:
//! 1. a TOML file (`config/sirius.toml` by default)
//! 2. environment variables prefixed with `SIRIUS_DAQ_`, using `__` to
//!    separate nesting levels (`SIRIUS_DAQ_DEVICE__SAMPLE_RATE=2000`)
//!
//! Channels are an array of tables so that channel indices stay explicit
//! and declaration order is preserved:
//!
//! ```toml
//! [[channels]]
//! index = 0
//! Name = "acc_X"
//! Measurement = "IEPE"
//! Range = 10000
//! Sensitivity = 100
//! "Sensitivity Unit" = "mV/g"
//! Unit = "g"
//! ```
//!
//! # Example
//! ```no_run
//! use sirius_daq::config::SiriusConfig;
//!
//! # fn main() -> sirius_daq::Result<()> {
//! let config = SiriusConfig::load()?;
//! config.validate()?;
//! println!("Device: {}", config.device.connection_string);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::channel::{ChannelConfigMap, ChannelSettings};
use crate::driver::simulated::SimulatedDeviceConfig;
use crate::error::{Result, SiriusError};
use crate::logging::{self, LogFormat};
use crate::session::{OutputFormat, TIME_KEY};

/// Configuration file used by [`SiriusConfig::load`].
pub const DEFAULT_CONFIG_PATH: &str = "config/sirius.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "SIRIUS_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiriusConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Device connection settings
    #[serde(default)]
    pub device: DeviceConfig,
    /// Acquisition settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Simulated hardware, used when no real transport is available
    #[serde(default)]
    pub simulation: SimulatedDeviceConfig,
    /// Channel settings, in output column order
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Device connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Address of the device
    #[serde(default = "default_connection_string")]
    pub connection_string: String,
    /// Requested sample rate in Hz (the device may quantize it)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
}

/// Acquisition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Acquisition length (e.g. "2s", "500ms")
    #[serde(with = "humantime_serde", default = "default_duration")]
    pub duration: Duration,
    /// Output shape
    #[serde(default)]
    pub output: OutputFormat,
}

/// Settings of one channel, with its device index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEntry {
    /// 0-based channel index on the device
    pub index: usize,
    /// Channel settings
    #[serde(flatten)]
    pub settings: ChannelSettings,
}

// Default value functions
fn default_app_name() -> String {
    "Sirius DAQ".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connection_string() -> String {
    SimulatedDeviceConfig::default().connection_string
}

fn default_sample_rate() -> f64 {
    1000.0
}

fn default_duration() -> Duration {
    Duration::from_secs(1)
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            connection_string: default_connection_string(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            output: OutputFormat::default(),
        }
    }
}

impl SiriusConfig {
    /// Load configuration from `config/sirius.toml` and the environment.
    ///
    /// Environment variables override the file, e.g.
    /// `SIRIUS_DAQ_APPLICATION__LOG_LEVEL=debug`.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path and the environment.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        logging::parse_log_level(&self.application.log_level)?;

        if self.device.connection_string.trim().is_empty() {
            return Err(invalid("device.connection_string must not be empty"));
        }

        if !(self.device.sample_rate.is_finite() && self.device.sample_rate > 0.0) {
            return Err(invalid(format!(
                "Invalid sample_rate {}. Must be a positive number of Hz",
                self.device.sample_rate
            )));
        }

        if self.acquisition.duration.is_zero() {
            return Err(invalid("acquisition.duration must be greater than zero"));
        }

        // Channel indices and names must be unique; names key labeled output
        let mut indices = HashSet::new();
        let mut names = HashSet::new();
        for entry in &self.channels {
            if !indices.insert(entry.index) {
                return Err(invalid(format!("Duplicate channel index: {}", entry.index)));
            }
            if let Some(name) = &entry.settings.name {
                if name == TIME_KEY {
                    return Err(invalid(format!(
                        "Channel {} uses the reserved name '{}'",
                        entry.index, TIME_KEY
                    )));
                }
                if !names.insert(name.as_str()) {
                    return Err(invalid(format!("Duplicate channel name: {}", name)));
                }
            }
            if let Some(sensitivity) = entry.settings.sensitivity {
                if sensitivity == 0.0 || !sensitivity.is_finite() {
                    return Err(invalid(format!(
                        "Channel {} has invalid Sensitivity {}",
                        entry.index, sensitivity
                    )));
                }
            }
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| invalid(format!("Cannot render configuration: {}", e)))
    }

    /// Channel settings as an ordered map, in declaration order.
    pub fn channel_map(&self) -> ChannelConfigMap {
        self.channels
            .iter()
            .map(|entry| (entry.index, entry.settings.clone()))
            .collect()
    }
}

fn invalid(message: impl Into<String>) -> SiriusError {
    SiriusError::InvalidConfig {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::PropertyValue;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EXAMPLE: &str = r#"
[application]
name = "Test rig"
log_level = "debug"

[device]
connection_string = "daq.sim://sirius-1"
sample_rate = 2000

[acquisition]
duration = "2s"
output = "labeled"

[[channels]]
index = 3
Name = "acc_X"
Measurement = "IEPE"
Range = 10000
HPFilter = "AC 1Hz"
Excitation = 2.0
Sensitivity = 100
"Sensitivity Unit" = "mV/g"
Unit = "g"

[[channels]]
index = 0
Name = "vol_1"
Measurement = "Voltage"
Range = 10
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn valid_config() -> SiriusConfig {
        SiriusConfig {
            channels: vec![ChannelEntry {
                index: 0,
                settings: ChannelSettings::new().with_name("acc_X"),
            }],
            ..Default::default()
        }
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let file = write_config(EXAMPLE);
        let config = SiriusConfig::load_from(file.path()).unwrap();

        assert_eq!(config.application.name, "Test rig");
        assert_eq!(config.device.sample_rate, 2000.0);
        assert_eq!(config.acquisition.duration, Duration::from_secs(2));
        assert_eq!(config.acquisition.output, OutputFormat::Labeled);
        assert_eq!(config.channels.len(), 2);

        let first = &config.channels[0].settings;
        assert_eq!(first.name.as_deref(), Some("acc_X"));
        assert_eq!(first.range, Some(PropertyValue::Integer(10000)));
        assert_eq!(first.sensitivity(), 100.0);
        assert_eq!(first.sensitivity_unit(), "mV/g");
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_channel_map_keeps_declaration_order() {
        let file = write_config(EXAMPLE);
        let config = SiriusConfig::load_from(file.path()).unwrap();
        let map = config.channel_map();
        assert_eq!(map.channels().collect::<Vec<_>>(), vec![3, 0]);
        assert_eq!(map.get(0).unwrap().unit(), "V");
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SiriusConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.device.connection_string, "daq.sim://sirius-1");
        assert!(config.channels.is_empty());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = write_config(EXAMPLE);
        std::env::set_var("SIRIUS_DAQ_DEVICE__SAMPLE_RATE", "5000");
        let result = SiriusConfig::load_from(file.path());
        std::env::remove_var("SIRIUS_DAQ_DEVICE__SAMPLE_RATE");

        assert_eq!(result.unwrap().device.sample_rate, 5000.0);
    }

    #[test]
    #[serial]
    fn test_to_toml_lists_channels() {
        let file = write_config(EXAMPLE);
        let config = SiriusConfig::load_from(file.path()).unwrap();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[[channels]]"));
        assert!(rendered.contains("index = 3"));
        assert!(rendered.contains("duration = \"2s\""));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_channel_indices() {
        let mut config = valid_config();
        config.channels.push(ChannelEntry {
            index: 0,
            settings: ChannelSettings::new(),
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate channel index: 0"));
    }

    #[test]
    fn test_duplicate_and_reserved_channel_names() {
        let mut config = valid_config();
        config.channels.push(ChannelEntry {
            index: 1,
            settings: ChannelSettings::new().with_name("acc_X"),
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate channel name: acc_X"));

        let mut config = valid_config();
        config.channels.push(ChannelEntry {
            index: 1,
            settings: ChannelSettings::new().with_name("time"),
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reserved name 'time'"));

        // Unnamed channels are fine
        let mut config = valid_config();
        config.channels.push(ChannelEntry {
            index: 1,
            settings: ChannelSettings::new(),
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_rates_and_durations() {
        let mut config = valid_config();
        config.device.sample_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.acquisition.duration = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.channels[0].settings.sensitivity = Some(0.0);
        assert!(config.validate().is_err());
    }
}
