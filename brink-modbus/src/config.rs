//! Configuration for the polling engine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Baud rates the Brink serial interface can be configured for.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 19_200, 38_400, 57_600, 115_200];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete configuration for one ventilation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Serial link settings
    pub link: LinkConfig,

    /// Poll cadence and transport envelope
    #[serde(default)]
    pub poll: PollConfig,

    /// Unit model, for display purposes
    #[serde(default)]
    pub model: Model,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial link parameters. Framing is fixed at 8E1 by the unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0")
    pub port: String,

    /// Baud rate (default: 19200, the factory setting)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Modbus unit/slave ID, 1-247 (default: 20, the factory setting)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
}

fn default_baud_rate() -> u32 {
    19_200
}

fn default_unit_id() -> u8 {
    20
}

/// Poll cadence and per-operation transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between poll cycle starts (default: 10)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Per-attempt read/write timeout in seconds (default: 5)
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Transport retry budget per register operation (default: 3)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Settle delay after arming a mode register, in milliseconds (default: 500)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            retries: default_retries(),
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_interval_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    5
}

fn default_retries() -> u32 {
    3
}

fn default_settle_ms() -> u64 {
    500
}

impl PollConfig {
    /// Poll interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Per-attempt timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Mode settle delay as a [`Duration`].
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Supported unit models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    #[serde(rename = "flair_325")]
    Flair325,
    #[default]
    #[serde(rename = "flair_325_plus")]
    Flair325Plus,
    #[serde(rename = "flair_350")]
    Flair350,
    #[serde(rename = "flair_400")]
    Flair400,
}

impl Model {
    /// Return the display name for this model.
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Flair325 => "FLAIR 325",
            Model::Flair325Plus => "FLAIR 325 Plus",
            Model::Flair350 => "FLAIR 350",
            Model::Flair400 => "FLAIR 400",
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.port.is_empty() {
            return Err(ConfigError::Validation(
                "Serial port cannot be empty".to_string(),
            ));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.link.baud_rate) {
            return Err(ConfigError::Validation(format!(
                "Unsupported baud rate {} (use one of {:?})",
                self.link.baud_rate, SUPPORTED_BAUD_RATES
            )));
        }

        if self.link.unit_id == 0 || self.link.unit_id > 247 {
            return Err(ConfigError::Validation(
                "unit_id must be 1-247".to_string(),
            ));
        }

        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "interval_secs must be at least 1".to_string(),
            ));
        }

        if self.poll.read_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "read_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.poll.retries == 0 {
            return Err(ConfigError::Validation(
                "retries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{
            link: { port: "/dev/ttyUSB0" }
        }"#;

        let config: Config = json5::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.link.port, "/dev/ttyUSB0");
        assert_eq!(config.link.baud_rate, 19_200); // default
        assert_eq!(config.link.unit_id, 20); // default
        assert_eq!(config.poll.interval_secs, 10);
        assert_eq!(config.poll.read_timeout_secs, 5);
        assert_eq!(config.poll.retries, 3);
        assert_eq!(config.poll.settle_ms, 500);
        assert_eq!(config.model, Model::Flair325Plus);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            link: {
                port: "/dev/serial/by-id/usb-FTDI_USB-RS485",
                baud_rate: 38400,
                unit_id: 21,
            },
            poll: {
                interval_secs: 30,
                read_timeout_secs: 2,
                retries: 5,
                settle_ms: 250,
            },
            model: "flair_400",
            logging: { level: "debug" },
        }"#;

        let config: Config = json5::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.link.baud_rate, 38_400);
        assert_eq!(config.link.unit_id, 21);
        assert_eq!(config.poll.interval().as_secs(), 30);
        assert_eq!(config.poll.settle(), Duration::from_millis(250));
        assert_eq!(config.model, Model::Flair400);
        assert_eq!(config.model.as_str(), "FLAIR 400");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_reject_empty_port() {
        let json = r#"{ link: { port: "" } }"#;
        let config: Config = json5::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_reject_unsupported_baud_rate() {
        let json = r#"{ link: { port: "/dev/ttyUSB0", baud_rate: 14400 } }"#;
        let config: Config = json5::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_reject_invalid_unit_id() {
        for unit_id in [0u8, 248] {
            let json = format!(
                r#"{{ link: {{ port: "/dev/ttyUSB0", unit_id: {} }} }}"#,
                unit_id
            );
            let config: Config = json5::from_str(&json).unwrap();
            assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
        }
    }

    #[test]
    fn test_reject_zero_interval() {
        let json = r#"{
            link: { port: "/dev/ttyUSB0" },
            poll: { interval_secs: 0 },
        }"#;
        let config: Config = json5::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }
}
