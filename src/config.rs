//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{ArmLinkError, Result};
use crate::serial::PortSettings;

/// Main configuration structure
///
/// Every section is optional; an empty file yields [`Config::default`].
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SerialConfig {
    /// Port to open; empty means auto-detect by `port_keywords`
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Transport-level read timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Wait after opening while the controller reboots
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_port_keywords")]
    pub port_keywords: Vec<String>,
}

/// Command/reply protocol configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProtocolConfig {
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,

    /// Treat telemetry arriving before a reply as an acknowledgement
    #[serde(default = "default_ack_on_telemetry")]
    pub ack_on_telemetry: bool,

    /// How long disconnect waits for the reader task
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TelemetryConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for a daily rolling log file; empty logs to the console only
    #[serde(default)]
    pub log_dir: String,

    /// Number of TX/RX lines kept in memory
    #[serde(default = "default_traffic_history")]
    pub traffic_history: usize,
}

// Default value functions
fn default_baud_rate() -> u32 { 115200 }
fn default_timeout_ms() -> u64 { 1000 }
fn default_settle_ms() -> u64 { 2000 }
fn default_port_keywords() -> Vec<String> {
    crate::serial::DEFAULT_PORT_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

fn default_reply_timeout_ms() -> u64 { 2000 }
fn default_max_line_len() -> usize { 4096 }
fn default_ack_on_telemetry() -> bool { true }
fn default_stop_timeout_ms() -> u64 { 1000 }

fn default_channel_capacity() -> usize { 64 }

fn default_log_level() -> String { "info".to_string() }
fn default_traffic_history() -> usize { 500 }

const VALID_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            settle_ms: default_settle_ms(),
            port_keywords: default_port_keywords(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: default_reply_timeout_ms(),
            max_line_len: default_max_line_len(),
            ack_on_telemetry: default_ack_on_telemetry(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
            traffic_history: default_traffic_history(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> ArmLinkError {
    ArmLinkError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use arm_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if !VALID_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                VALID_BAUD_RATES
            )));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        if self.serial.settle_ms > 10000 {
            return Err(invalid("settle_ms must be between 0 and 10000"));
        }

        // Auto-detect needs something to look for
        if self.serial.port.is_empty() && self.serial.port_keywords.is_empty() {
            return Err(invalid("port_keywords cannot be empty when no port is set"));
        }

        if self.serial.port_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(invalid("port_keywords cannot contain empty keywords"));
        }

        if self.protocol.reply_timeout_ms == 0 || self.protocol.reply_timeout_ms > 60000 {
            return Err(invalid("reply_timeout_ms must be between 1 and 60000"));
        }

        if self.protocol.max_line_len < 64 || self.protocol.max_line_len > 65536 {
            return Err(invalid("max_line_len must be between 64 and 65536"));
        }

        if self.protocol.stop_timeout_ms == 0 || self.protocol.stop_timeout_ms > 10000 {
            return Err(invalid("stop_timeout_ms must be between 1 and 10000"));
        }

        if self.telemetry.channel_capacity == 0 {
            return Err(invalid("channel_capacity must be greater than 0"));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "log level must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.logging.traffic_history == 0 {
            return Err(invalid("traffic_history must be greater than 0"));
        }

        Ok(())
    }

    /// Settings handed to the serial backend
    pub fn port_settings(&self) -> PortSettings {
        PortSettings {
            baud_rate: self.serial.baud_rate,
            timeout: Duration::from_millis(self.serial.timeout_ms),
        }
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.serial.settle_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.protocol.reply_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.protocol.stop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_equals_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let sample = include_str!("../config/default.toml");
        assert_eq!(Config::from_toml(sample).unwrap(), Config::default());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyUSB0"
settle_ms = 0

[protocol]
ack_on_telemetry = false

[logging]
level = "debug"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.settle_ms, 0);
        assert_eq!(config.serial.baud_rate, 115200);
        assert!(!config.protocol.ack_on_telemetry);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/arm-link.toml");
        assert!(matches!(result, Err(ArmLinkError::Io(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml("[serial\nport = 1");
        assert!(matches!(result, Err(ArmLinkError::Config(_))));
    }

    #[test]
    fn test_wrong_type() {
        let result = Config::from_toml("[serial]\nbaud_rate = \"fast\"");
        assert!(matches!(result, Err(ArmLinkError::Config(_))));
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = Config::default();
        config.serial.baud_rate = 420000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_baud_rates() {
        for &baud in VALID_BAUD_RATES {
            let mut config = Config::default();
            config.serial.baud_rate = baud;
            assert!(config.validate().is_ok(), "Baud rate {} should be valid", baud);
        }
    }

    #[test]
    fn test_timeout_ms_range() {
        let mut config = Config::default();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());
        config.serial.timeout_ms = 10001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settle_ms_zero_allowed() {
        let mut config = Config::default();
        config.serial.settle_ms = 0;
        assert!(config.validate().is_ok());
        config.serial.settle_ms = 10001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_keywords_required_for_auto_detect() {
        let mut config = Config::default();
        config.serial.port_keywords.clear();
        assert!(config.validate().is_err());

        config.serial.port = "/dev/ttyACM0".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_keyword_rejected() {
        let mut config = Config::default();
        config.serial.port_keywords.push("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reply_timeout_range() {
        let mut config = Config::default();
        config.protocol.reply_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.protocol.reply_timeout_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_line_len_range() {
        let mut config = Config::default();
        config.protocol.max_line_len = 63;
        assert!(config.validate().is_err());
        config.protocol.max_line_len = 65537;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stop_timeout_zero() {
        let mut config = Config::default();
        config.protocol.stop_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_channel_capacity_zero() {
        let mut config = Config::default();
        config.telemetry.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_traffic_history_zero() {
        let mut config = Config::default();
        config.logging.traffic_history = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_durations() {
        let config = Config::default();
        assert_eq!(config.settle_time(), Duration::from_secs(2));
        assert_eq!(config.reply_timeout(), Duration::from_secs(2));
        assert_eq!(config.stop_timeout(), Duration::from_secs(1));
        assert_eq!(
            config.port_settings(),
            PortSettings {
                baud_rate: 115200,
                timeout: Duration::from_secs(1),
            }
        );
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_baud_rate(), 115200);
        assert_eq!(default_timeout_ms(), 1000);
        assert_eq!(default_settle_ms(), 2000);
        assert_eq!(default_port_keywords(), vec!["ESP32", "CP210", "CH340", "FTDI"]);
        assert_eq!(default_reply_timeout_ms(), 2000);
        assert_eq!(default_max_line_len(), 4096);
        assert_eq!(default_ack_on_telemetry(), true);
        assert_eq!(default_stop_timeout_ms(), 1000);
        assert_eq!(default_channel_capacity(), 64);
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_traffic_history(), 500);
    }
}
