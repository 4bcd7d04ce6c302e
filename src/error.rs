//! # Error Types
//!
//! Custom error types for Arm Link using `thiserror`.

use thiserror::Error;

/// Main error type for Arm Link
#[derive(Debug, Error)]
pub enum ArmLinkError {
    /// No usable serial port was found (message lists every port seen)
    #[error("Serial port not found: {0}")]
    SerialPortNotFound(String),

    /// Serial port open or enumeration failure
    #[error("Serial error: {0}")]
    Serial(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a received line could not be turned into a protocol value.
///
/// These never leave the protocol boundary: the command channel maps them to
/// "no reply" and the telemetry dispatcher logs and drops the line.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("line exceeds maximum length ({0} bytes)")]
    LineTooLong(usize),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("malformed telemetry: {0}")]
    MalformedTelemetry(String),
}

/// Result type alias for Arm Link
pub type Result<T> = std::result::Result<T, ArmLinkError>;
