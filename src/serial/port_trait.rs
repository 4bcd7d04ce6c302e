//! Trait abstraction for serial port operations to enable testing

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Duplex byte stream to the controller.
///
/// Implemented for anything that can be read and written asynchronously:
/// a `tokio_serial::SerialStream` in production, `tokio::io::duplex` or a
/// `tokio_test` mock in tests.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Boxed transport owned by a connection
pub type BoxedTransport = Box<dyn Transport>;

/// A serial port visible to the operating system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device name (e.g. `/dev/ttyUSB0`, `COM3`)
    pub name: String,
    /// Human-readable description (USB product, manufacturer, VID:PID)
    pub description: String,
}

impl PortInfo {
    /// Whether the description names one of the given adapter keywords
    ///
    /// Matching is case-insensitive substring search.
    pub fn matches_any(&self, keywords: &[String]) -> bool {
        let description = self.description.to_uppercase();
        keywords
            .iter()
            .any(|keyword| description.contains(&keyword.to_uppercase()))
    }
}

/// Line settings applied when opening a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    pub baud_rate: u32,
    /// Transport-level read timeout
    pub timeout: Duration,
}

/// Port enumeration and opening
#[cfg_attr(test, mockall::automock)]
pub trait SerialBackend: Send + Sync {
    /// List the serial ports present on the system
    fn available_ports(&self) -> Result<Vec<PortInfo>>;

    /// Open a port with the given settings
    fn open(&self, path: &str, settings: &PortSettings) -> Result<BoxedTransport>;
}
