//! # Serial Communication Module
//!
//! Handles the serial link to the arm's microcontroller.
//!
//! This module handles:
//! - Enumerating serial ports and describing them
//! - Picking the controller's USB adapter by keyword
//! - Opening the port at 115,200 baud, 8N1, with a read timeout

pub mod port_trait;

pub use port_trait::{BoxedTransport, PortInfo, PortSettings, SerialBackend, Transport};

use crate::error::{ArmLinkError, Result};
use std::time::Duration;
use tokio_serial::{SerialPortBuilderExt, SerialPortType};
use tracing::{debug, info};

/// Controller firmware baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Transport-level read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Description keywords identifying the controller's USB serial adapter
pub const DEFAULT_PORT_KEYWORDS: &[&str] = &["ESP32", "CP210", "CH340", "FTDI"];

/// Serial backend built on `tokio-serial`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSerialBackend;

impl SerialBackend for TokioSerialBackend {
    fn available_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| ArmLinkError::Serial(format!("Failed to enumerate ports: {}", e)))?;

        Ok(ports
            .into_iter()
            .map(|port| PortInfo {
                description: describe_port_type(&port.port_type),
                name: port.port_name,
            })
            .collect())
    }

    fn open(&self, path: &str, settings: &PortSettings) -> Result<BoxedTransport> {
        let port = tokio_serial::new(path, settings.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(settings.timeout)
            .open_native_async()
            .map_err(|e| ArmLinkError::Serial(format!("Failed to open {}: {}", path, e)))?;

        info!("Opened serial port {} at {} baud", path, settings.baud_rate);
        Ok(Box::new(port))
    }
}

/// Build a description string for a port
fn describe_port_type(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let mut parts = Vec::new();
            if let Some(product) = &usb.product {
                parts.push(product.clone());
            }
            if let Some(manufacturer) = &usb.manufacturer {
                parts.push(manufacturer.clone());
            }
            parts.push(format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid));
            parts.join(" - ")
        }
        SerialPortType::PciPort => "PCI serial port".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
        _ => "n/a".to_string(),
    }
}

/// Pick the first port whose description matches an adapter keyword
///
/// # Errors
///
/// Returns `SerialPortNotFound` listing every port seen when none match.
pub fn find_controller_port(ports: &[PortInfo], keywords: &[String]) -> Result<String> {
    for port in ports {
        debug!("Checking serial port {} ({})", port.name, port.description);
        if port.matches_any(keywords) {
            info!("Found controller adapter at {} ({})", port.name, port.description);
            return Ok(port.name.clone());
        }
    }

    let listing = if ports.is_empty() {
        "no serial ports available".to_string()
    } else {
        ports
            .iter()
            .map(|port| format!("{}: {}", port.name, port.description))
            .collect::<Vec<_>>()
            .join(", ")
    };

    Err(ArmLinkError::SerialPortNotFound(format!(
        "no port matched {:?}; available ports: {}",
        keywords, listing
    )))
}
