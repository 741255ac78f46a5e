// src/io/serial/transport.rs
//
// Transport capability consumed by the session, and its serialport-backed
// implementation.

use std::io::{self, Read, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::SerialPort;

use super::utils::{to_serialport_data_bits, to_serialport_parity, to_serialport_stop_bits, Parity};
use crate::io::error::IoError;

// ============================================================================
// Types and Configuration
// ============================================================================

/// Serial link settings handed to `Transport::open`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Serial baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8) - defaults to 8
    pub data_bits: u8,
    /// Stop bits (1, 2) - defaults to 1
    pub stop_bits: u8,
    pub parity: Parity,
    /// Upper bound on a single blocking read
    pub read_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            read_timeout_ms: 100,
        }
    }
}

impl LinkConfig {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

// ============================================================================
// Transport Traits
// ============================================================================

/// Something that can open byte links to named endpoints.
pub trait Transport: Send + Sync {
    /// Open `endpoint` (e.g. "/dev/ttyACM0", "COM3") with the given settings
    fn open(&self, endpoint: &str, config: &LinkConfig) -> Result<Box<dyn Link>, IoError>;

    /// Endpoints currently present on the host, in host order
    fn list_endpoints(&self) -> Result<Vec<String>, IoError>;
}

/// One open byte link. Reads return within the link's read timeout.
pub trait Link: Send {
    fn is_open(&self) -> bool;

    /// Bytes that can be read right now without waiting
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes; `Ok(0)` means nothing arrived
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Release the underlying device. Further calls fail with `NotConnected`.
    fn close(&mut self);
}

// ============================================================================
// Serial Transport
// ============================================================================

/// Transport over host serial ports
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialTransport;

impl Transport for SerialTransport {
    fn open(&self, endpoint: &str, config: &LinkConfig) -> Result<Box<dyn Link>, IoError> {
        let port = serialport::new(endpoint, config.baud_rate)
            .data_bits(to_serialport_data_bits(config.data_bits))
            .stop_bits(to_serialport_stop_bits(config.stop_bits))
            .parity(to_serialport_parity(config.parity))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .map_err(|e| IoError::connection(endpoint, e.to_string()))?;

        tlog!(
            "serial"; "Opened {} at {} baud ({}-{}-{})",
            endpoint,
            config.baud_rate,
            config.data_bits,
            match config.parity {
                Parity::None => 'N',
                Parity::Odd => 'O',
                Parity::Even => 'E',
            },
            config.stop_bits
        );

        Ok(Box::new(SerialLink {
            port: Some(port),
            endpoint: endpoint.to_string(),
        }))
    }

    fn list_endpoints(&self) -> Result<Vec<String>, IoError> {
        list_serial_ports()
    }
}

struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
    endpoint: String,
}

impl SerialLink {
    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
    }
}

impl Link for SerialLink {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let n = self.port()?.bytes_to_read().map_err(io::Error::from)?;
        Ok(n as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port()?.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tlog!("serial"; "Closed {}", self.endpoint);
        }
    }
}

/// List serial port names available on the host.
pub fn list_serial_ports() -> Result<Vec<String>, IoError> {
    let ports = serialport::available_ports()
        .map_err(|e| IoError::unexpected(format!("Failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        // On macOS, filter out /dev/tty.* devices - only show /dev/cu.* (calling unit)
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| p.port_name)
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_config_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.data_bits, 8);
        assert_eq!(config.stop_bits, 1);
        assert_eq!(config.parity, Parity::None);
        assert!(config.read_timeout_ms <= 100);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let err = SerialTransport
            .open("/dev/this-port-does-not-exist", &LinkConfig::default())
            .err()
            .expect("opening a missing port must fail");
        assert!(matches!(err, IoError::Connection { ref device, .. } if device == "/dev/this-port-does-not-exist"));
    }
}
