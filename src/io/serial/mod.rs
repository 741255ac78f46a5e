// src/io/serial/mod.rs
//
// Serial transport for the CanBus bridge.
//
// Features:
// - Transport/Link traits the session consumes (open, read, write, close)
// - serialport-backed implementation with short-timeout reads
// - Host port enumeration

pub mod transport;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod mock;

pub use transport::{list_serial_ports, Link, LinkConfig, SerialTransport, Transport};
pub use utils::Parity;
