// src/io/mod.rs
//
// IO layer for the serial CAN bridge: frame types, the line codec,
// stream reassembly and the transport session that drives them.

// Core modules
pub mod codec; // Line codec trait
mod error;
mod types;

// Drivers
pub mod canbus; // CanBus text protocol (codec, reassembler, session)
pub mod serial; // Serial transport over the serialport crate

pub use codec::LineCodec;
pub use error::{IoError, ParseError};
pub use types::{CallbackSink, ConnectionState, EventSink, SessionEvent};

pub use canbus::{
    format_canbus_line, parse_canbus_line, CanBusCodec, OverflowPolicy, ReassemblerConfig,
    SessionConfig, StreamEvent, StreamReassembler, TransportSession,
};
pub use serial::{Link, LinkConfig, Parity, SerialTransport, Transport};

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Shared Types
// ============================================================================

/// Which way a frame travelled relative to this host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the adapter ("Rx")
    Inbound,
    /// Sent by the adapter or by us ("Tx")
    Outbound,
}

impl Direction {
    /// Wire token for this direction
    pub fn as_token(self) -> &'static str {
        match self {
            Direction::Inbound => "Rx",
            Direction::Outbound => "Tx",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// One CAN-bus message observed on, or destined for, the serial link.
///
/// Equality compares `direction`, `identifier` and `payload` only. The
/// `raw_text` is the line the frame came from (inbound) or its canonical
/// formatting (outbound).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frame {
    pub direction: Direction,
    /// CAN arbitration ID. No range check beyond fitting in 32 bits.
    pub identifier: u32,
    /// Data bytes. Length is not limited to 8 here.
    pub payload: Vec<u8>,
    pub raw_text: String,
}

impl Frame {
    /// Build a frame whose `raw_text` is its canonical wire line
    pub fn new(direction: Direction, identifier: u32, payload: Vec<u8>) -> Self {
        let mut frame = Frame {
            direction,
            identifier,
            payload,
            raw_text: String::new(),
        };
        frame.raw_text = format_canbus_line(&frame);
        frame
    }

    /// Build a frame to be sent by the caller
    pub fn outbound(identifier: u32, payload: Vec<u8>) -> Self {
        Frame::new(Direction::Outbound, identifier, payload)
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.direction == other.direction
            && self.identifier == other.identifier
            && self.payload == other.payload
    }
}

impl Eq for Frame {}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CAN {} ID=0x{:03X} Data=[", self.direction, self.identifier)?;
        for (i, byte) in self.payload.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        f.write_str("]")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_new_derives_raw_text() {
        let frame = Frame::outbound(0x610, vec![0xAA, 0xBB]);
        assert_eq!(frame.raw_text, "CanBus Tx 0x610 AA BB");
        assert_eq!(frame.direction, Direction::Outbound);
    }

    #[test]
    fn test_frame_equality_ignores_raw_text() {
        let a = Frame::new(Direction::Inbound, 0x618, vec![0x12]);
        let mut b = a.clone();
        b.raw_text = "canbus rx 618 12".to_string();
        assert_eq!(a, b);

        let c = Frame::new(Direction::Outbound, 0x618, vec![0x12]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_frame_display() {
        let frame = Frame::new(Direction::Inbound, 0x18, vec![0x12, 0x34, 0x56]);
        assert_eq!(frame.to_string(), "CAN Rx ID=0x018 Data=[12 34 56]");

        let empty = Frame::outbound(0x7FF, Vec::new());
        assert_eq!(empty.to_string(), "CAN Tx ID=0x7FF Data=[]");
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        let json = serde_json::to_string(&Direction::Inbound).unwrap();
        assert_eq!(json, "\"inbound\"");
    }
}
