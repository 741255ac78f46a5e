// src/io/codec.rs
//
// Line codec trait.
//
// A line codec converts one complete text line (terminator already removed)
// into a Frame, and a Frame back into its wire line. Stream handling lives in
// the reassembler, which is generic over this trait. The CanBus text protocol
// is implemented in canbus/codec.rs.

use crate::io::error::ParseError;
use crate::io::Frame;

// ============================================================================
// Line Codec Trait
// ============================================================================

/// Trait for line-oriented frame codecs.
pub trait LineCodec {
    /// Parse one line into a frame.
    ///
    /// Implementations must be pure: the same input always yields the same
    /// result and nothing outside the return value changes.
    fn parse(line: &str) -> Result<Frame, ParseError>;

    /// Format a frame as a wire line, without the line terminator.
    fn format(frame: &Frame) -> String;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{CanBusCodec, Direction};

    fn roundtrip<C: LineCodec>(frame: &Frame) -> Frame {
        C::parse(&C::format(frame)).expect("formatted line must parse")
    }

    #[test]
    fn test_canbus_codec_through_trait() {
        let frame = Frame::new(Direction::Outbound, 0x123, vec![0x11, 0x22, 0x33, 0x44]);
        let decoded = roundtrip::<CanBusCodec>(&frame);
        assert_eq!(decoded, frame);
        assert!(CanBusCodec::format(&frame).starts_with("CanBus Tx 0x123"));
    }
}
