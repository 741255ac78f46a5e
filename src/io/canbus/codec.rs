// src/io/canbus/codec.rs
//
// CanBus text line codec.
//
// Line format (keyword, direction and hex digits are case-insensitive):
//   CanBus <Rx|Tx> [0x]<ID:hex> <DATA:2hex> <DATA:2hex> ...
//
// Examples:
//   CanBus Rx 0x618 12 34 56 78 9A BC DE F0
//   CanBus Tx 610 AA BB CC DD

use crate::io::codec::LineCodec;
use crate::io::error::ParseError;
use crate::io::{Direction, Frame};

const KEYWORD: &str = "CanBus";

/// CanBus text line codec.
pub struct CanBusCodec;

impl LineCodec for CanBusCodec {
    fn parse(line: &str) -> Result<Frame, ParseError> {
        parse_canbus_line(line)
    }

    fn format(frame: &Frame) -> String {
        format_canbus_line(frame)
    }
}

/// Parse a single CanBus line.
///
/// Leading and trailing whitespace (including a stray `\r`) is ignored. The
/// returned frame keeps `line` exactly as given in `raw_text`. A line with
/// no data tokens is a valid frame with an empty payload.
pub fn parse_canbus_line(line: &str) -> Result<Frame, ParseError> {
    let mut tokens = line.trim().split_whitespace();

    match tokens.next() {
        Some(keyword) if keyword.eq_ignore_ascii_case(KEYWORD) => {}
        _ => return Err(ParseError::NoMatch),
    }

    let direction = match tokens.next() {
        Some(t) if t.eq_ignore_ascii_case("rx") => Direction::Inbound,
        Some(t) if t.eq_ignore_ascii_case("tx") => Direction::Outbound,
        _ => return Err(ParseError::NoMatch),
    };

    let id_token = tokens.next().ok_or(ParseError::NoMatch)?;
    let id_digits = strip_hex_prefix(id_token);
    if id_digits.is_empty() || !id_digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseError::NoMatch);
    }
    let identifier = u32::from_str_radix(id_digits, 16)
        .map_err(|_| ParseError::InvalidId(id_token.to_string()))?;

    let payload = tokens
        .map(parse_data_byte)
        .collect::<Result<Vec<u8>, ParseError>>()?;

    Ok(Frame {
        direction,
        identifier,
        payload,
        raw_text: line.to_string(),
    })
}

/// Format a frame as a canonical CanBus line (no terminator).
///
/// The ID is uppercase hex padded to at least three digits; each data byte
/// is two uppercase hex digits separated by single spaces.
pub fn format_canbus_line(frame: &Frame) -> String {
    let mut line = String::with_capacity(20 + frame.payload.len() * 3);
    line.push_str(KEYWORD);
    line.push(' ');
    line.push_str(frame.direction.as_token());
    line.push_str(&format!(" 0x{:03X}", frame.identifier));
    for byte in &frame.payload {
        line.push_str(&format!(" {:02X}", byte));
    }
    line
}

fn strip_hex_prefix(token: &str) -> &str {
    match token.get(..2) {
        Some(prefix) if token.len() > 2 && prefix.eq_ignore_ascii_case("0x") => &token[2..],
        _ => token,
    }
}

fn parse_data_byte(token: &str) -> Result<u8, ParseError> {
    if token.len() != 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseError::InvalidByte(token.to_string()));
    }
    u8::from_str_radix(token, 16).map_err(|_| ParseError::InvalidByte(token.to_string()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rx_frame() {
        let frame = parse_canbus_line("CanBus Rx 0x618 12 34 56 78 9A BC DE F0").unwrap();
        assert_eq!(frame.direction, Direction::Inbound);
        assert_eq!(frame.identifier, 0x618);
        assert_eq!(
            frame.payload,
            vec![0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0]
        );
    }

    #[test]
    fn test_parse_tx_without_prefix() {
        let frame = parse_canbus_line("CanBus Tx 610 AA BB CC DD EE FF").unwrap();
        assert_eq!(frame.direction, Direction::Outbound);
        assert_eq!(frame.identifier, 0x610);
        assert_eq!(frame.payload.len(), 6);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let frame = parse_canbus_line("canbus rX 0X7ff aa Bb").unwrap();
        assert_eq!(frame.direction, Direction::Inbound);
        assert_eq!(frame.identifier, 0x7FF);
        assert_eq!(frame.payload, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_parse_keeps_raw_text_untrimmed() {
        let line = "  CanBus Rx 0x1 AA\r";
        let frame = parse_canbus_line(line).unwrap();
        assert_eq!(frame.raw_text, line);
        assert_eq!(frame.payload, vec![0xAA]);
    }

    #[test]
    fn test_parse_zero_bytes_is_empty_payload() {
        let frame = parse_canbus_line("CanBus Tx 0x123").unwrap();
        assert_eq!(frame.identifier, 0x123);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_parse_no_match() {
        assert_eq!(parse_canbus_line(""), Err(ParseError::NoMatch));
        assert_eq!(parse_canbus_line("garbage line"), Err(ParseError::NoMatch));
        assert_eq!(parse_canbus_line("CanBus"), Err(ParseError::NoMatch));
        assert_eq!(parse_canbus_line("CanBus Xx 0x1 AA"), Err(ParseError::NoMatch));
        assert_eq!(parse_canbus_line("CanBus Rx"), Err(ParseError::NoMatch));
        assert_eq!(parse_canbus_line("CanBus Rx 0xZZ AA"), Err(ParseError::NoMatch));
        assert_eq!(parse_canbus_line("CanBus Rx 0x AA"), Err(ParseError::NoMatch));
        assert_eq!(parse_canbus_line("CanBusRx 0x1 AA"), Err(ParseError::NoMatch));
    }

    #[test]
    fn test_parse_invalid_id_overflow() {
        assert_eq!(
            parse_canbus_line("CanBus Rx 0x123456789 AA"),
            Err(ParseError::InvalidId("0x123456789".to_string()))
        );
        // Leading zeros do not overflow
        let frame = parse_canbus_line("CanBus Rx 0000000618 AA").unwrap();
        assert_eq!(frame.identifier, 0x618);
    }

    #[test]
    fn test_parse_invalid_bytes() {
        assert_eq!(
            parse_canbus_line("CanBus Rx 0x618 12 345"),
            Err(ParseError::InvalidByte("345".to_string()))
        );
        assert_eq!(
            parse_canbus_line("CanBus Rx 0x618 1234"),
            Err(ParseError::InvalidByte("1234".to_string()))
        );
        assert_eq!(
            parse_canbus_line("CanBus Rx 0x618 A"),
            Err(ParseError::InvalidByte("A".to_string()))
        );
        assert_eq!(
            parse_canbus_line("CanBus Rx 0x618 12 zz"),
            Err(ParseError::InvalidByte("zz".to_string()))
        );
    }

    #[test]
    fn test_format_pads_id_and_bytes() {
        let frame = Frame::outbound(0x18, vec![0x01, 0xAB]);
        assert_eq!(format_canbus_line(&frame), "CanBus Tx 0x018 01 AB");

        let frame = Frame::new(Direction::Inbound, 0x1ABCDEF0, vec![0x00]);
        assert_eq!(format_canbus_line(&frame), "CanBus Rx 0x1ABCDEF0 00");
    }

    #[test]
    fn test_format_empty_payload() {
        let frame = Frame::outbound(0x610, Vec::new());
        assert_eq!(format_canbus_line(&frame), "CanBus Tx 0x610");
    }

    #[test]
    fn test_quirky_line_reformats_canonically() {
        let parsed = parse_canbus_line("canbus tx 1f ab cd").unwrap();
        let canonical = format_canbus_line(&parsed);
        assert_eq!(canonical, "CanBus Tx 0x01F AB CD");

        let reparsed = parse_canbus_line(&canonical).unwrap();
        assert_eq!(reparsed, parsed);
        assert_eq!(format_canbus_line(&reparsed), canonical);
    }

    #[test]
    fn test_roundtrip_identifier_extremes() {
        for identifier in [0u32, 1, 0x7FF, 0x800, 0x1FFF_FFFF, u32::MAX] {
            for len in [0usize, 1, 8] {
                let payload: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37)).collect();
                let frame = Frame::new(Direction::Inbound, identifier, payload.clone());
                let decoded = parse_canbus_line(&format_canbus_line(&frame)).unwrap();
                assert_eq!(decoded.identifier, identifier);
                assert_eq!(decoded.payload, payload);
            }
        }
    }
}
