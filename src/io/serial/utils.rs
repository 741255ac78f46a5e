// src/io/serial/utils.rs
//
// Conversions between our serial settings and the serialport crate's types,
// plus read error classification for the session loop.

use std::io::ErrorKind;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity as SpParity, StopBits};

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// How the session loop treats an error returned by a link read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReadErrorClass {
    /// Timeout or interruption: the same as no data
    NoData,
    /// Glitch on an otherwise healthy link (framing, parity)
    Transient,
    /// The link is gone
    Fatal,
}

// ============================================================================
// Conversion Functions
// ============================================================================

pub(crate) fn to_serialport_parity(p: Parity) -> SpParity {
    match p {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

/// Convert data bits count to serialport crate's DataBits type
pub(crate) fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

/// Convert stop bits count to serialport crate's StopBits type
pub(crate) fn to_serialport_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

pub(crate) fn classify_read_error(kind: ErrorKind) -> ReadErrorClass {
    match kind {
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => {
            ReadErrorClass::NoData
        }
        ErrorKind::InvalidData | ErrorKind::InvalidInput => ReadErrorClass::Transient,
        _ => ReadErrorClass::Fatal,
    }
}

// ============================================================================
// Tests
// ============================================================================
