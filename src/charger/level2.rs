// src/charger/level2.rs
//
// Level 2: diagnostic request and replies. The BMS sends REQ naming the reply
// it wants; the charger answers on that ID.
//
//   0x61B  REQ   BMS -> charger  D0 bit 7 enable, D2-D3 requested ID
//   0x61C  FLTP  passive (inactive) fault, one frame per fault
//   0x61D  FLTA  active fault, one frame per fault
//   0x61E  SW    software version, 8 ASCII characters
//   0x61F  SN    serial number, 8 ASCII characters

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{be_u16, bit, require_len};
use crate::io::{Frame, IoError};

pub const CAN_ID_REQ: u32 = 0x61B;
pub const CAN_ID_FLTP: u32 = 0x61C;
pub const CAN_ID_FLTA: u32 = 0x61D;
pub const CAN_ID_SW: u32 = 0x61E;
pub const CAN_ID_SN: u32 = 0x61F;

/// REQ D2: high byte of every requested ID
const REQ_ID_MSB: u8 = 0x06;
const REQ_LEN: usize = 4;

/// D1-D7 all 0xFF marks a "no fault detected" reply
const NO_FAULT_FILL: u8 = 0xFF;

// ============================================================================
// REQ (0x61B)
// ============================================================================

/// Which reply a REQ asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestTarget {
    FaultInactive,
    FaultActive,
    SoftwareVersion,
    /// The charger also sends this once at start up
    SerialNumber,
}

impl RequestTarget {
    pub const ALL: [RequestTarget; 4] = [
        RequestTarget::FaultInactive,
        RequestTarget::FaultActive,
        RequestTarget::SoftwareVersion,
        RequestTarget::SerialNumber,
    ];

    /// Low byte of the reply ID, sent in REQ D3
    pub fn code(self) -> u8 {
        match self {
            RequestTarget::FaultInactive => 0x1C,
            RequestTarget::FaultActive => 0x1D,
            RequestTarget::SoftwareVersion => 0x1E,
            RequestTarget::SerialNumber => 0x1F,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|target| target.code() == code)
    }

    /// Identifier the charger answers on
    pub fn response_id(self) -> u32 {
        (u32::from(REQ_ID_MSB) << 8) | u32::from(self.code())
    }
}

impl fmt::Display for RequestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestTarget::FaultInactive => "inactive faults",
            RequestTarget::FaultActive => "active faults",
            RequestTarget::SoftwareVersion => "software version",
            RequestTarget::SerialNumber => "serial number",
        })
    }
}

/// Diagnostic request sent by the BMS
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargerRequest {
    pub enable: bool,
    pub target: RequestTarget,
}

impl ChargerRequest {
    /// An enabled request for `target`
    pub fn new(target: RequestTarget) -> Self {
        Self {
            enable: true,
            target,
        }
    }

    /// D0 bit 7 enable, D1 reserved, D2-D3 requested ID (0x061C-0x061F)
    pub fn encode(&self) -> [u8; REQ_LEN] {
        [
            if self.enable { 0x80 } else { 0x00 },
            0x00,
            REQ_ID_MSB,
            self.target.code(),
        ]
    }

    pub fn to_frame(&self) -> Frame {
        Frame::outbound(CAN_ID_REQ, self.encode().to_vec())
    }

    /// Decode a REQ echo
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        require_len("REQ", payload, REQ_LEN)?;
        let target = if payload[2] == REQ_ID_MSB {
            RequestTarget::from_code(payload[3])
        } else {
            None
        };
        let target = target.ok_or_else(|| {
            IoError::protocol(
                "REQ",
                format!("unknown requested id 0x{:02X}{:02X}", payload[2], payload[3]),
            )
        })?;
        Ok(Self {
            enable: bit(payload[0], 0x80),
            target,
        })
    }
}

// ============================================================================
// FLTP (0x61C) / FLTA (0x61D)
// ============================================================================

/// D0 bits 7-6
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultFrameType {
    /// Only one fault to report
    Single,
    /// One of several frames, see `frame_number` and `total_errors`
    Multi,
    Other(u8),
}

impl FaultFrameType {
    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => FaultFrameType::Single,
            2 => FaultFrameType::Multi,
            other => FaultFrameType::Other(other),
        }
    }
}

/// D3 bits 1-0
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureLevel {
    /// Charger keeps working, de-rated
    Warning,
    /// Charger stops and restarts once the fault clears
    Soft,
    /// Charger stops until AC is disconnected and reconnected
    Hard,
}

impl FailureLevel {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b10 => FailureLevel::Soft,
            0b11 => FailureLevel::Hard,
            _ => FailureLevel::Warning,
        }
    }
}

impl fmt::Display for FailureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureLevel::Warning => "warning",
            FailureLevel::Soft => "soft failure",
            FailureLevel::Hard => "hard failure",
        })
    }
}

/// One reported fault
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub frame_type: FaultFrameType,
    /// Faults in this report, 0-63
    pub total_errors: u8,
    /// Position of this frame in the report, 0-63
    pub frame_number: u8,
    pub fault_code: u8,
    /// Times this fault has occurred, 0-63
    pub occurrence: u8,
    pub level: FailureLevel,
    /// Operating hours at the first and latest occurrence
    pub first_time_h: u16,
    pub last_time_h: u16,
}

impl FaultRecord {
    pub fn name(&self) -> &'static str {
        fault_name(self.fault_code)
    }
}

/// Fault code description
pub fn fault_name(code: u8) -> &'static str {
    match code {
        0xA0 => "Bulk 1 Voltage",
        0xA1 => "Bulk 2 Voltage",
        0xA2 => "Bulk 3 Voltage",
        0xA3 => "Bulk Error",
        0xA4 => "CAN Registers",
        0xA5 => "CAN Command",
        0xA6 => "Cold Plate Temp LOW",
        0xA7 => "Cold Plate Temp DERATING",
        0xA8 => "Cold Plate Temp HIGH",
        0xA9 => "Cold Plate Temp FAILED",
        0xAA => "Input Current MAX",
        0xAB => "HVIL Interlock Loop",
        0xAC => "Logic Temperature",
        0xAD => "Output Overvoltage",
        _ => "Unknown Fault",
    }
}

/// Active or passive fault reply
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargerFault {
    /// `None` when the charger reports no fault
    pub record: Option<FaultRecord>,
}

impl ChargerFault {
    /// `name` is the packet mnemonic used in errors (FLTA or FLTP)
    pub fn decode(name: &str, payload: &[u8]) -> Result<Self, IoError> {
        require_len(name, payload, 8)?;
        if payload[1..8].iter().all(|&b| b == NO_FAULT_FILL) {
            return Ok(Self { record: None });
        }

        let [d0, d1, d2, d3] = [payload[0], payload[1], payload[2], payload[3]];
        Ok(Self {
            record: Some(FaultRecord {
                frame_type: FaultFrameType::from_bits(d0 >> 6),
                total_errors: d0 & 0x3F,
                frame_number: (d1 >> 2) & 0x3F,
                fault_code: d2,
                occurrence: (d3 >> 2) & 0x3F,
                level: FailureLevel::from_bits(d3),
                first_time_h: be_u16(payload, 4),
                last_time_h: be_u16(payload, 6),
            }),
        })
    }
}

impl fmt::Display for ChargerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(r) = &self.record else {
            return f.write_str("no fault detected");
        };
        write!(
            f,
            "0x{:02X} {} ({}) occurrence={} first={}h last={}h frame={}/{}",
            r.fault_code,
            r.name(),
            r.level,
            r.occurrence,
            r.first_time_h,
            r.last_time_h,
            r.frame_number,
            r.total_errors
        )
    }
}

// ============================================================================
// SW (0x61E) / SN (0x61F)
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareVersion {
    /// e.g. "SW3225A5"
    pub version: String,
}

impl SoftwareVersion {
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        Ok(Self {
            version: decode_ascii("SW", payload)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialNumber {
    pub serial: String,
}

impl SerialNumber {
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        Ok(Self {
            serial: decode_ascii("SN", payload)?,
        })
    }
}

/// Eight characters; a NUL ends the text early
fn decode_ascii(name: &str, payload: &[u8]) -> Result<String, IoError> {
    require_len(name, payload, 8)?;
    let bytes = &payload[..8];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Direction;

    #[test]
    fn test_req_encode() {
        assert_eq!(
            ChargerRequest::new(RequestTarget::FaultActive).encode(),
            [0x80, 0x00, 0x06, 0x1D]
        );

        let disabled = ChargerRequest {
            enable: false,
            target: RequestTarget::SerialNumber,
        };
        assert_eq!(disabled.encode(), [0x00, 0x00, 0x06, 0x1F]);
    }

    #[test]
    fn test_req_to_frame() {
        let frame = ChargerRequest::new(RequestTarget::SoftwareVersion).to_frame();
        assert_eq!(frame.identifier, CAN_ID_REQ);
        assert_eq!(frame.direction, Direction::Outbound);
        assert_eq!(frame.raw_text, "CanBus Tx 0x61B 80 00 06 1E");
    }

    #[test]
    fn test_req_targets_answer_on_their_ids() {
        let ids: Vec<u32> = RequestTarget::ALL.iter().map(|t| t.response_id()).collect();
        assert_eq!(ids, vec![CAN_ID_FLTP, CAN_ID_FLTA, CAN_ID_SW, CAN_ID_SN]);
        assert_eq!(RequestTarget::from_code(0x1C), Some(RequestTarget::FaultInactive));
        assert_eq!(RequestTarget::from_code(0x20), None);
    }

    #[test]
    fn test_req_echo_decode() {
        let req = ChargerRequest::decode(&[0x80, 0x00, 0x06, 0x1C]).unwrap();
        assert!(req.enable);
        assert_eq!(req.target, RequestTarget::FaultInactive);

        let err = ChargerRequest::decode(&[0x80, 0x00, 0x07, 0x1C]).unwrap_err();
        assert_eq!(err.to_string(), "REQ: unknown requested id 0x071C");
    }

    #[test]
    fn test_fault_decode() {
        // Single frame, one fault, 0xA8 hard failure, occurred 5 times, at 30h and 120h
        let fault = ChargerFault::decode("FLTA", &[0x41, 0x01, 0xA8, 0x17, 0x00, 0x1E, 0x00, 0x78])
            .unwrap();
        let record = fault.record.unwrap();
        assert_eq!(record.frame_type, FaultFrameType::Single);
        assert_eq!(record.total_errors, 1);
        assert_eq!(record.frame_number, 0);
        assert_eq!(record.fault_code, 0xA8);
        assert_eq!(record.name(), "Cold Plate Temp HIGH");
        assert_eq!(record.occurrence, 5);
        assert_eq!(record.level, FailureLevel::Hard);
        assert_eq!(record.first_time_h, 30);
        assert_eq!(record.last_time_h, 120);
    }

    #[test]
    fn test_fault_multi_frame() {
        // Frame 2 of 3, 0xAD soft failure
        let fault = ChargerFault::decode("FLTP", &[0x83, 0x08, 0xAD, 0x06, 0x01, 0x00, 0x01, 0x10])
            .unwrap();
        let record = fault.record.unwrap();
        assert_eq!(record.frame_type, FaultFrameType::Multi);
        assert_eq!(record.total_errors, 3);
        assert_eq!(record.frame_number, 2);
        assert_eq!(record.name(), "Output Overvoltage");
        assert_eq!(record.occurrence, 1);
        assert_eq!(record.level, FailureLevel::Soft);
        assert_eq!(record.first_time_h, 0x0100);
        assert_eq!(record.last_time_h, 0x0110);
    }

    #[test]
    fn test_no_fault_reply() {
        let fault = ChargerFault::decode("FLTA", &[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF])
            .unwrap();
        assert_eq!(fault.record, None);

        // One byte short of the fill is a real fault
        let fault = ChargerFault::decode("FLTA", &[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE])
            .unwrap();
        assert!(fault.record.is_some());
    }

    #[test]
    fn test_failure_level_bits() {
        assert_eq!(FailureLevel::from_bits(0b00), FailureLevel::Warning);
        assert_eq!(FailureLevel::from_bits(0b01), FailureLevel::Warning);
        assert_eq!(FailureLevel::from_bits(0b10), FailureLevel::Soft);
        assert_eq!(FailureLevel::from_bits(0xFF), FailureLevel::Hard);
    }

    #[test]
    fn test_unknown_fault_code() {
        assert_eq!(fault_name(0xA0), "Bulk 1 Voltage");
        assert_eq!(fault_name(0x42), "Unknown Fault");
        assert_eq!(FaultFrameType::from_bits(3), FaultFrameType::Other(3));
    }

    #[test]
    fn test_software_and_serial_text() {
        let sw = SoftwareVersion::decode(b"SW3225A5").unwrap();
        assert_eq!(sw.version, "SW3225A5");

        let sn = SerialNumber::decode(b"SN12\0\0\0\0").unwrap();
        assert_eq!(sn.serial, "SN12");

        assert!(SerialNumber::decode(b"SN12").is_err());
    }
}
