// src/charger/mod.rs
//
// EVO charger CAN messages, levels 1 to 4.
//
// All multi-byte fields are big-endian (MSB in the lower data byte).
//
//   ID     Dir            Level  Content
//   0x618  BMS -> charger 1      CTL    enable flags, current/voltage limits
//   0x610  charger -> BMS 1      STAT   status flags
//   0x611  charger -> BMS 1      ACT1   AC current, temperature, DC V/I
//   0x614  charger -> BMS 1      ACT2   logic temperature, AC power, limits
//   0x615  charger -> BMS 1      TST1   diagnostic flags, hours counter
//   0x61B  BMS -> charger 2      REQ    diagnostic request
//   0x61C  charger -> BMS 2      FLTP   passive (inactive) fault
//   0x61D  charger -> BMS 2      FLTA   active fault
//   0x61E  charger -> BMS 2      SW     software version (ASCII)
//   0x61F  charger -> BMS 2      SN     serial number (ASCII)
//   0x712  charger -> BMS 3      ACT3   fan voltage, per-phase AC current
//   0x713  charger -> BMS 3      TEMP   logic and power stage temperatures
//   0x714  charger -> BMS 3      ACT4   fan logic temperature, raw output currents
//   0x715  charger -> BMS 3      STST1  stage status flags
//   0x616  charger -> BMS 4      TST2   setup, sent once at power on

use std::fmt;

use serde::Serialize;

use crate::io::{Frame, IoError};

mod level1;
mod level2;
mod level3;
mod level4;

pub use level1::{
    ChargerActual1, ChargerActual2, ChargerControl, ChargerDiagnostics, ChargerStatus,
    CAN_ID_ACT1, CAN_ID_ACT2, CAN_ID_CTL, CAN_ID_STAT, CAN_ID_TST1,
};
pub use level2::{
    fault_name, ChargerFault, ChargerRequest, FailureLevel, FaultFrameType, FaultRecord,
    RequestTarget, SerialNumber, SoftwareVersion, CAN_ID_FLTA, CAN_ID_FLTP, CAN_ID_REQ,
    CAN_ID_SN, CAN_ID_SW,
};
pub use level3::{
    ChargerActual3, ChargerActual4, ChargerStageStatus, ChargerTemperatures, CAN_ID_ACT3,
    CAN_ID_ACT4, CAN_ID_STST1, CAN_ID_TEMP,
};
pub use level4::{
    CanBaudrate, CanIdType, ChargerSetup, EvcModel, IacControl, OutputRange, CAN_ID_TST2,
    FACTORY_PASSWORD,
};

/// Temperature raw value scale: T = raw * 0.005188 - 40
const TEMP_SCALE: f32 = 0.005188;
const TEMP_OFFSET: f32 = -40.0;

// ============================================================================
// Helpers
// ============================================================================

fn be_u16(payload: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([payload[offset], payload[offset + 1]])
}

fn tenths(payload: &[u8], offset: usize) -> f32 {
    be_u16(payload, offset) as f32 / 10.0
}

fn raw_to_temp(raw: u16) -> f32 {
    raw as f32 * TEMP_SCALE + TEMP_OFFSET
}

fn bit(byte: u8, mask: u8) -> bool {
    byte & mask != 0
}

fn require_len(name: &str, payload: &[u8], needed: usize) -> Result<(), IoError> {
    if payload.len() < needed {
        return Err(IoError::protocol(
            name,
            format!("expected {} data bytes, got {}", needed, payload.len()),
        ));
    }
    Ok(())
}

/// Names of the set flags, in table order
fn set_flags(flags: &[(bool, &'static str)]) -> Vec<&'static str> {
    flags
        .iter()
        .filter_map(|&(set, name)| set.then_some(name))
        .collect()
}

// ============================================================================
// Dispatch
// ============================================================================

/// Any charger message, tagged by its packet mnemonic
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "packet", rename_all = "lowercase")]
pub enum ChargerMessage {
    Ctl(ChargerControl),
    Stat(ChargerStatus),
    Act1(ChargerActual1),
    Act2(ChargerActual2),
    Tst1(ChargerDiagnostics),
    Req(ChargerRequest),
    Fltp(ChargerFault),
    Flta(ChargerFault),
    Sw(SoftwareVersion),
    Sn(SerialNumber),
    Act3(ChargerActual3),
    Temp(ChargerTemperatures),
    Act4(ChargerActual4),
    Stst1(ChargerStageStatus),
    Tst2(ChargerSetup),
}

impl ChargerMessage {
    /// Decode a frame by identifier. `None` if the identifier is not a
    /// charger message; an error if the payload does not fit its layout.
    pub fn decode(frame: &Frame) -> Option<Result<ChargerMessage, IoError>> {
        let payload = frame.payload.as_slice();
        let message = match frame.identifier {
            CAN_ID_CTL => ChargerControl::decode(payload).map(ChargerMessage::Ctl),
            CAN_ID_STAT => ChargerStatus::decode(payload).map(ChargerMessage::Stat),
            CAN_ID_ACT1 => ChargerActual1::decode(payload).map(ChargerMessage::Act1),
            CAN_ID_ACT2 => ChargerActual2::decode(payload).map(ChargerMessage::Act2),
            CAN_ID_TST1 => ChargerDiagnostics::decode(payload).map(ChargerMessage::Tst1),
            CAN_ID_REQ => ChargerRequest::decode(payload).map(ChargerMessage::Req),
            CAN_ID_FLTP => ChargerFault::decode("FLTP", payload).map(ChargerMessage::Fltp),
            CAN_ID_FLTA => ChargerFault::decode("FLTA", payload).map(ChargerMessage::Flta),
            CAN_ID_SW => SoftwareVersion::decode(payload).map(ChargerMessage::Sw),
            CAN_ID_SN => SerialNumber::decode(payload).map(ChargerMessage::Sn),
            CAN_ID_ACT3 => ChargerActual3::decode(payload).map(ChargerMessage::Act3),
            CAN_ID_TEMP => ChargerTemperatures::decode(payload).map(ChargerMessage::Temp),
            CAN_ID_ACT4 => ChargerActual4::decode(payload).map(ChargerMessage::Act4),
            CAN_ID_STST1 => ChargerStageStatus::decode(payload).map(ChargerMessage::Stst1),
            CAN_ID_TST2 => ChargerSetup::decode(payload).map(ChargerMessage::Tst2),
            _ => return None,
        };
        Some(message)
    }
}

impl fmt::Display for ChargerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargerMessage::Ctl(c) => write!(
                f,
                "CTL enable={} led3={} iac_max={:.1}A vout_max={:.1}V iout_max={:.1}A",
                c.can_enable, c.led3_enable, c.iac_max_a, c.vout_max_v, c.iout_max_a
            ),
            ChargerMessage::Stat(s) => write!(
                f,
                "STAT power_enable={} error_latch={} warn_limit={} lim_temp={} warning_hv={} bulks={}",
                s.power_enable, s.error_latch, s.warn_limit, s.lim_temp, s.warning_hv, s.bulks
            ),
            ChargerMessage::Act1(a) => write!(
                f,
                "ACT1 iac={:.1}A temp={:.1}C vout={:.1}V iout={:.1}A",
                a.iac_a, a.temp_c, a.vout_v, a.iout_a
            ),
            ChargerMessage::Act2(a) => write!(
                f,
                "ACT2 temp_lv={:.1}C ac_power={:.2}kW prox_limit={:.1}A pilot_limit={:.1}A",
                a.temp_loglv_c, a.ac_power_kw, a.prox_limit_a, a.pilot_limit_a
            ),
            ChargerMessage::Tst1(t) => {
                write!(
                    f,
                    "TST1 ac_ok={} pwr_ok={} vout_ok={} three_phase={} hours={}",
                    t.ac_ok, t.pwr_ok, t.vout_ok, t.three_phase, t.cnt_hours
                )?;
                write_faults(f, &t.faults())
            }
            ChargerMessage::Req(r) => write!(
                f,
                "REQ enable={} id=0x{:03X} ({})",
                r.enable,
                r.target.response_id(),
                r.target
            ),
            ChargerMessage::Fltp(fault) => write!(f, "FLTP {}", fault),
            ChargerMessage::Flta(fault) => write!(f, "FLTA {}", fault),
            ChargerMessage::Sw(sw) => write!(f, "SW version={}", sw.version),
            ChargerMessage::Sn(sn) => write!(f, "SN serial={}", sn.serial),
            ChargerMessage::Act3(a) => write!(
                f,
                "ACT3 fan={:.1}V iacm1={:.1}A iacm2={:.1}A iacm3={:.1}A",
                a.fan_voltage_v, a.iacm1_a, a.iacm2_a, a.iacm3_a
            ),
            ChargerMessage::Temp(t) => write!(
                f,
                "TEMP loghv={:.1}C power1={:.1}C power2={:.1}C power3={:.1}C",
                t.temp_loghv_c, t.temp_power1_c, t.temp_power2_c, t.temp_power3_c
            ),
            ChargerMessage::Act4(a) => write!(
                f,
                "ACT4 temp_logfan={:.1}C iout1_raw={} iout2_raw={} iout3_raw={}",
                a.temp_logfan_c, a.iout1_raw, a.iout2_raw, a.iout3_raw
            ),
            ChargerMessage::Stst1(s) => {
                write!(f, "STST1 pfc_enable={}", s.pfc_enable)?;
                write_faults(f, &s.faults())
            }
            ChargerMessage::Tst2(s) => write!(
                f,
                "TST2 {} {} baud={} ids={} iac_control={} range={} three_phase={} \
                 iacm_max={:.1}A vout_max={:.1}V iout_max={:.1}A password=0x{:02X}",
                s.evc_model,
                if s.slave { "slave" } else { "master" },
                s.baudrate,
                s.id_type,
                s.iac_control,
                s.range,
                s.three_phase,
                s.iacm_max_a,
                s.vout_max_v,
                s.iout_max_a,
                s.password
            ),
        }
    }
}

fn write_faults(f: &mut fmt::Formatter<'_>, faults: &[&str]) -> fmt::Result {
    if !faults.is_empty() {
        write!(f, " faults=[{}]", faults.join(","))?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
