// src/charger/level1.rs
//
// Level 1: the BMS control packet and the status, measurement and
// diagnostic packets the charger reports during normal operation.
//
//   0x618  CTL   100ms   BMS -> charger
//   0x610  STAT  1000ms
//   0x611  ACT1  100ms
//   0x614  ACT2  1000ms
//   0x615  TST1  100ms

use serde::{Deserialize, Serialize};

use super::{be_u16, bit, raw_to_temp, require_len, set_flags, tenths};
use crate::io::{Frame, IoError};

pub const CAN_ID_CTL: u32 = 0x618;
pub const CAN_ID_STAT: u32 = 0x610;
pub const CAN_ID_ACT1: u32 = 0x611;
pub const CAN_ID_ACT2: u32 = 0x614;
pub const CAN_ID_TST1: u32 = 0x615;

/// Limits accepted by the charger before ×10 scaling
const IAC_MAX_A: f32 = 500.0;
const VOUT_MAX_V: f32 = 10_000.0;
const IOUT_MAX_A: f32 = 1_500.0;

/// Clamp to [0, max] and scale by 10. NaN encodes as 0; values above the u16
/// range saturate.
fn to_raw_tenths(value: f32, max: f32) -> u16 {
    (value.clamp(0.0, max) * 10.0) as u16
}

// ============================================================================
// CTL (0x618)
// ============================================================================

/// Control packet sent by the BMS every 100ms
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargerControl {
    pub can_enable: bool,
    pub led3_enable: bool,
    /// Max AC input current [A], 0-500
    pub iac_max_a: f32,
    /// Max output voltage [V], 0-10000
    pub vout_max_v: f32,
    /// Max output current [A], 0-1500
    pub iout_max_a: f32,
}

impl ChargerControl {
    /// Encode the 8 data bytes.
    ///
    /// D0 flags (bit 7 CanEnable, bit 3 LED3), D1-D2 IacMax×10,
    /// D3-D4 VoutMax×10, D5-D6 IoutMax×10, D7 unused.
    pub fn encode(&self) -> [u8; 8] {
        let mut data = [0u8; 8];
        if self.can_enable {
            data[0] |= 0x80;
        }
        if self.led3_enable {
            data[0] |= 0x08;
        }
        data[1..3].copy_from_slice(&to_raw_tenths(self.iac_max_a, IAC_MAX_A).to_be_bytes());
        data[3..5].copy_from_slice(&to_raw_tenths(self.vout_max_v, VOUT_MAX_V).to_be_bytes());
        data[5..7].copy_from_slice(&to_raw_tenths(self.iout_max_a, IOUT_MAX_A).to_be_bytes());
        data
    }

    pub fn to_frame(&self) -> Frame {
        Frame::outbound(CAN_ID_CTL, self.encode().to_vec())
    }

    /// Decode a CTL echo (the adapter reports what it transmits)
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        require_len("CTL", payload, 7)?;
        Ok(Self {
            can_enable: bit(payload[0], 0x80),
            led3_enable: bit(payload[0], 0x08),
            iac_max_a: tenths(payload, 1),
            vout_max_v: tenths(payload, 3),
            iout_max_a: tenths(payload, 5),
        })
    }
}

// ============================================================================
// STAT (0x610)
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargerStatus {
    /// Hardware enable pin active
    pub power_enable: bool,
    /// A failure occurred and is latched
    pub error_latch: bool,
    pub warn_limit: bool,
    /// Temperature de-rating active
    pub lim_temp: bool,
    pub warning_hv: bool,
    /// Bulk error
    pub bulks: bool,
}

impl ChargerStatus {
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        require_len("STAT", payload, 1)?;
        let d0 = payload[0];
        Ok(Self {
            power_enable: bit(d0, 0x80),
            error_latch: bit(d0, 0x40),
            warn_limit: bit(d0, 0x20),
            lim_temp: bit(d0, 0x08),
            warning_hv: bit(d0, 0x02),
            bulks: bit(d0, 0x01),
        })
    }
}

// ============================================================================
// ACT1 (0x611) / ACT2 (0x614)
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargerActual1 {
    /// AC input current [A]
    pub iac_a: f32,
    /// Power stage temperature [°C]
    pub temp_c: f32,
    /// DC output voltage [V]
    pub vout_v: f32,
    /// DC output current [A]
    pub iout_a: f32,
}

impl ChargerActual1 {
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        require_len("ACT1", payload, 8)?;
        Ok(Self {
            iac_a: tenths(payload, 0),
            temp_c: raw_to_temp(be_u16(payload, 2)),
            vout_v: tenths(payload, 4),
            iout_a: tenths(payload, 6),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargerActual2 {
    /// Logic (LV) stage temperature [°C]
    pub temp_loglv_c: f32,
    /// AC input power [kW]
    pub ac_power_kw: f32,
    /// Max AC current allowed by the proximity line [A]
    pub prox_limit_a: f32,
    /// Max AC current allowed by the pilot signal [A]
    pub pilot_limit_a: f32,
}

impl ChargerActual2 {
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        require_len("ACT2", payload, 8)?;
        Ok(Self {
            temp_loglv_c: raw_to_temp(be_u16(payload, 0)),
            ac_power_kw: be_u16(payload, 2) as f32 * 0.01,
            prox_limit_a: tenths(payload, 4),
            pilot_limit_a: tenths(payload, 6),
        })
    }
}

// ============================================================================
// TST1 (0x615)
// ============================================================================

/// Diagnostic flags. Bit numbers are counted across D0..D4 (D0 bit 7 = bit 7,
/// D1 bit 7 = bit 15, ...).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargerDiagnostics {
    // D0
    /// AC mains connected
    pub ac_ok: bool,
    /// AC precharge completed
    pub pr_compl: bool,
    pub pwr_ok: bool,
    pub vout_ok: bool,
    pub neutral: bool,
    pub led3: bool,
    pub led618: bool,
    // D1
    /// DC output over voltage
    pub ovp: bool,
    pub conn_open: bool,
    pub ther_fail: bool,
    /// No CTL received for more than 600ms
    pub rx618_fail: bool,
    // D2
    pub bulk1_fail: bool,
    pub bulk2_fail: bool,
    pub bulk3_fail: bool,
    pub pump_on: bool,
    pub fan_on: bool,
    pub hv_rx_fail: bool,
    pub cooling_fail: bool,
    pub rx619_fail: bool,
    // D3
    pub neutro1: bool,
    pub neutro2: bool,
    /// true = three phase, false = single phase
    pub three_phase: bool,
    pub iac_fail: bool,
    pub ignition: bool,
    /// LV battery not present
    pub lv_battery_np: bool,
    // D4
    pub prox_ok: bool,
    pub pilot_ok: bool,
    pub s2_ok: bool,
    /// Operating hours (D6-D7)
    pub cnt_hours: u16,
}

impl ChargerDiagnostics {
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        require_len("TST1", payload, 8)?;
        let [d0, d1, d2, d3, d4] = [payload[0], payload[1], payload[2], payload[3], payload[4]];
        Ok(Self {
            ac_ok: bit(d0, 0x80),
            pr_compl: bit(d0, 0x40),
            pwr_ok: bit(d0, 0x20),
            vout_ok: bit(d0, 0x10),
            neutral: bit(d0, 0x08),
            led3: bit(d0, 0x04),
            led618: bit(d0, 0x02),

            ovp: bit(d1, 0x80),
            conn_open: bit(d1, 0x40),
            ther_fail: bit(d1, 0x04),
            rx618_fail: bit(d1, 0x01),

            bulk1_fail: bit(d2, 0x80),
            bulk2_fail: bit(d2, 0x40),
            bulk3_fail: bit(d2, 0x20),
            pump_on: bit(d2, 0x10),
            fan_on: bit(d2, 0x08),
            hv_rx_fail: bit(d2, 0x04),
            cooling_fail: bit(d2, 0x02),
            rx619_fail: bit(d2, 0x01),

            neutro1: bit(d3, 0x80),
            neutro2: bit(d3, 0x40),
            three_phase: bit(d3, 0x20),
            iac_fail: bit(d3, 0x04),
            ignition: bit(d3, 0x02),
            lv_battery_np: bit(d3, 0x01),

            prox_ok: bit(d4, 0x80),
            pilot_ok: bit(d4, 0x20),
            s2_ok: bit(d4, 0x08),

            cnt_hours: be_u16(payload, 6),
        })
    }

    /// Names of the fault flags that are set
    pub fn faults(&self) -> Vec<&'static str> {
        set_flags(&[
            (self.ovp, "ovp"),
            (self.ther_fail, "ther_fail"),
            (self.rx618_fail, "rx618_fail"),
            (self.bulk1_fail, "bulk1_fail"),
            (self.bulk2_fail, "bulk2_fail"),
            (self.bulk3_fail, "bulk3_fail"),
            (self.hv_rx_fail, "hv_rx_fail"),
            (self.cooling_fail, "cooling_fail"),
            (self.rx619_fail, "rx619_fail"),
            (self.iac_fail, "iac_fail"),
        ])
    }
}

// ============================================================================
// Tests
// ============================================================================
