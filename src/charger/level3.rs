// src/charger/level3.rs
//
// Level 3: per-stage measurements and status, used for service diagnostics.
//
//   0x712  ACT3   fan voltage and AC current of each phase
//   0x713  TEMP   logic HV and power stage temperatures
//   0x714  ACT4   fan logic temperature and raw output currents
//   0x715  STST1  stage status flags

use serde::{Deserialize, Serialize};

use super::{be_u16, bit, raw_to_temp, require_len, set_flags, tenths};
use crate::io::IoError;

pub const CAN_ID_ACT3: u32 = 0x712;
pub const CAN_ID_TEMP: u32 = 0x713;
pub const CAN_ID_ACT4: u32 = 0x714;
pub const CAN_ID_STST1: u32 = 0x715;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargerActual3 {
    pub fan_voltage_v: f32,
    /// AC input current of phases 1-3 [A]
    pub iacm1_a: f32,
    pub iacm2_a: f32,
    pub iacm3_a: f32,
}

impl ChargerActual3 {
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        require_len("ACT3", payload, 8)?;
        Ok(Self {
            fan_voltage_v: tenths(payload, 0),
            iacm1_a: tenths(payload, 2),
            iacm2_a: tenths(payload, 4),
            iacm3_a: tenths(payload, 6),
        })
    }
}

/// Stage temperatures [°C]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargerTemperatures {
    pub temp_loghv_c: f32,
    pub temp_power1_c: f32,
    pub temp_power2_c: f32,
    pub temp_power3_c: f32,
}

impl ChargerTemperatures {
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        require_len("TEMP", payload, 8)?;
        Ok(Self {
            temp_loghv_c: raw_to_temp(be_u16(payload, 0)),
            temp_power1_c: raw_to_temp(be_u16(payload, 2)),
            temp_power2_c: raw_to_temp(be_u16(payload, 4)),
            temp_power3_c: raw_to_temp(be_u16(payload, 6)),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargerActual4 {
    pub temp_logfan_c: f32,
    /// Output current ADC readings of stages 1-3, unscaled
    pub iout1_raw: u16,
    pub iout2_raw: u16,
    pub iout3_raw: u16,
}

impl ChargerActual4 {
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        require_len("ACT4", payload, 8)?;
        Ok(Self {
            temp_logfan_c: raw_to_temp(be_u16(payload, 0)),
            iout1_raw: be_u16(payload, 2),
            iout2_raw: be_u16(payload, 4),
            iout3_raw: be_u16(payload, 6),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargerStageStatus {
    // D0
    pub pfc_enable: bool,
    // D1
    pub log_temp_high: bool,
    pub log_temp_low: bool,
    /// Logic under voltage lock out
    pub uvlo_log: bool,
    pub ther_low_fail: bool,
    pub rx618_fail: bool,
    // D2
    pub bulk1_fail: bool,
    pub bulk2_fail: bool,
    pub bulk3_fail: bool,
    pub cooling_fail1: bool,
    pub cooling_fail2: bool,
    pub cooling_fail3: bool,
    // D3
    pub uvlo_log_lv: bool,
    /// LV battery over/under voltage
    pub bat_over: bool,
    pub bat_under: bool,
}

impl ChargerStageStatus {
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        require_len("STST1", payload, 4)?;
        let [d0, d1, d2, d3] = [payload[0], payload[1], payload[2], payload[3]];
        Ok(Self {
            pfc_enable: bit(d0, 0x04),

            log_temp_high: bit(d1, 0x20),
            log_temp_low: bit(d1, 0x10),
            uvlo_log: bit(d1, 0x08),
            ther_low_fail: bit(d1, 0x04),
            rx618_fail: bit(d1, 0x01),

            bulk1_fail: bit(d2, 0x80),
            bulk2_fail: bit(d2, 0x40),
            bulk3_fail: bit(d2, 0x20),
            cooling_fail1: bit(d2, 0x10),
            cooling_fail2: bit(d2, 0x08),
            cooling_fail3: bit(d2, 0x04),

            uvlo_log_lv: bit(d3, 0x08),
            bat_over: bit(d3, 0x02),
            bat_under: bit(d3, 0x01),
        })
    }

    /// Names of the set flags other than `pfc_enable`
    pub fn faults(&self) -> Vec<&'static str> {
        set_flags(&[
            (self.log_temp_high, "log_temp_high"),
            (self.log_temp_low, "log_temp_low"),
            (self.uvlo_log, "uvlo_log"),
            (self.ther_low_fail, "ther_low_fail"),
            (self.rx618_fail, "rx618_fail"),
            (self.bulk1_fail, "bulk1_fail"),
            (self.bulk2_fail, "bulk2_fail"),
            (self.bulk3_fail, "bulk3_fail"),
            (self.cooling_fail1, "cooling_fail1"),
            (self.cooling_fail2, "cooling_fail2"),
            (self.cooling_fail3, "cooling_fail3"),
            (self.uvlo_log_lv, "uvlo_log_lv"),
            (self.bat_over, "bat_over"),
            (self.bat_under, "bat_under"),
        ])
    }
}
