// src/charger/level4.rs
//
// Level 4: TST2 (0x616), the setup the charger was configured with. Sent
// once at power on.
//
//   D0  7-6 baudrate, 5 ID type, 3-2 AC current control, 1-0 range,
//       bit 0 also reads as three-phase config
//   D1  7 slave, 6 model, 5-2 ID setting, 1 parallel control, 0 air cooler
//   D2  IacmMaxSet ×0.2 A
//   D3-D4 VoutMaxSet ×0.1 V, D5-D6 IoutMaxSet ×0.1 A, D7 password

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{bit, require_len, tenths};
use crate::io::IoError;

pub const CAN_ID_TST2: u32 = 0x616;

/// Password programmed at the factory
pub const FACTORY_PASSWORD: u8 = 0xA5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanBaudrate {
    Kbit500,
    Kbit250,
    Kbit125,
    Mbit1,
}

impl CanBaudrate {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => CanBaudrate::Kbit500,
            1 => CanBaudrate::Kbit250,
            2 => CanBaudrate::Kbit125,
            _ => CanBaudrate::Mbit1,
        }
    }

    pub fn bits_per_second(self) -> u32 {
        match self {
            CanBaudrate::Kbit500 => 500_000,
            CanBaudrate::Kbit250 => 250_000,
            CanBaudrate::Kbit125 => 125_000,
            CanBaudrate::Mbit1 => 1_000_000,
        }
    }
}

impl fmt::Display for CanBaudrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CanBaudrate::Kbit500 => "500k",
            CanBaudrate::Kbit250 => "250k",
            CanBaudrate::Kbit125 => "125k",
            CanBaudrate::Mbit1 => "1M",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanIdType {
    Standard11,
    Extended29,
}

impl fmt::Display for CanIdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CanIdType::Standard11 => "11-bit",
            CanIdType::Extended29 => "29-bit",
        })
    }
}

/// How the AC input current limit is decided
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IacControl {
    /// Fixed in hardware
    NotControlled,
    SaeJ1772,
    En61851,
    /// Taken from CTL (0x618)
    Id618,
}

impl IacControl {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => IacControl::NotControlled,
            1 => IacControl::SaeJ1772,
            2 => IacControl::En61851,
            _ => IacControl::Id618,
        }
    }
}

impl fmt::Display for IacControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IacControl::NotControlled => "not controlled",
            IacControl::SaeJ1772 => "SAE J1772",
            IacControl::En61851 => "EN61851",
            IacControl::Id618 => "ID618",
        })
    }
}

/// Output voltage range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputRange {
    R4,
    R3,
    R2,
    R1,
}

impl OutputRange {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => OutputRange::R4,
            1 => OutputRange::R3,
            2 => OutputRange::R2,
            _ => OutputRange::R1,
        }
    }
}

impl fmt::Display for OutputRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvcModel {
    /// Liquid cooled
    Evo11k,
    /// Air cooled
    Evo22k,
}

impl fmt::Display for EvcModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvcModel::Evo11k => "EVO11K",
            EvcModel::Evo22k => "EVO22K",
        })
    }
}

/// Charger setup reported in TST2
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChargerSetup {
    pub baudrate: CanBaudrate,
    pub id_type: CanIdType,
    pub iac_control: IacControl,
    pub range: OutputRange,
    /// true = three phase, false = Y grid
    pub three_phase: bool,
    /// Slave of a parallel group under EN61851/J1772
    pub slave: bool,
    pub evc_model: EvcModel,
    /// 0 = single charger, otherwise the charger's ID in a parallel group
    pub id_setting: u8,
    /// All chargers of the group follow the same CAN command
    pub parallel_ctrl: bool,
    /// true = air cooled (EVO11KA), false = liquid cooled (EVO11KL)
    pub air_cooler: bool,
    /// Max AC input current [A], 0-51
    pub iacm_max_a: f32,
    /// Max DC output voltage [V], 0-1000
    pub vout_max_v: f32,
    /// Max DC output current [A], 0-150
    pub iout_max_a: f32,
    pub password: u8,
}

impl ChargerSetup {
    pub fn decode(payload: &[u8]) -> Result<Self, IoError> {
        require_len("TST2", payload, 8)?;
        let [d0, d1] = [payload[0], payload[1]];
        Ok(Self {
            baudrate: CanBaudrate::from_bits(d0 >> 6),
            id_type: if bit(d0, 0x20) {
                CanIdType::Extended29
            } else {
                CanIdType::Standard11
            },
            iac_control: IacControl::from_bits(d0 >> 2),
            range: OutputRange::from_bits(d0),
            // Shares D0 bit 0 with the low range bit
            three_phase: bit(d0, 0x01),

            slave: bit(d1, 0x80),
            evc_model: if bit(d1, 0x40) {
                EvcModel::Evo22k
            } else {
                EvcModel::Evo11k
            },
            id_setting: (d1 >> 2) & 0x0F,
            parallel_ctrl: bit(d1, 0x02),
            air_cooler: bit(d1, 0x01),

            iacm_max_a: payload[2] as f32 * 0.2,
            vout_max_v: tenths(payload, 3),
            iout_max_a: tenths(payload, 5),
            password: payload[7],
        })
    }

    pub fn is_factory_password(&self) -> bool {
        self.password == FACTORY_PASSWORD
    }
}
