// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM debug architecture objects: DP, AP and MEM-AP registers, plus the
//! Cortex-M system control space.

pub mod ap;
pub mod dp;
pub mod map;
pub mod register;
pub mod scs;

use core::fmt;

use dp::IdCode;

/// ARM Cortex core type, as identified from the DP IDCODE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cortex {
    /// Cortex-M0
    M0,
    /// Cortex-M0+
    M0Plus,
    /// Cortex-M3
    M3,
    /// Cortex-M4
    M4,
    /// Cortex-M33
    M33,
}

impl Cortex {
    pub const IDCODE_M0: IdCode = IdCode::new(0x0BB1_1477);
    pub const IDCODE_M0_PLUS: IdCode = IdCode::new(0x0BC1_1477);
    pub const IDCODE_M3: IdCode = IdCode::new(0x1BA0_1477);
    pub const IDCODE_M4: IdCode = IdCode::new(0x2BA0_1477);
    pub const IDCODE_M33: IdCode = IdCode::new(0x4C01_3477);

    pub const fn idcode(&self) -> IdCode {
        match self {
            Cortex::M0 => Self::IDCODE_M0,
            Cortex::M0Plus => Self::IDCODE_M0_PLUS,
            Cortex::M3 => Self::IDCODE_M3,
            Cortex::M4 => Self::IDCODE_M4,
            Cortex::M33 => Self::IDCODE_M33,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Cortex::M0 => "Cortex-M0",
            Cortex::M0Plus => "Cortex-M0+",
            Cortex::M3 => "Cortex-M3",
            Cortex::M4 => "Cortex-M4",
            Cortex::M33 => "Cortex-M33",
        }
    }

    pub fn from_idcode(idcode: IdCode) -> Option<Cortex> {
        [
            Cortex::M0,
            Cortex::M0Plus,
            Cortex::M3,
            Cortex::M4,
            Cortex::M33,
        ]
        .into_iter()
        .find(|core| core.idcode() == idcode)
    }
}

impl fmt::Display for Cortex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARM {}", self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case(0x0BC1_1477 => Some(Cortex::M0Plus); "stm32g0")]
    #[test_case(0x2BA0_1477 => Some(Cortex::M4); "stm32f4")]
    #[test_case(0x1234_5677 => None; "unknown")]
    fn identify(idcode: u32) -> Option<Cortex> {
        Cortex::from_idcode(IdCode::new(idcode))
    }
}
