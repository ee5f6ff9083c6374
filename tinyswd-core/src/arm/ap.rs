// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Generic Access Port Registers
//!
//! IDR and BASE live in bank 0xF of every AP.

use crate::arm::register::{ApRegister, ReadableRegister, RegisterDescriptor, field};
use crate::register_value;

/// Access Port identification register descriptor, read-only
pub struct IdrRegister;

impl RegisterDescriptor for IdrRegister {
    const ADDRESS: u8 = 0xFC;
    const NAME: &'static str = "IDR";
    type Value = Idr;
}

impl ReadableRegister for IdrRegister {}
impl ApRegister for IdrRegister {}

/// Access Port identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Idr(u32);

impl Idr {
    /// Class value for a MEM-AP
    pub const CLASS_MEM_AP: u32 = 0x8;
    /// Type value for an AMBA AHB3 MEM-AP, as found on Cortex-M0/M0+/M3/M4
    pub const TYPE_AHB3: u32 = 0x1;

    pub const fn new(value: u32) -> Self {
        Idr(value)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    /// Bits 31:28
    pub const fn revision(&self) -> u32 {
        field(self.0, 28, 0xF)
    }

    /// JEDEC designer, bits 27:17
    pub const fn designer(&self) -> u32 {
        field(self.0, 17, 0x7FF)
    }

    /// Bits 16:13
    pub const fn class(&self) -> u32 {
        field(self.0, 13, 0xF)
    }

    /// Bits 7:4
    pub const fn variant(&self) -> u32 {
        field(self.0, 4, 0xF)
    }

    /// Bits 3:0
    pub const fn ap_type(&self) -> u32 {
        field(self.0, 0, 0xF)
    }

    /// An IDR of zero means no AP is present at this APSEL.
    pub const fn is_present(&self) -> bool {
        self.0 != 0
    }

    pub const fn is_mem_ap(&self) -> bool {
        self.class() == Self::CLASS_MEM_AP
    }
}

register_value!(Idr, r);

/// Cortex-M0/M0+ AHB-AP IDR value
pub const IDR_AHB_AP_CORTEX_M0: Idr = Idr::new(0x0477_0031);

/// Cortex-M3/M4 AHB-AP IDR value
pub const IDR_AHB_AP_CORTEX_M3_M4: Idr = Idr::new(0x2477_0011);

/// Debug base address register descriptor, read-only
pub struct BaseRegister;

impl RegisterDescriptor for BaseRegister {
    const ADDRESS: u8 = 0xF8;
    const NAME: &'static str = "BASE";
    type Value = Base;
}

impl ReadableRegister for BaseRegister {}
impl ApRegister for BaseRegister {}

/// Location of the first ROM table on the AP's bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Base(u32);

impl Base {
    const PRESENT: u32 = 1 << 0;
    const FORMAT: u32 = 1 << 1;
    const BASEADDR_MASK: u32 = 0xFFFF_F000;
    const LEGACY_NOT_PRESENT: u32 = 0xFFFF_FFFF;

    /// Whether a debug entry is present.
    pub const fn entry_present(&self) -> bool {
        if self.0 == Self::LEGACY_NOT_PRESENT {
            return false;
        }
        // Legacy format (bit 1 clear) has no present bit.
        self.0 & Self::FORMAT == 0 || self.0 & Self::PRESENT != 0
    }

    /// ROM table address, when present.
    pub const fn base_address(&self) -> Option<u32> {
        if self.entry_present() {
            Some(self.0 & Self::BASEADDR_MASK)
        } else {
            None
        }
    }
}

register_value!(Base, r);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registers_live_in_bank_f() {
        assert_eq!(IdrRegister::bank(), 0xF);
        assert_eq!(BaseRegister::bank(), 0xF);
        assert_eq!(IdrRegister::ADDRESS & 0x0C, 0x0C);
        assert_eq!(BaseRegister::ADDRESS & 0x0C, 0x08);
    }

    #[test]
    fn cortex_m0_idr() {
        let idr = IDR_AHB_AP_CORTEX_M0;
        assert!(idr.is_present());
        assert!(idr.is_mem_ap());
        assert_eq!(idr.ap_type(), Idr::TYPE_AHB3);
        assert_eq!(idr.designer(), 0x23B);
        assert!(!Idr::new(0).is_present());
    }

    #[test]
    fn base_address() {
        assert_eq!(Base(0xE00F_F003).base_address(), Some(0xE00F_F000));
        assert_eq!(Base(0xE00F_F002).base_address(), None);
        assert_eq!(Base(0xE00F_F000).base_address(), Some(0xE00F_F000));
        assert_eq!(Base(0xFFFF_FFFF).base_address(), None);
    }
}
