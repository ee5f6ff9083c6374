// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Cortex-M System Control Space registers
//!
//! The core debug block (DHCSR, DCRSR, DCRDR, DEMCR) and the System Control
//! Block's AIRCR.  These are memory mapped, and reached through the MEM-AP.
//!
//! See the ARMv6-M and ARMv7-M Architecture Reference Manuals, "Debug
//! register support in the SCS".

use crate::arm::register::{MemoryRegister, field, with_bits, with_field};
use crate::register_value;
use static_assertions::const_assert_eq;

/// Base address of the core debug register block
pub const CORE_DEBUG_BASE: u32 = 0xE000_EDF0;

/// Base address of the System Control Block
pub const SCB_BASE: u32 = 0xE000_ED00;

/// Debug Halting Control and Status Register descriptor
pub struct DhcsrRegister;

impl MemoryRegister for DhcsrRegister {
    const ADDRESS: u32 = CORE_DEBUG_BASE;
    const NAME: &'static str = "DHCSR";
    type Value = Dhcsr;
}

/// Debug Halting Control and Status Register
///
/// Bits 15:0 are control bits, bits 31:16 are status bits on read.  Writes
/// are ignored by hardware unless bits 31:16 carry [`Dhcsr::DBGKEY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dhcsr(u32);

impl Dhcsr {
    pub const DBGKEY: u32 = 0xA05F << 16;

    pub const C_DEBUGEN: u32 = 1 << 0;
    pub const C_HALT: u32 = 1 << 1;
    pub const C_STEP: u32 = 1 << 2;
    pub const C_MASKINTS: u32 = 1 << 3;
    pub const C_SNAPSTALL: u32 = 1 << 5;

    pub const S_REGRDY: u32 = 1 << 16;
    pub const S_HALT: u32 = 1 << 17;
    pub const S_SLEEP: u32 = 1 << 18;
    pub const S_LOCKUP: u32 = 1 << 19;
    pub const S_RETIRE_ST: u32 = 1 << 24;
    pub const S_RESET_ST: u32 = 1 << 25;

    const CONTROL_MASK: u32 = 0xFFFF;

    pub const fn new(value: u32) -> Self {
        Dhcsr(value)
    }

    /// A write value carrying the debug key and the given control bits.
    pub const fn control(bits: u32) -> Self {
        Dhcsr(Self::DBGKEY | (bits & Self::CONTROL_MASK))
    }

    /// Returns this value with the debug key in the top half, replacing
    /// whatever status bits were read back.
    pub const fn keyed(self) -> Self {
        Self::control(self.0)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    pub const fn has_key(&self) -> bool {
        self.0 & !Self::CONTROL_MASK == Self::DBGKEY
    }

    pub const fn c_debugen(&self) -> bool {
        self.0 & Self::C_DEBUGEN != 0
    }

    pub const fn c_halt(&self) -> bool {
        self.0 & Self::C_HALT != 0
    }

    pub const fn s_halt(&self) -> bool {
        self.0 & Self::S_HALT != 0
    }

    pub const fn s_regrdy(&self) -> bool {
        self.0 & Self::S_REGRDY != 0
    }

    pub const fn s_lockup(&self) -> bool {
        self.0 & Self::S_LOCKUP != 0
    }

    pub const fn s_reset_st(&self) -> bool {
        self.0 & Self::S_RESET_ST != 0
    }
}

register_value!(Dhcsr, rw);

/// Debug Core Register Selector Register descriptor, write-only
pub struct DcrsrRegister;

impl MemoryRegister for DcrsrRegister {
    const ADDRESS: u32 = CORE_DEBUG_BASE + 0x4;
    const NAME: &'static str = "DCRSR";
    type Value = Dcrsr;
}

/// Selects a core register and the transfer direction through DCRDR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dcrsr(u32);

impl Dcrsr {
    pub const REGSEL_MASK: u32 = 0x1F;
    pub const REGWNR: u32 = 1 << 16;

    /// Transfer core register `index` into DCRDR.
    pub const fn read(index: u8) -> Self {
        Dcrsr(with_field(0, 0, Self::REGSEL_MASK, index as u32))
    }

    /// Transfer DCRDR into core register `index`.
    pub const fn write(index: u8) -> Self {
        Dcrsr(with_bits(Self::read(index).0, Self::REGWNR, true))
    }

    pub const fn regsel(&self) -> u8 {
        field(self.0, 0, Self::REGSEL_MASK) as u8
    }

    pub const fn is_write(&self) -> bool {
        self.0 & Self::REGWNR != 0
    }
}

// Write-only on hardware; `From<u32>` exists for the memory register plumbing.
register_value!(Dcrsr, rw);

/// Debug Core Register Data Register descriptor
pub struct DcrdrRegister;

impl MemoryRegister for DcrdrRegister {
    const ADDRESS: u32 = CORE_DEBUG_BASE + 0x8;
    const NAME: &'static str = "DCRDR";
    type Value = Dcrdr;
}

/// Data for core register transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dcrdr(u32);

impl Dcrdr {
    pub const fn new(value: u32) -> Self {
        Dcrdr(value)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }
}

register_value!(Dcrdr, rw);

/// Debug Exception and Monitor Control Register descriptor
pub struct DemcrRegister;

impl MemoryRegister for DemcrRegister {
    const ADDRESS: u32 = CORE_DEBUG_BASE + 0xC;
    const NAME: &'static str = "DEMCR";
    type Value = Demcr;
}

/// Vector catch and debug monitor control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Demcr(u32);

impl Demcr {
    pub const VC_CORERESET: u32 = 1 << 0;
    pub const VC_MMERR: u32 = 1 << 4;
    pub const VC_NOCPERR: u32 = 1 << 5;
    pub const VC_CHKERR: u32 = 1 << 6;
    pub const VC_STATERR: u32 = 1 << 7;
    pub const VC_BUSERR: u32 = 1 << 8;
    pub const VC_INTERR: u32 = 1 << 9;
    pub const VC_HARDERR: u32 = 1 << 10;
    pub const MON_EN: u32 = 1 << 16;
    pub const MON_PEND: u32 = 1 << 17;
    pub const MON_STEP: u32 = 1 << 18;
    pub const MON_REQ: u32 = 1 << 19;
    pub const TRCENA: u32 = 1 << 24;

    pub const fn new(value: u32) -> Self {
        Demcr(value)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    pub const fn with_vc_corereset(self, set: bool) -> Self {
        Demcr(with_bits(self.0, Self::VC_CORERESET, set))
    }

    pub const fn vc_corereset(&self) -> bool {
        self.0 & Self::VC_CORERESET != 0
    }
}

register_value!(Demcr, rw);

/// Application Interrupt and Reset Control Register descriptor
pub struct AircrRegister;

impl MemoryRegister for AircrRegister {
    const ADDRESS: u32 = SCB_BASE + 0xC;
    const NAME: &'static str = "AIRCR";
    type Value = Aircr;
}

/// Application Interrupt and Reset Control Register
///
/// Writes are ignored unless bits 31:16 carry [`Aircr::VECTKEY`].  On read
/// the same bits return `0xFA05`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Aircr(u32);

impl Aircr {
    pub const VECTRESET: u32 = 1 << 0;
    pub const VECTCLRACTIVE: u32 = 1 << 1;
    pub const SYSRESETREQ: u32 = 1 << 2;
    pub const PRIGROUP_SHIFT: u32 = 8;
    pub const PRIGROUP_MASK: u32 = 0x7;
    pub const ENDIANNESS: u32 = 1 << 15;
    pub const VECTKEY: u32 = 0x05FA << 16;
    pub const VECTKEYSTAT: u32 = 0xFA05 << 16;

    pub const fn new(value: u32) -> Self {
        Aircr(value)
    }

    /// The write that requests a system reset.
    pub const fn system_reset_request() -> Self {
        Aircr(Self::VECTKEY | Self::SYSRESETREQ)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    pub const fn has_key(&self) -> bool {
        self.0 & 0xFFFF_0000 == Self::VECTKEY
    }

    pub const fn sysresetreq(&self) -> bool {
        self.0 & Self::SYSRESETREQ != 0
    }

    pub const fn prigroup(&self) -> u32 {
        field(self.0, Self::PRIGROUP_SHIFT, Self::PRIGROUP_MASK)
    }

    pub const fn big_endian(&self) -> bool {
        self.0 & Self::ENDIANNESS != 0
    }
}

register_value!(Aircr, rw);

const_assert_eq!(DhcsrRegister::ADDRESS, 0xE000_EDF0);
const_assert_eq!(DemcrRegister::ADDRESS, 0xE000_EDFC);
const_assert_eq!(AircrRegister::ADDRESS, 0xE000_ED0C);
