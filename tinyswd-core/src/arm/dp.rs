// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Debug Port Registers

use crate::arm::register::{
    DpRegister, ReadableRegister, RegisterDescriptor, WritableRegister, field, with_bits,
    with_field,
};
use crate::register_value;
use core::fmt;

/// IDCODE (DPIDR) register descriptor, read-only
pub struct IdCodeRegister;

impl RegisterDescriptor for IdCodeRegister {
    const ADDRESS: u8 = 0x00;
    const NAME: &'static str = "IDCODE";
    type Value = IdCode;
}

impl ReadableRegister for IdCodeRegister {}
impl DpRegister for IdCodeRegister {}

/// Debug Port IDCODE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdCode(u32);

impl IdCode {
    const DESIGNER_ARM: u16 = 0x23B;

    pub const fn new(value: u32) -> Self {
        IdCode(value)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    /// Bits 31:28
    pub const fn revision(&self) -> u8 {
        field(self.0, 28, 0xF) as u8
    }

    /// Bits 27:20
    pub const fn part_number(&self) -> u8 {
        field(self.0, 20, 0xFF) as u8
    }

    /// Bits 15:12, the DP architecture version
    pub const fn version(&self) -> u8 {
        field(self.0, 12, 0xF) as u8
    }

    /// JEDEC designer code, bits 11:1
    pub const fn designer_id(&self) -> u16 {
        field(self.0, 1, 0x7FF) as u16
    }

    /// Bit 0 reads as one on every real DP.  An all-zeros or all-ones
    /// IDCODE means nothing answered.
    pub const fn is_valid(&self) -> bool {
        self.0 & 1 == 1 && self.0 != 0xFFFF_FFFF
    }

    pub const fn designer_name(&self) -> &'static str {
        match self.designer_id() {
            Self::DESIGNER_ARM => "ARM Ltd",
            _ => "Unknown",
        }
    }
}

register_value!(IdCode, r);

impl fmt::LowerHex for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// ABORT register descriptor, write-only.  Shares address 0x00 with IDCODE.
pub struct AbortRegister;

impl RegisterDescriptor for AbortRegister {
    const ADDRESS: u8 = 0x00;
    const NAME: &'static str = "ABORT";
    type Value = Abort;
}

impl WritableRegister for AbortRegister {}
impl DpRegister for AbortRegister {}

/// ABORT flags
///
/// Write-only, so no state is ever cached for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Abort(u32);

impl Abort {
    pub const DAPABORT: u32 = 1 << 0;
    pub const STKCMPCLR: u32 = 1 << 1;
    pub const STKERRCLR: u32 = 1 << 2;
    pub const WDERRCLR: u32 = 1 << 3;
    pub const ORUNERRCLR: u32 = 1 << 4;

    /// Clears every sticky flag without aborting an in-flight transfer.
    pub const ALL: Abort =
        Abort(Self::STKCMPCLR | Self::STKERRCLR | Self::WDERRCLR | Self::ORUNERRCLR);

    pub const fn new(flags: u32) -> Self {
        Abort(flags)
    }

    pub const fn with_dapabort(self, set: bool) -> Self {
        Abort(with_bits(self.0, Self::DAPABORT, set))
    }

    pub const fn with_stkerrclr(self, set: bool) -> Self {
        Abort(with_bits(self.0, Self::STKERRCLR, set))
    }

    pub const fn with_orunerrclr(self, set: bool) -> Self {
        Abort(with_bits(self.0, Self::ORUNERRCLR, set))
    }

    pub const fn flags(&self) -> u32 {
        self.0
    }
}

register_value!(Abort, w);

/// CTRL/STAT register descriptor, read-write
pub struct CtrlStatRegister;

impl RegisterDescriptor for CtrlStatRegister {
    const ADDRESS: u8 = 0x04;
    const NAME: &'static str = "CTRL/STAT";
    type Value = CtrlStat;
}

impl ReadableRegister for CtrlStatRegister {}
impl WritableRegister for CtrlStatRegister {}
impl DpRegister for CtrlStatRegister {}

/// Debug Port control and status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtrlStat(u32);

impl CtrlStat {
    pub const ORUNDETECT: u32 = 1 << 0;
    pub const STICKYORUN: u32 = 1 << 1;
    pub const TRNMODE_SHIFT: u32 = 2;
    pub const TRNMODE_MASK: u32 = 0b11;
    pub const STICKYCMP: u32 = 1 << 4;
    pub const STICKYERR: u32 = 1 << 5;
    pub const READOK: u32 = 1 << 6;
    pub const WDATAERR: u32 = 1 << 7;
    pub const MASKLANE_SHIFT: u32 = 8;
    pub const MASKLANE_MASK: u32 = 0xF;
    pub const TRNCNT_SHIFT: u32 = 12;
    pub const TRNCNT_MASK: u32 = 0xFFF;
    pub const CDBGRSTREQ: u32 = 1 << 26;
    pub const CDBGRSTACK: u32 = 1 << 27;
    pub const CDBGPWRUPREQ: u32 = 1 << 28;
    pub const CDBGPWRUPACK: u32 = 1 << 29;
    pub const CSYSPWRUPREQ: u32 = 1 << 30;
    pub const CSYSPWRUPACK: u32 = 1 << 31;

    /// Sticky error flags, cleared through ABORT.
    pub const STICKY_ERRORS: u32 =
        Self::STICKYORUN | Self::STICKYCMP | Self::STICKYERR | Self::WDATAERR;

    pub const fn new(value: u32) -> Self {
        CtrlStat(value)
    }

    /// Requests both the debug and system power domains.
    pub const fn power_up_request() -> Self {
        CtrlStat(Self::CDBGPWRUPREQ | Self::CSYSPWRUPREQ)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    pub const fn cdbgpwrupack(&self) -> bool {
        self.0 & Self::CDBGPWRUPACK != 0
    }

    pub const fn csyspwrupack(&self) -> bool {
        self.0 & Self::CSYSPWRUPACK != 0
    }

    /// Both power domains acknowledged.
    pub const fn powered_up(&self) -> bool {
        self.cdbgpwrupack() && self.csyspwrupack()
    }

    pub const fn has_errors(&self) -> bool {
        self.0 & Self::STICKY_ERRORS != 0
    }

    pub const fn trnmode(&self) -> u32 {
        field(self.0, Self::TRNMODE_SHIFT, Self::TRNMODE_MASK)
    }

    pub const fn masklane(&self) -> u32 {
        field(self.0, Self::MASKLANE_SHIFT, Self::MASKLANE_MASK)
    }

    pub const fn trncnt(&self) -> u32 {
        field(self.0, Self::TRNCNT_SHIFT, Self::TRNCNT_MASK)
    }

    pub const fn with_masklane(self, lanes: u32) -> Self {
        CtrlStat(with_field(
            self.0,
            Self::MASKLANE_SHIFT,
            Self::MASKLANE_MASK,
            lanes,
        ))
    }

    /// Human readable list of the sticky error flags that are set.
    pub fn error_states(&self) -> impl Iterator<Item = &'static str> {
        let value = self.0;
        [
            (Self::STICKYORUN, "STICKYORUN"),
            (Self::STICKYCMP, "STICKYCMP"),
            (Self::STICKYERR, "STICKYERR"),
            (Self::WDATAERR, "WDATAERR"),
        ]
        .into_iter()
        .filter(move |(bit, _)| value & bit != 0)
        .map(|(_, name)| name)
    }
}

register_value!(CtrlStat, rw);

/// SELECT register descriptor, write-only
pub struct SelectRegister;

impl RegisterDescriptor for SelectRegister {
    const ADDRESS: u8 = 0x08;
    const NAME: &'static str = "SELECT";
    type Value = Select;
}

impl WritableRegister for SelectRegister {}
impl DpRegister for SelectRegister {}

/// AP and bank selection
///
/// The link session caches the last value it wrote, so it only appears on
/// the wire when the AP or bank changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Select(u32);

impl Select {
    const APSEL_SHIFT: u32 = 24;
    const APSEL_MASK: u32 = 0xFF;
    const APBANKSEL_SHIFT: u32 = 4;
    const APBANKSEL_MASK: u32 = 0xF;
    const DPBANKSEL_MASK: u32 = 0xF;

    /// SELECT for register bank `bank` of access port `apsel`.
    pub const fn new(apsel: u8, bank: u8) -> Self {
        let value = with_field(0, Self::APSEL_SHIFT, Self::APSEL_MASK, apsel as u32);
        Select(with_field(
            value,
            Self::APBANKSEL_SHIFT,
            Self::APBANKSEL_MASK,
            bank as u32,
        ))
    }

    pub const fn apsel(&self) -> u8 {
        field(self.0, Self::APSEL_SHIFT, Self::APSEL_MASK) as u8
    }

    pub const fn apbanksel(&self) -> u8 {
        field(self.0, Self::APBANKSEL_SHIFT, Self::APBANKSEL_MASK) as u8
    }

    pub const fn dpbanksel(&self) -> u8 {
        (self.0 & Self::DPBANKSEL_MASK) as u8
    }

    pub const fn data(&self) -> u32 {
        self.0
    }
}

register_value!(Select, rw);

/// RDBUFF register descriptor, read-only
pub struct RdBuffRegister;

impl RegisterDescriptor for RdBuffRegister {
    const ADDRESS: u8 = 0x0C;
    const NAME: &'static str = "RDBUFF";
    type Value = RdBuff;
}

impl ReadableRegister for RdBuffRegister {}
impl DpRegister for RdBuffRegister {}

/// Result of the previous AP read.  Reading it does not start a new AP
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RdBuff(u32);

impl RdBuff {
    pub const fn data(&self) -> u32 {
        self.0
    }
}

register_value!(RdBuff, r);
