// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Memory Access Port Registers

use crate::arm::register::{
    ApRegister, ReadableRegister, RegisterDescriptor, WritableRegister, field, with_bits,
    with_field,
};
use crate::register_value;

/// Control/Status Word register descriptor, read-write
pub struct CswRegister;

impl RegisterDescriptor for CswRegister {
    const ADDRESS: u8 = 0x00;
    const NAME: &'static str = "CSW";
    type Value = Csw;
}

impl ReadableRegister for CswRegister {}
impl WritableRegister for CswRegister {}
impl ApRegister for CswRegister {}

/// MEM-AP Control/Status Word
///
/// Controls the access size and TAR auto-increment for DRW transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Csw(u32);

impl Csw {
    pub const SIZE_SHIFT: u32 = 0;
    pub const SIZE_MASK: u32 = 0b111;
    pub const ADDRINC_SHIFT: u32 = 4;
    pub const ADDRINC_MASK: u32 = 0b11;
    pub const DEVICE_EN: u32 = 1 << 6;
    pub const TR_IN_PROG: u32 = 1 << 7;
    pub const MODE_SHIFT: u32 = 8;
    pub const MODE_MASK: u32 = 0xF;
    pub const PROT_SHIFT: u32 = 24;
    pub const PROT_MASK: u32 = 0x7F;
    pub const DBG_SW_ENABLE: u32 = 1 << 31;

    pub const SIZE_8BIT: u32 = 0b000;
    pub const SIZE_16BIT: u32 = 0b001;
    pub const SIZE_32BIT: u32 = 0b010;

    pub const ADDRINC_OFF: u32 = 0b00;
    pub const ADDRINC_SINGLE: u32 = 0b01;
    pub const ADDRINC_PACKED: u32 = 0b10;

    /// HPROT: privileged data access, with bit 24 set as Cortex-M expects
    pub const PROT_DEFAULT: u32 = 0x23;

    /// In-place mask covering the size field, for use with `update_csw`.
    pub const SIZE_FIELD: Csw = Csw(Self::SIZE_MASK << Self::SIZE_SHIFT);
    /// In-place mask covering the address increment field.
    pub const ADDRINC_FIELD: Csw = Csw(Self::ADDRINC_MASK << Self::ADDRINC_SHIFT);

    pub const fn new(value: u32) -> Self {
        Csw(value)
    }

    /// A CSW carrying only the size and address increment fields.  Combine
    /// with the `*_FIELD` masks for a read-modify-write.
    pub const fn transfer(size: u32, addrinc: u32) -> Self {
        Csw(0).with_size(size).with_addrinc(addrinc)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    pub const fn size(&self) -> u32 {
        field(self.0, Self::SIZE_SHIFT, Self::SIZE_MASK)
    }

    pub const fn addrinc(&self) -> u32 {
        field(self.0, Self::ADDRINC_SHIFT, Self::ADDRINC_MASK)
    }

    pub const fn device_en(&self) -> bool {
        self.0 & Self::DEVICE_EN != 0
    }

    pub const fn tr_in_prog(&self) -> bool {
        self.0 & Self::TR_IN_PROG != 0
    }

    pub const fn prot(&self) -> u32 {
        field(self.0, Self::PROT_SHIFT, Self::PROT_MASK)
    }

    pub const fn with_size(self, size: u32) -> Self {
        Csw(with_field(self.0, Self::SIZE_SHIFT, Self::SIZE_MASK, size))
    }

    pub const fn with_addrinc(self, addrinc: u32) -> Self {
        Csw(with_field(
            self.0,
            Self::ADDRINC_SHIFT,
            Self::ADDRINC_MASK,
            addrinc,
        ))
    }

    pub const fn with_device_en(self, enable: bool) -> Self {
        Csw(with_bits(self.0, Self::DEVICE_EN, enable))
    }

    pub const fn with_prot(self, prot: u32) -> Self {
        Csw(with_field(self.0, Self::PROT_SHIFT, Self::PROT_MASK, prot))
    }

    /// `(self & !mask) | (value & mask)`
    pub const fn merge(self, value: Csw, mask: Csw) -> Self {
        Csw((self.0 & !mask.0) | (value.0 & mask.0))
    }
}

impl Default for Csw {
    /// 32-bit, no auto-increment, device enabled, privileged debug access
    fn default() -> Self {
        Csw(0)
            .with_prot(Self::PROT_DEFAULT)
            .with_size(Self::SIZE_32BIT)
            .with_addrinc(Self::ADDRINC_OFF)
            .with_device_en(true)
    }
}

register_value!(Csw, rw);

/// Transfer Address Register descriptor, read-write
pub struct TarRegister;

impl RegisterDescriptor for TarRegister {
    const ADDRESS: u8 = 0x04;
    const NAME: &'static str = "TAR";
    type Value = Tar;
}

impl ReadableRegister for TarRegister {}
impl WritableRegister for TarRegister {}
impl ApRegister for TarRegister {}

/// Target memory address for the next DRW access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tar(u32);

impl Tar {
    pub const fn new(address: u32) -> Self {
        Tar(address)
    }

    pub const fn address(&self) -> u32 {
        self.0
    }
}

register_value!(Tar, rw);

/// Data Read/Write register descriptor, read-write
pub struct DrwRegister;

impl RegisterDescriptor for DrwRegister {
    const ADDRESS: u8 = 0x0C;
    const NAME: &'static str = "DRW";
    type Value = Drw;
}

impl ReadableRegister for DrwRegister {}
impl WritableRegister for DrwRegister {}
impl ApRegister for DrwRegister {}

/// Data transferred to or from the address in TAR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drw(u32);

impl Drw {
    pub const fn new(data: u32) -> Self {
        Drw(data)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }
}

register_value!(Drw, rw);
