// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Register descriptor traits
//!
//! Every register tinyswd knows about is described by a zero-sized descriptor
//! type plus a `u32` newtype holding its value.  The descriptor carries the
//! address and a short name, which the link session passes to its
//! transaction hook, so traces show `CTRL/STAT` rather than `DP 0x04`.
//!
//! DP and AP registers are addressed by an 8-bit register offset and accessed
//! with
//!
//! * `tinyswd::SwdInterface::read_dp_register`
//! * `tinyswd::SwdInterface::write_dp_register`
//! * `tinyswd::SwdInterface::read_ap_register`
//! * `tinyswd::SwdInterface::write_ap_register`
//!
//! Memory mapped registers (Cortex-M system control space, flash peripheral)
//! implement [`MemoryRegister`] and are accessed through the MEM-AP with
//! `tinyswd::SwdInterface::read_mem_register` and
//! `tinyswd::SwdInterface::write_mem_register`.

/// Base trait for DP and AP register descriptors
pub trait RegisterDescriptor {
    /// Register offset within the DP, or within the AP's register space
    /// (bank in bits 7:4, register in bits 3:2).
    const ADDRESS: u8;
    /// Short name, used in logs and by transaction hooks.
    const NAME: &'static str;
    type Value;
}

/// Registers that can be read
pub trait ReadableRegister: RegisterDescriptor {
    fn from_raw(data: u32) -> Self::Value
    where
        Self::Value: From<u32>,
    {
        Self::Value::from(data)
    }
}

/// Registers that can be written
pub trait WritableRegister: RegisterDescriptor {
    fn to_raw(value: Self::Value) -> u32
    where
        Self::Value: Into<u32>,
    {
        value.into()
    }
}

/// Debug Port registers (accessed via DP operations)
pub trait DpRegister: RegisterDescriptor {}

/// Access Port registers (accessed via AP operations, after SELECT)
pub trait ApRegister: RegisterDescriptor {
    /// The APBANKSEL value implied by this register's address.
    fn bank() -> u8 {
        Self::ADDRESS >> 4
    }
}

/// Memory mapped target registers, reached through the MEM-AP's TAR and DRW.
pub trait MemoryRegister {
    const ADDRESS: u32;
    const NAME: &'static str;
    type Value: From<u32> + Into<u32>;
}

/// Generates the `u32` plumbing for a register value newtype.
///
/// The access mode controls which conversions exist:
///
/// * `r` - `From<u32>` only, plus `Into<u32>` so the raw value is available
/// * `rw` - both directions
/// * `w` - `Into<u32>` only
///
/// All modes get a `0x%08X` `Display`.
#[macro_export]
macro_rules! register_value {
    ($name:ident, r) => {
        $crate::register_value!(@from $name);
        $crate::register_value!(@into $name);
        $crate::register_value!(@display $name);
    };
    ($name:ident, rw) => {
        $crate::register_value!(@from $name);
        $crate::register_value!(@into $name);
        $crate::register_value!(@display $name);
    };
    ($name:ident, w) => {
        $crate::register_value!(@into $name);
        $crate::register_value!(@display $name);
    };
    (@from $name:ident) => {
        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                $name(value)
            }
        }
    };
    (@into $name:ident) => {
        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }
    };
    (@display $name:ident) => {
        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }
    };
}

/// Extracts a field from a raw register value.
#[inline]
pub const fn field(value: u32, shift: u32, mask: u32) -> u32 {
    (value >> shift) & mask
}

/// Returns `value` with the field at `shift`/`mask` replaced by `field`.
#[inline]
pub const fn with_field(value: u32, shift: u32, mask: u32, field: u32) -> u32 {
    (value & !(mask << shift)) | ((field & mask) << shift)
}

/// Returns `value` with `bits` set or cleared.
#[inline]
pub const fn with_bits(value: u32, bits: u32, set: bool) -> u32 {
    if set { value | bits } else { value & !bits }
}
