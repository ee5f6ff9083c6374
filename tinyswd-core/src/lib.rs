// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! tinyswd-core - register maps used by the tinyswd SWD stack.
//!
//! Designed to be used in conjunction with the `tinyswd` library, which
//! implements the SWD link layer and the target controllers on top of these
//! definitions.
//!
//! * [`arm`] - Debug Port, Access Port and MEM-AP registers, plus the
//!   Cortex-M system control space (core debug registers and AIRCR).
//! * [`stm`] - the STM32G0 flash controller and the RCC registers used
//!   before programming.
//!
//! Every register is a zero-sized descriptor carrying its address and name,
//! plus a `u32` newtype with mask/shift constants and accessors.  There is
//! no I/O here.
//!
//! This library is `no_std` compatible and does not allocate.

#![cfg_attr(not(test), no_std)]

pub mod arm;
pub mod stm;

use static_assertions::const_assert;

use crate::arm::register::RegisterDescriptor;

// IDCODE (read) and ABORT (write) share DP address 0x0.
const_assert!(
    arm::dp::IdCodeRegister::ADDRESS == arm::dp::AbortRegister::ADDRESS
);
// Every DP register address is word aligned within the 4 register window.
const_assert!(arm::dp::RdBuffRegister::ADDRESS & !0x0C == 0);
