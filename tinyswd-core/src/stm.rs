// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! tinyswd-core - STM32 specific objects
//!
//! Register map for the STM32G0 embedded flash controller, which programs
//! flash a double word (two 32-bit words) at a time, plus the few RCC
//! registers touched by clock bring-up before flash programming.

use crate::arm::register::{MemoryRegister, field, with_field};
use crate::register_value;
use static_assertions::{const_assert, const_assert_eq};

/// Flash memory base address
pub const STM32G0_FLASH_BASE: u32 = 0x0800_0000;

/// Flash page size, the smallest erasable unit
pub const STM32G0_FLASH_PAGE_SIZE: u32 = 2048;

/// Flash controller register base address
pub const STM32G0_FLASH_REG_BASE: u32 = 0x4002_2000;

/// RCC register base address
pub const STM32G0_RCC_REG_BASE: u32 = 0x4002_1000;

/// FLASH_ACR descriptor
pub struct FlashAcrRegister;

impl MemoryRegister for FlashAcrRegister {
    const ADDRESS: u32 = STM32G0_FLASH_REG_BASE;
    const NAME: &'static str = "FLASH_ACR";
    type Value = FlashAcr;
}

/// FLASH_ACR - access control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashAcr(u32);

impl FlashAcr {
    pub const LATENCY_MASK: u32 = 0x7;
    pub const PRFTEN: u32 = 1 << 8;
    pub const ICEN: u32 = 1 << 9;
    pub const ICRST: u32 = 1 << 11;
    /// Set when the main flash was empty at reset; the part then boots
    /// from system memory.
    pub const EMPTY: u32 = 1 << 16;
    pub const DBG_SWEN: u32 = 1 << 18;

    /// Wait states needed once the core runs from the PLL.
    pub const PROGRAMMING_LATENCY: u32 = 2;

    pub const fn new(value: u32) -> Self {
        FlashAcr(value)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    pub const fn latency(&self) -> u32 {
        field(self.0, 0, Self::LATENCY_MASK)
    }

    pub const fn with_latency(self, latency: u32) -> Self {
        FlashAcr(with_field(self.0, 0, Self::LATENCY_MASK, latency))
    }

    pub const fn empty(&self) -> bool {
        self.0 & Self::EMPTY != 0
    }
}

register_value!(FlashAcr, rw);

/// FLASH_KEYR descriptor, write-only
///
/// Writing [`FlashKeyr::KEY1`] then [`FlashKeyr::KEY2`] clears
/// [`FlashCr::LOCK`].  Any other write, or a repeat of the sequence while
/// unlocked, locks FLASH_CR until the next reset.
pub struct FlashKeyrRegister;

impl MemoryRegister for FlashKeyrRegister {
    const ADDRESS: u32 = STM32G0_FLASH_REG_BASE + 0x08;
    const NAME: &'static str = "FLASH_KEYR";
    type Value = FlashKeyr;
}

/// FLASH_KEYR value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashKeyr(u32);

impl FlashKeyr {
    pub const KEY1: FlashKeyr = FlashKeyr(0x4567_0123);
    pub const KEY2: FlashKeyr = FlashKeyr(0xCDEF_89AB);
}

register_value!(FlashKeyr, rw);

/// FLASH_OPTKEYR address, unused beyond the map
pub const STM32G0_FLASH_OPTKEYR: u32 = STM32G0_FLASH_REG_BASE + 0x0C;

/// FLASH_SR descriptor
pub struct FlashSrRegister;

impl MemoryRegister for FlashSrRegister {
    const ADDRESS: u32 = STM32G0_FLASH_REG_BASE + 0x10;
    const NAME: &'static str = "FLASH_SR";
    type Value = FlashSr;
}

/// FLASH_SR - status.  Error flags and EOP are write-1-to-clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashSr(u32);

impl FlashSr {
    pub const EOP: u32 = 1 << 0;
    pub const OPERR: u32 = 1 << 1;
    pub const PROGERR: u32 = 1 << 3;
    pub const WRPERR: u32 = 1 << 4;
    pub const PGAERR: u32 = 1 << 5;
    pub const SIZERR: u32 = 1 << 6;
    pub const PGSERR: u32 = 1 << 7;
    pub const MISSERR: u32 = 1 << 8;
    pub const FASTERR: u32 = 1 << 9;
    pub const BSY1: u32 = 1 << 16;
    pub const BSY2: u32 = 1 << 17;

    /// Every sticky error flag
    pub const ERRORS: u32 = Self::OPERR
        | Self::PROGERR
        | Self::WRPERR
        | Self::PGAERR
        | Self::SIZERR
        | Self::PGSERR
        | Self::MISSERR
        | Self::FASTERR;

    pub const fn new(value: u32) -> Self {
        FlashSr(value)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    pub const fn busy(&self) -> bool {
        self.0 & Self::BSY1 != 0
    }

    pub const fn eop(&self) -> bool {
        self.0 & Self::EOP != 0
    }

    pub const fn has_errors(&self) -> bool {
        self.0 & Self::ERRORS != 0
    }

    /// The operation finished: EOP set and BSY1 clear.
    pub const fn complete(&self) -> bool {
        self.0 & (Self::BSY1 | Self::EOP) == Self::EOP
    }
}

register_value!(FlashSr, rw);

/// FLASH_CR descriptor
pub struct FlashCrRegister;

impl MemoryRegister for FlashCrRegister {
    const ADDRESS: u32 = STM32G0_FLASH_REG_BASE + 0x14;
    const NAME: &'static str = "FLASH_CR";
    type Value = FlashCr;
}

/// FLASH_CR - control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashCr(u32);

impl FlashCr {
    pub const PG: u32 = 1 << 0;
    pub const PER: u32 = 1 << 1;
    pub const MER1: u32 = 1 << 2;
    pub const MER2: u32 = 1 << 15;
    pub const STRT: u32 = 1 << 16;
    pub const OPTSTRT: u32 = 1 << 17;
    pub const FSTPG: u32 = 1 << 18;
    pub const EOPIE: u32 = 1 << 24;
    pub const OPTLOCK: u32 = 1 << 30;
    pub const LOCK: u32 = 1 << 31;

    pub const fn new(value: u32) -> Self {
        FlashCr(value)
    }

    /// Programming enabled, with EOP reporting so completion can be polled.
    pub const fn program() -> Self {
        FlashCr(Self::PG | Self::EOPIE)
    }

    /// Bank 1 mass erase, started.
    pub const fn mass_erase() -> Self {
        FlashCr(Self::MER1 | Self::STRT)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    pub const fn locked(&self) -> bool {
        self.0 & Self::LOCK != 0
    }
}

register_value!(FlashCr, rw);

/// FLASH_ECCR address, unused beyond the map
pub const STM32G0_FLASH_ECCR: u32 = STM32G0_FLASH_REG_BASE + 0x18;

/// FLASH_OPTR address, unused beyond the map
pub const STM32G0_FLASH_OPTR: u32 = STM32G0_FLASH_REG_BASE + 0x20;

/// RCC registers written by clock bring-up
pub struct Stm32G0Rcc;

impl Stm32G0Rcc {
    pub const CR: u32 = STM32G0_RCC_REG_BASE;
    pub const CFGR: u32 = STM32G0_RCC_REG_BASE + 0x08;
    pub const PLLCFGR: u32 = STM32G0_RCC_REG_BASE + 0x0C;

    pub const CR_PLLON: u32 = 1 << 24;
    pub const CR_PLLRDY: u32 = 1 << 25;
}

const_assert_eq!(FlashSrRegister::ADDRESS, 0x4002_2010);
const_assert_eq!(FlashCrRegister::ADDRESS, 0x4002_2014);
const_assert!(FlashKeyr::KEY1.0 != FlashKeyr::KEY2.0);
const_assert!(FlashSr::ERRORS & (FlashSr::BSY1 | FlashSr::EOP) == 0);
const_assert!(STM32G0_FLASH_PAGE_SIZE % 8 == 0);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn completion() {
        assert!(FlashSr::new(FlashSr::EOP).complete());
        assert!(!FlashSr::new(FlashSr::EOP | FlashSr::BSY1).complete());
        assert!(!FlashSr::new(0).complete());
    }

    #[test]
    fn error_mask() {
        assert_eq!(FlashSr::ERRORS, 0x3FA);
        assert!(FlashSr::new(FlashSr::PGAERR).has_errors());
        assert!(!FlashSr::new(FlashSr::EOP | FlashSr::BSY1).has_errors());
    }

    #[test]
    fn acr_latency() {
        let acr = FlashAcr::new(FlashAcr::EMPTY | FlashAcr::ICEN | 0x1);
        let acr = acr.with_latency(FlashAcr::PROGRAMMING_LATENCY);
        assert_eq!(acr.latency(), 2);
        assert!(acr.empty());
        assert_eq!(u32::from(acr), FlashAcr::EMPTY | FlashAcr::ICEN | 0x2);
    }

    #[test]
    fn control_values() {
        assert_eq!(FlashCr::program().data(), 0x0100_0001);
        assert_eq!(FlashCr::mass_erase().data(), 0x0001_0004);
        assert!(FlashCr::new(FlashCr::LOCK).locked());
    }
}
