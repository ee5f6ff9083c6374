// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32G0 flash controller
//!
//! Erases, programs and reads back the embedded flash of an STM32G0 through
//! a borrowed [`SwdInterface`].
//!
//! The flash peripheral must be unlocked, by writing two keys to FLASH_KEYR,
//! before it accepts program or erase requests.  Writing the keys a second
//! time while unlocked locks the peripheral until the next reset, so whether
//! the unlock has been performed is tracked in a [`FlashState`] which
//! outlives any single [`Flash`] borrow.  [`crate::DebugInterface`] owns one
//! alongside its session.
//!
//! Programming is by double word: two 32-bit writes to consecutive
//! addresses, after which the controller programs both and reports end of
//! operation.
//!
//! ```rust,ignore
//! let mut state = FlashState::new();
//! let mut flash = Flash::new(&mut swd_if, &mut state);
//! flash.initialize()?;
//! flash.erase_all(Duration::from_secs(60))?;
//! flash.write(0, &image[..])?;
//! ```

use alloc::boxed::Box;
use alloc::format;
use core::fmt;
use embassy_time::Duration;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use tinyswd_core::arm::map::Csw;
use tinyswd_core::arm::register::MemoryRegister;
use tinyswd_core::stm::{
    FlashAcr, FlashAcrRegister, FlashCr, FlashCrRegister, FlashKeyr, FlashKeyrRegister, FlashSr,
    FlashSrRegister, STM32G0_FLASH_BASE, Stm32G0Rcc,
};

use crate::clock::{Clock, RetryPolicy};
use crate::interface::{RegisterAccess, SwdInterface};
use crate::protocol::Transport;
use crate::{FlashFault, SwdError};

const BUSY_POLL_INTERVAL: Duration = Duration::from_millis(1);
const ERASE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Brings up target clocks before the flash is first unlocked
///
/// Some boards need the target running from a particular clock before the
/// flash will program reliably.  A `ClockSetup` runs once per session, just
/// before the unlock keys are written.
pub trait ClockSetup {
    fn enable_clocks(&mut self, regs: &mut dyn RegisterAccess) -> Result<(), SwdError>;
}

/// Starts the STM32G0 PLL from HSI16, and switches SYSCLK to it
///
/// These are the RCC values for one particular board, so this is opt-in.
/// PLLRDY is not waited for.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stm32G0PllSetup;

impl Stm32G0PllSetup {
    pub const CFGR: u32 = 0x0000_0002;
    pub const PLLCFGR: u32 = 0xF60A_1812;
    pub const CR: u32 = 0x0100_0500;
}

impl ClockSetup for Stm32G0PllSetup {
    fn enable_clocks(&mut self, regs: &mut dyn RegisterAccess) -> Result<(), SwdError> {
        info!("Exec:  Enable PLL");
        regs.write_register(Stm32G0Rcc::CFGR, Self::CFGR)?;
        regs.write_register(Stm32G0Rcc::PLLCFGR, Self::PLLCFGR)?;
        regs.write_register(Stm32G0Rcc::CR, Self::CR)
    }
}

/// Per session flash state
///
/// Cleared when the target is reset, as the hardware relocks the flash and
/// reverts its clocks.
#[derive(Default)]
pub struct FlashState {
    writable: bool,
    clocks_ready: bool,
    clock_setup: Option<Box<dyn ClockSetup>>,
}

impl FlashState {
    /// No clock setup hook.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock_setup(setup: impl ClockSetup + 'static) -> Self {
        let mut state = Self::new();
        state.set_clock_setup(setup);
        state
    }

    pub fn set_clock_setup(&mut self, setup: impl ClockSetup + 'static) {
        self.clock_setup = Some(Box::new(setup));
        self.clocks_ready = false;
    }

    /// Whether the unlock keys have been written, or the flash was found
    /// unlocked, this session.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Whether the clock setup hook has run this session.
    pub fn clocks_ready(&self) -> bool {
        self.clocks_ready
    }

    /// Forgets the unlock and the clock setup, keeping the hook.
    pub fn clear(&mut self) {
        self.writable = false;
        self.clocks_ready = false;
    }
}

impl fmt::Debug for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlashState")
            .field("writable", &self.writable)
            .field("clocks_ready", &self.clocks_ready)
            .field("clock_setup", &self.clock_setup.is_some())
            .finish()
    }
}

/// STM32G0 flash controller, borrowing a link session and its flash state
pub struct Flash<'a, T: Transport, C: Clock> {
    swd: &'a mut SwdInterface<T, C>,
    state: &'a mut FlashState,
}

impl<'a, T: Transport, C: Clock> Flash<'a, T, C> {
    pub fn new(swd: &'a mut SwdInterface<T, C>, state: &'a mut FlashState) -> Self {
        Self { swd, state }
    }

    pub fn is_writable(&self) -> bool {
        self.state.writable
    }

    pub fn read_sr(&mut self) -> Result<FlashSr, SwdError> {
        self.swd.read_mem_register(FlashSrRegister)
    }

    pub fn read_cr(&mut self) -> Result<FlashCr, SwdError> {
        self.swd.read_mem_register(FlashCrRegister)
    }

    pub fn read_acr(&mut self) -> Result<FlashAcr, SwdError> {
        self.swd.read_mem_register(FlashAcrRegister)
    }

    /// Prepares the controller for use.
    ///
    /// Sets the flash latency to 2 wait states, keeping the other ACR bits,
    /// and records whether the flash is already unlocked.
    ///
    /// Returns:
    /// - `Ok(())`: the controller is ready.
    /// - `Err(SwdError::NotReady)`: an operation is in progress.
    pub fn initialize(&mut self) -> Result<(), SwdError> {
        if self.busy()? {
            info!("Error: Flash busy");
            return Err(SwdError::NotReady);
        }

        self.swd.update_register_bits(
            FlashAcrRegister::ADDRESS,
            FlashAcr::LATENCY_MASK,
            FlashAcr::PROGRAMMING_LATENCY,
        )?;

        let cr = self.read_cr()?;
        self.state.writable = !cr.locked();
        debug!("Value: Flash CR {cr}, writable {}", self.state.writable);
        Ok(())
    }

    /// Writes 1 to every sticky error bit in SR, clearing them.
    pub fn clear_errors(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Clear flash errors");
        self.swd
            .write_mem_register(FlashSrRegister, FlashSr::new(FlashSr::ERRORS))
    }

    /// Erases the whole of flash bank 1.
    ///
    /// `timeout` bounds both the wait for any previous operation and the
    /// erase itself.
    pub fn erase_all(&mut self, timeout: Duration) -> Result<(), SwdError> {
        self.make_writable()?;

        let clock = self.swd.clock().clone();
        let start = clock.now();
        RetryPolicy::deadline(timeout, BUSY_POLL_INTERVAL).poll(&clock, "flash erase", || {
            Ok((!self.busy()?).then_some(()))
        })?;

        self.clear_errors()?;
        self.swd
            .write_mem_register(FlashCrRegister, FlashCr::mass_erase())?;
        debug!("Flash erase operation started");

        let remaining = timeout
            .checked_sub(clock.now().duration_since(start))
            .unwrap_or(Duration::from_ticks(0));
        let mut polls: u32 = 0;
        RetryPolicy::deadline(remaining, ERASE_POLL_INTERVAL).poll(&clock, "flash erase", || {
            polls += 1;
            if polls % 10 == 0 {
                debug!("... waiting for flash erase operation to complete");
            }
            Ok((!self.busy()?).then_some(()))
        })?;

        debug!("Flash erase operation completed successfully");
        Ok(())
    }

    /// Programs the bytes from `reader` into flash, starting `offset` bytes
    /// into it.  The flash must have been erased.
    ///
    /// Bytes are taken as little-endian words, two words per program
    /// operation.  A partial final word is padded with zeros, as is the
    /// second word of an incomplete final pair.  `offset` should be a
    /// multiple of 8, otherwise the controller reports an alignment error.
    ///
    /// FLASH_CR is cleared whether or not programming succeeds.
    ///
    /// Returns:
    /// - `Ok(usize)`: the number of bytes taken from `reader`.
    /// - `Err(SwdError::HardwareFault)`: the controller reported an error.
    ///   Any FLASH_SR error bit ends the write.
    /// - `Err(SwdError::Api)`: the data would run past the end of the
    ///   address space.
    /// - `Err(SwdError::Io)`: `reader` failed.
    pub fn write<R: embedded_io::Read>(&mut self, offset: u32, mut reader: R) -> Result<usize, SwdError> {
        self.make_writable()?;

        self.swd.update_csw(
            Csw::transfer(Csw::SIZE_32BIT, Csw::ADDRINC_OFF),
            Csw::new(Csw::SIZE_FIELD.data() | Csw::ADDRINC_FIELD.data()),
        )?;

        let clock = self.swd.clock().clone();
        RetryPolicy::unbounded(BUSY_POLL_INTERVAL).poll(&clock, "flash busy", || {
            Ok((!self.busy()?).then_some(()))
        })?;

        self.clear_errors()?;
        self.swd
            .write_mem_register(FlashCrRegister, FlashCr::program())?;

        let result = self.program(offset, &mut reader);
        let cleared = self
            .swd
            .write_mem_register(FlashCrRegister, FlashCr::new(0));
        let written = result?;
        cleared?;

        // Boot from the newly programmed flash rather than system memory.
        self.swd
            .update_register_bits(FlashAcrRegister::ADDRESS, FlashAcr::EMPTY, 0)?;

        debug!("Flash write done, {written} bytes at offset 0x{offset:08X}");
        Ok(written)
    }

    /// Reads `size` bytes of flash, starting `offset` bytes into it, into
    /// `writer`.  `size` must be a multiple of 4.
    pub fn read<W: embedded_io::Write>(&mut self, offset: u32, size: u32, mut writer: W) -> Result<(), SwdError> {
        if size % 4 != 0 {
            info!("Error: Attempt to read on non-4 byte boundary");
            return Err(SwdError::Api(format!(
                "flash read size {size} is not a multiple of 4"
            )));
        }

        trace!("Exec:  Read flash 0x{offset:08X} {size} bytes");
        for word_offset in (0..size).step_by(4) {
            let address = flash_address(offset, word_offset)?;
            let word = self.swd.read_register(address)?;
            writer.write_all(&word.to_le_bytes()).map_err(SwdError::io)?;
        }
        Ok(())
    }

    /// Locks the flash.  The next write or erase unlocks it again.
    pub fn lock(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Lock flash");
        self.swd
            .update_register_bits(FlashCrRegister::ADDRESS, FlashCr::LOCK, FlashCr::LOCK)?;
        self.state.writable = false;
        Ok(())
    }
}

// Internal functions
impl<'a, T: Transport, C: Clock> Flash<'a, T, C> {
    fn busy(&mut self) -> Result<bool, SwdError> {
        Ok(self.read_sr()?.busy())
    }

    fn make_writable(&mut self) -> Result<(), SwdError> {
        if !self.state.clocks_ready {
            if let Some(setup) = self.state.clock_setup.as_mut() {
                setup.enable_clocks(&mut *self.swd)?;
                self.state.clocks_ready = true;
            }
        }

        if !self.state.writable {
            // A second unlock while unlocked locks the flash until reset
            let cr = self.read_cr()?;
            if cr.locked() {
                debug!("Exec:  Unlock flash");
                self.swd
                    .write_mem_register(FlashKeyrRegister, FlashKeyr::KEY1)?;
                self.swd
                    .write_mem_register(FlashKeyrRegister, FlashKeyr::KEY2)?;
            } else {
                trace!("Value: Flash already unlocked");
            }
            self.state.writable = true;
        }

        Ok(())
    }

    fn program<R: embedded_io::Read>(&mut self, offset: u32, reader: &mut R) -> Result<usize, SwdError> {
        let mut delta: u32 = 0;
        let mut written = 0;

        loop {
            let (first, count) = read_word(reader)?;
            if count == 0 {
                break;
            }
            written += count;
            let (second, count) = read_word(reader)?;
            written += count;

            let address = flash_address(offset, delta)?;
            let second_address = flash_address(offset, delta.saturating_add(4))?;
            self.swd.write_tar(address)?;
            self.swd.write_drw(first)?;

            self.swd.write_tar(second_address)?;
            self.swd.write_drw(second)?;
            delta = delta.saturating_add(8);

            self.wait_for_completion()?;
        }

        Ok(written)
    }

    fn wait_for_completion(&mut self) -> Result<(), SwdError> {
        let clock = self.swd.clock().clone();
        let mut observed = None;

        let result = RetryPolicy::unbounded(BUSY_POLL_INTERVAL).poll(&clock, "flash program", || {
            let sr = self.read_sr()?;
            observed = Some(sr);

            if sr.data() & FlashSr::PGAERR != 0 {
                Err(SwdError::HardwareFault(FlashFault::Alignment))
            } else if sr.data() & FlashSr::PROGERR != 0 {
                Err(SwdError::HardwareFault(FlashFault::Programming))
            } else if sr.data() & FlashSr::OPERR != 0 {
                Err(SwdError::HardwareFault(FlashFault::Operation))
            } else if sr.has_errors() {
                Err(SwdError::HardwareFault(FlashFault::Other(
                    sr.data() & FlashSr::ERRORS,
                )))
            } else {
                Ok(sr.complete().then_some(()))
            }
        });

        if let Err(e) = &result {
            warn!("Flash program operation failed: {e}");
        }

        let written_back = match observed {
            Some(sr) => self.swd.write_mem_register(FlashSrRegister, sr),
            None => Ok(()),
        };
        result?;
        written_back
    }
}

// Bus address of `offset` + `delta` bytes into flash.
fn flash_address(offset: u32, delta: u32) -> Result<u32, SwdError> {
    STM32G0_FLASH_BASE
        .checked_add(offset)
        .and_then(|address| address.checked_add(delta))
        .ok_or_else(|| {
            SwdError::Api(format!(
                "flash offset 0x{offset:08X} + 0x{delta:X} is beyond the address space"
            ))
        })
}

// Fills a little-endian word from `reader`, zero padding a short read.
// Returns the word and the number of bytes taken, 0 at end of stream.
fn read_word<R: embedded_io::Read>(reader: &mut R) -> Result<(u32, usize), SwdError> {
    let mut bytes = [0u8; 4];
    let mut filled = 0;
    while filled < bytes.len() {
        let count = reader.read(&mut bytes[filled..]).map_err(SwdError::io)?;
        if count == 0 {
            break;
        }
        filled += count;
    }
    Ok((u32::from_le_bytes(bytes), filled))
}
