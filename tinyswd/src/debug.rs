// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SWD Debug Interface
//!
//! This module implements a high-level interface to an STM32G0 target.  Its
//! aim is to provide a simple API for resetting, halting and programming the
//! target, without the caller having to manage the controllers' borrows or
//! the flash session state.
//!
//! If this module does not give you the control you need, you can use the
//! [`SwdInterface`] object directly for lower-level SWD access, via
//! [`DebugInterface::swd_if()`].

use embassy_time::Duration;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use tinyswd_core::arm::dp::IdCode;

use crate::SwdError;
use crate::clock::{Clock, SystemClock};
use crate::core_debug::CoreDebug;
use crate::flash::{ClockSetup, Flash, FlashState};
use crate::interface::SwdInterface;
use crate::protocol::Transport;
use crate::scb::Scb;

/// ARM Debug Interface object
///
/// Owns a link session and the flash session state, and hands out the
/// target controllers on demand.
///
/// ```rust,ignore
/// use tinyswd::DebugInterface;
/// use tinyswd::bitbang::BitBang;
///
/// let mut debug = DebugInterface::new(BitBang::new(pins));
/// debug.initialize()?;
///
/// let mut flash = debug.flash();
/// flash.initialize()?;
/// flash.erase_all(Duration::from_secs(60))?;
/// flash.write(0, &image[..])?;
///
/// debug.run_after_reset()?;
/// debug.reset()?;
/// ```
pub struct DebugInterface<T: Transport, C: Clock = SystemClock> {
    swd: SwdInterface<T, C>,
    flash: FlashState,
}

impl<T: Transport> DebugInterface<T, SystemClock> {
    /// Creates a new `DebugInterface` over `transport`, using the
    /// embassy-time clock.
    pub fn new(transport: T) -> Self {
        Self::from_swd(SwdInterface::new(transport))
    }
}

impl<T: Transport, C: Clock> DebugInterface<T, C> {
    /// Creates a new `DebugInterface` with the given [`SwdInterface`].
    pub fn from_swd(swd: SwdInterface<T, C>) -> Self {
        Self {
            swd,
            flash: FlashState::new(),
        }
    }

    /// Installs a hook run once before the flash is first unlocked, for
    /// example [`crate::flash::Stm32G0PllSetup`].
    pub fn with_clock_setup(mut self, setup: impl ClockSetup + 'static) -> Self {
        self.flash.set_clock_setup(setup);
        self
    }

    /// Returns a mutable reference to the underlying [`SwdInterface`].
    pub fn swd_if(&mut self) -> &mut SwdInterface<T, C> {
        &mut self.swd
    }

    /// Gives up the session.
    pub fn into_inner(self) -> SwdInterface<T, C> {
        self.swd
    }

    pub fn flash_state(&self) -> &FlashState {
        &self.flash
    }

    /// Brings the link up, and forgets the flash state.  The flash is
    /// unlocked again on the next write or erase if FLASH_CR says it is
    /// locked.
    ///
    /// Returns:
    /// - `Ok(IdCode)`: the IDCODE of the target's debug port.
    /// - `Err(SwdError)`: the link could not be brought up.
    pub fn initialize(&mut self) -> Result<IdCode, SwdError> {
        self.flash.clear();
        let idcode = self.swd.initialize()?;
        debug!("Target initialized, IDCODE {idcode}");
        Ok(idcode)
    }

    pub fn core_debug(&mut self) -> CoreDebug<'_, T, C> {
        CoreDebug::new(&mut self.swd)
    }

    pub fn scb(&mut self) -> Scb<'_, T, C> {
        Scb::new(&mut self.swd)
    }

    pub fn flash(&mut self) -> Flash<'_, T, C> {
        Flash::new(&mut self.swd, &mut self.flash)
    }

    /// Resets the target.
    ///
    /// Clears the core debug registers, then requests a system reset.  The
    /// link is lost, and [`Self::initialize()`] must be called before the
    /// target is used again.
    pub fn reset(&mut self) -> Result<(), SwdError> {
        self.core_debug().reset_registers()?;
        let result = self.scb().reset_system();
        self.flash.clear();
        result
    }

    pub fn halt(&mut self) -> Result<(), SwdError> {
        self.core_debug().halt()
    }

    pub fn resume(&mut self) -> Result<(), SwdError> {
        self.core_debug().resume()
    }

    pub fn run_after_reset(&mut self) -> Result<(), SwdError> {
        self.core_debug().run_after_reset()
    }

    /// Erases, programs and verifies `image` at the start of flash.
    ///
    /// Returns:
    /// - `Ok(())`: flash holds `image`.
    /// - `Err(SwdError::Api)`: the read back did not match.
    /// - `Err(SwdError)`: any step failed.
    pub fn program(&mut self, image: &[u8], erase_timeout: Duration) -> Result<(), SwdError> {
        let mut flash = self.flash();
        flash.initialize()?;

        info!("Erasing flash...");
        flash.erase_all(erase_timeout)?;

        info!("Writing flash ({} bytes)...", image.len());
        flash.write(0, image)?;

        info!("Verifying flash...");
        let size = image.len().div_ceil(4) * 4;
        let mut readback = alloc::vec::Vec::with_capacity(size);
        let size = u32::try_from(size)
            .map_err(|_| SwdError::Api(alloc::format!("image of {size} bytes too large")))?;
        flash.read(0, size, &mut readback)?;

        if &readback[..image.len()] != image {
            warn!("Flash verification failed");
            return Err(SwdError::Api(alloc::string::String::from(
                "flash verification failed",
            )));
        }
        Ok(())
    }
}
