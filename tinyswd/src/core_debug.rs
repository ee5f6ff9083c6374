// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Cortex-M core debug controller
//!
//! Drives the core debug registers (DHCSR, DCRSR, DCRDR, DEMCR) through a
//! borrowed [`SwdInterface`]: halting and resuming the core, clearing debug
//! state before a reset, and transferring core registers while halted.
//!
//! Every DHCSR write carries the debug key, so the hardware does not ignore
//! it.

use embassy_time::Duration;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use tinyswd_core::arm::scs::{
    Dcrdr, DcrdrRegister, Dcrsr, DcrsrRegister, Demcr, DemcrRegister, Dhcsr, DhcsrRegister,
};

use crate::SwdError;
use crate::clock::{Clock, RetryPolicy};
use crate::interface::SwdInterface;
use crate::protocol::Transport;

const HALT_POLICY: RetryPolicy = RetryPolicy::attempts(10, Duration::from_millis(100));
const RESUME_POLICY: RetryPolicy = RetryPolicy::attempts(10, Duration::from_millis(1));
const REGRDY_POLICY: RetryPolicy = RetryPolicy::attempts(10, Duration::from_millis(1));

/// Core debug register controller, borrowing a link session
pub struct CoreDebug<'a, T: Transport, C: Clock> {
    swd: &'a mut SwdInterface<T, C>,
}

impl<'a, T: Transport, C: Clock> CoreDebug<'a, T, C> {
    pub fn new(swd: &'a mut SwdInterface<T, C>) -> Self {
        Self { swd }
    }

    pub fn read_dhcsr(&mut self) -> Result<Dhcsr, SwdError> {
        self.swd.read_mem_register(DhcsrRegister)
    }

    /// Writes DHCSR.  The debug key replaces whatever is in bits 31:16.
    pub fn write_dhcsr(&mut self, value: Dhcsr) -> Result<(), SwdError> {
        self.swd.write_mem_register(DhcsrRegister, value.keyed())
    }

    pub fn write_dcrsr(&mut self, value: Dcrsr) -> Result<(), SwdError> {
        self.swd.write_mem_register(DcrsrRegister, value)
    }

    pub fn read_dcrdr(&mut self) -> Result<Dcrdr, SwdError> {
        self.swd.read_mem_register(DcrdrRegister)
    }

    pub fn write_dcrdr(&mut self, value: Dcrdr) -> Result<(), SwdError> {
        self.swd.write_mem_register(DcrdrRegister, value)
    }

    pub fn read_demcr(&mut self) -> Result<Demcr, SwdError> {
        self.swd.read_mem_register(DemcrRegister)
    }

    pub fn write_demcr(&mut self, value: Demcr) -> Result<(), SwdError> {
        self.swd.write_mem_register(DemcrRegister, value)
    }

    /// Clears the debug control bits and all vector catches, leaving the
    /// core to run normally out of the next reset.
    pub fn reset_registers(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Reset core debug registers");
        self.write_dhcsr(Dhcsr::control(0))?;
        self.write_demcr(Demcr::new(0))
    }

    /// Halts the core, with interrupts masked.
    ///
    /// Returns:
    /// - `Ok(())`: the core reports S_HALT.
    /// - `Err(SwdError::Timeout)`: the core did not halt within 10 polls,
    ///   100ms apart.
    pub fn halt(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Halt core");
        self.write_dhcsr(Dhcsr::control(Dhcsr::C_DEBUGEN | Dhcsr::C_HALT))?;
        self.write_dhcsr(Dhcsr::control(
            Dhcsr::C_DEBUGEN | Dhcsr::C_HALT | Dhcsr::C_MASKINTS,
        ))?;

        let clock = self.swd.clock().clone();
        HALT_POLICY.poll(&clock, "halt", || {
            let dhcsr = self.read_dhcsr()?;
            trace!("Value: DHCSR {dhcsr}");
            Ok(dhcsr.s_halt().then_some(()))
        })?;

        debug!("OK:    Core halted");
        Ok(())
    }

    /// Lets a halted core continue, leaving debug enabled.  Succeeds
    /// straight away if the core is already running.
    pub fn resume(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Resume core");
        self.write_dhcsr(Dhcsr::control(Dhcsr::C_DEBUGEN))?;

        let clock = self.swd.clock().clone();
        RESUME_POLICY.poll(&clock, "continue", || {
            let dhcsr = self.read_dhcsr()?;
            Ok((!dhcsr.s_halt()).then_some(()))
        })?;

        debug!("OK:    Core running");
        Ok(())
    }

    /// Releases the core from debug control, for use around a system reset.
    pub fn run_after_reset(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Run after reset");
        self.write_dhcsr(Dhcsr::control(0))
    }

    pub fn is_halted(&mut self) -> Result<bool, SwdError> {
        Ok(self.read_dhcsr()?.s_halt())
    }

    /// Reads core register `index` (R0-R12, SP, LR, DebugReturnAddress,
    /// xPSR, ...).  The core must be halted.
    pub fn read_core_register(&mut self, index: u8) -> Result<u32, SwdError> {
        check_index(index)?;
        self.write_dcrsr(Dcrsr::read(index))?;
        self.wait_register_ready()?;
        let value = self.read_dcrdr()?.data();
        trace!("Value: Core register {index} 0x{value:08X}");
        Ok(value)
    }

    /// Writes core register `index`.  The core must be halted.
    pub fn write_core_register(&mut self, index: u8, value: u32) -> Result<(), SwdError> {
        check_index(index)?;
        trace!("Exec:  Write core register {index} 0x{value:08X}");
        self.write_dcrdr(Dcrdr::new(value))?;
        self.write_dcrsr(Dcrsr::write(index))?;
        self.wait_register_ready()
    }

    fn wait_register_ready(&mut self) -> Result<(), SwdError> {
        let clock = self.swd.clock().clone();
        REGRDY_POLICY.poll(&clock, "core register", || {
            let dhcsr = self.read_dhcsr()?;
            Ok(dhcsr.s_regrdy().then_some(()))
        })
    }
}

fn check_index(index: u8) -> Result<(), SwdError> {
    if u32::from(index) > Dcrsr::REGSEL_MASK {
        info!("Error: Core register index {index} out of range");
        return Err(SwdError::Api(alloc::format!(
            "core register index {index} out of range"
        )));
    }
    Ok(())
}
