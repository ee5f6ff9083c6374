// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Cortex-M System Control Block controller
//!
//! Used to request a system reset through AIRCR.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use tinyswd_core::arm::scs::{Aircr, AircrRegister};
use tinyswd_core::arm::register::MemoryRegister;

use crate::SwdError;
use crate::clock::Clock;
use crate::interface::SwdInterface;
use crate::protocol::Transport;

/// System Control Block controller, borrowing a link session
pub struct Scb<'a, T: Transport, C: Clock> {
    swd: &'a mut SwdInterface<T, C>,
}

impl<'a, T: Transport, C: Clock> Scb<'a, T, C> {
    pub fn new(swd: &'a mut SwdInterface<T, C>) -> Self {
        Self { swd }
    }

    pub fn read_aircr(&mut self) -> Result<Aircr, SwdError> {
        self.swd.read_mem_register(AircrRegister)
    }

    pub fn write_aircr(&mut self, value: Aircr) -> Result<(), SwdError> {
        self.swd.write_mem_register(AircrRegister, value)
    }

    /// Requests a system reset.
    ///
    /// Only TAR and DRW are written: the target resets as the DRW write
    /// lands, and nothing more can be read over the link.  The session must
    /// be brought up again with [`SwdInterface::initialize()`] afterwards.
    pub fn reset_system(&mut self) -> Result<(), SwdError> {
        let aircr = Aircr::system_reset_request();
        debug!("Exec:  System reset, {} {aircr}", AircrRegister::NAME);

        self.swd.write_tar(AircrRegister::ADDRESS)?;
        let result = self.swd.write_drw(aircr.data());
        self.swd.invalidate_select();
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::{Ack, Direction, PortType};
    use crate::sim::SimTarget;
    use pretty_assertions::assert_eq;

    fn connect() -> SwdInterface<SimTarget, ManualClock> {
        let mut swd = SwdInterface::with_clock(SimTarget::new(), ManualClock::new());
        swd.initialize().unwrap();
        swd
    }

    #[test]
    fn reset_system_writes_tar_and_drw_only() {
        let mut swd = connect();
        swd.transport_mut().clear_log();

        Scb::new(&mut swd).reset_system().unwrap();

        let sim = swd.transport();
        assert_eq!(sim.system_resets(), 1);
        assert!(sim
            .transactions()
            .iter()
            .all(|tx| tx.direction == Direction::Write));
        assert_eq!(
            sim.memory_writes().last().copied(),
            Some((AircrRegister::ADDRESS, 0x05FA_0004))
        );
    }

    #[test]
    fn link_is_lost_until_initialized() {
        let mut swd = connect();

        Scb::new(&mut swd).reset_system().unwrap();

        assert_eq!(swd.read_idcode(), Err(SwdError::BadAck(Ack::Invalid(7))));
        swd.initialize().unwrap();
        assert_eq!(swd.read_csw().unwrap().data() & 0x7, 0x2);
    }

    #[test]
    fn reset_invalidates_select() {
        let mut swd = connect();
        swd.read_csw().unwrap();

        Scb::new(&mut swd).reset_system().unwrap();
        swd.initialize().unwrap();
        swd.transport_mut().clear_log();
        swd.read_csw().unwrap();

        let selects = swd
            .transport()
            .transactions()
            .iter()
            .filter(|tx| tx.port == PortType::DebugPort && tx.address == 0x08)
            .count();
        assert_eq!(selects, 1);
    }

    #[test]
    fn aircr_reads_back_key_status() {
        let mut swd = connect();
        let aircr = Scb::new(&mut swd).read_aircr().unwrap();
        assert_eq!(aircr.data() & 0xFFFF_0000, Aircr::VECTKEYSTAT);
    }
}
