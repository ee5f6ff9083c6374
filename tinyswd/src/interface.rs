// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Interface
//!
//! This module implements the SWD link session.  [`SwdInterface`] owns a
//! [`Transport`] and turns DP, AP and memory mapped register operations into
//! transactions on it.  It:
//!
//! * retries WAIT acknowledges until the target answers something else,
//! * checks the parity of everything it reads,
//! * caches DP SELECT, and only writes it when the AP or bank changes,
//! * reads AP registers through RDBUFF, as AP reads are posted,
//! * brings the link up, via [`SwdInterface::initialize()`].
//!
//! Every transaction attempt, including each WAIT retry, is reported to the
//! session's [`TransactionHook`].

use alloc::boxed::Box;
use alloc::vec::Vec;
use embassy_time::Duration;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

use tinyswd_core::arm::Cortex;
use tinyswd_core::arm::ap::{Base, BaseRegister, Idr, IdrRegister};
use tinyswd_core::arm::dp::{
    Abort, AbortRegister, CtrlStat, CtrlStatRegister, IdCode, IdCodeRegister, RdBuffRegister,
    Select, SelectRegister,
};
use tinyswd_core::arm::map::{Csw, CswRegister, Drw, DrwRegister, Tar, TarRegister};
use tinyswd_core::arm::register::{
    ApRegister, DpRegister, MemoryRegister, ReadableRegister, RegisterDescriptor,
    WritableRegister,
};

use crate::SwdError;
use crate::clock::{Clock, RetryPolicy, SystemClock};
use crate::hook::{NopHook, TransactionHook};
use crate::protocol::{Ack, Direction, PortType, Transaction, Transport};

/// Link session timing
///
/// The defaults suit a directly connected Cortex-M0+ target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwdConfig {
    /// Sleep between retries of a transaction answered with WAIT.  WAITs
    /// are retried until the target answers something else.
    pub wait_retry_interval_ms: u64,

    /// CTRL/STAT reads made waiting for the power-up acknowledges.
    pub power_up_attempts: u32,
    pub power_up_interval_ms: u64,

    /// Link bring-up attempts made by [`SwdInterface::initialize()`].
    pub init_attempts: u32,
    pub init_interval_ms: u64,
}

impl Default for SwdConfig {
    fn default() -> Self {
        Self {
            wait_retry_interval_ms: 10,
            power_up_attempts: 10,
            power_up_interval_ms: 1,
            init_attempts: 100,
            init_interval_ms: 1,
        }
    }
}

impl SwdConfig {
    pub fn wait_policy(&self) -> RetryPolicy {
        RetryPolicy::unbounded(Duration::from_millis(self.wait_retry_interval_ms))
    }

    pub fn power_up_policy(&self) -> RetryPolicy {
        RetryPolicy::attempts(
            self.power_up_attempts,
            Duration::from_millis(self.power_up_interval_ms),
        )
    }

    pub fn init_policy(&self) -> RetryPolicy {
        RetryPolicy::attempts(
            self.init_attempts,
            Duration::from_millis(self.init_interval_ms),
        )
    }
}

/// Word access to target memory
///
/// What the target controllers, and any clock setup hooks, need from a link
/// session.  Implemented by [`SwdInterface`].
pub trait RegisterAccess {
    /// Reads the 32-bit word at `address`.
    fn read_register(&mut self, address: u32) -> Result<u32, SwdError>;

    /// Writes the 32-bit word at `address`.
    fn write_register(&mut self, address: u32, data: u32) -> Result<(), SwdError>;

    /// Replaces the bits selected by `mask` with those from `data`, leaving
    /// the rest of the word as read.
    fn update_register_bits(&mut self, address: u32, mask: u32, data: u32) -> Result<(), SwdError> {
        let value = self.read_register(address)?;
        self.write_register(address, (value & !mask) | (data & mask))
    }
}

/// The SWD link session
///
/// Generic over the [`Transport`] that puts transactions on the wire, and
/// the [`Clock`] used for retry intervals.
///
/// Call [`SwdInterface::initialize()`] before anything else, and again after
/// any error where [`SwdError::requires_reset()`] is true, or after a target
/// reset.
pub struct SwdInterface<T: Transport, C: Clock = SystemClock> {
    transport: T,
    clock: C,
    hook: Box<dyn TransactionHook>,
    config: SwdConfig,

    // Last value written to DP SELECT.  None when unknown.
    dp_select: Option<Select>,

    // AP index used for memory access
    mem_ap: u8,

    idcode: Option<IdCode>,
}

impl<T: Transport> SwdInterface<T, SystemClock> {
    /// Creates a session using the embassy-time clock.
    pub fn new(transport: T) -> Self {
        Self::with_clock(transport, SystemClock)
    }
}

impl<T: Transport, C: Clock> SwdInterface<T, C> {
    pub fn with_clock(transport: T, clock: C) -> Self {
        Self {
            transport,
            clock,
            hook: Box::new(NopHook),
            config: SwdConfig::default(),
            dp_select: None,
            mem_ap: 0,
            idcode: None,
        }
    }

    pub fn with_config(mut self, config: SwdConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_hook(mut self, hook: impl TransactionHook + 'static) -> Self {
        self.set_hook(hook);
        self
    }

    /// Replaces the transaction hook.
    pub fn set_hook(&mut self, hook: impl TransactionHook + 'static) {
        self.hook = Box::new(hook);
    }

    pub fn config(&self) -> &SwdConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SwdConfig) {
        self.config = config;
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The IDCODE read by the last successful [`SwdInterface::initialize()`].
    pub fn idcode(&self) -> Option<IdCode> {
        self.idcode
    }

    /// Selects the AP used for memory access.  Defaults to 0.
    pub fn set_mem_ap(&mut self, apsel: u8) {
        self.mem_ap = apsel;
    }

    pub fn mem_ap(&self) -> u8 {
        self.mem_ap
    }

    /// Closes the transport and hands it back.
    pub fn close(mut self) -> T {
        trace!("Exec:  Close SWD");
        self.transport.close();
        self.transport
    }
}

// Link bring-up
impl<T: Transport, C: Clock> SwdInterface<T, C> {
    /// Brings the link up and powers up the debug and system domains.
    ///
    /// Each attempt performs two line resets, reads IDCODE, requests power
    /// up, and then writes ABORT to clear any sticky errors, whether or not
    /// the power up succeeded.  Attempts are repeated, with a short sleep,
    /// until power up succeeds or [`SwdConfig::init_attempts`] is reached.
    ///
    /// Returns:
    /// - `Ok(IdCode)`: the target's IDCODE.
    /// - `Err(SwdError::Timeout)`: power up never succeeded.
    /// - `Err(SwdError)`: a line reset or the IDCODE read failed.  A failed
    ///   ABORT write is logged, and does not end the attempt.
    pub fn initialize(&mut self) -> Result<IdCode, SwdError> {
        trace!("Exec:  Initialize SWD");
        self.idcode = None;

        let clock = self.clock.clone();
        let policy = self.config.init_policy();
        let idcode = policy.poll(&clock, "initialize", || {
            self.line_reset()?;
            self.line_reset()?;

            let idcode = self.read_idcode()?;
            let powered = self.power_on_reset();
            if let Err(e) = self.abort(Abort::ALL) {
                warn!("Abort failed during initialize: {e}");
            }

            match powered {
                Ok(()) => Ok(Some(idcode)),
                Err(e) => {
                    trace!("Retry: Initialize SWD, power up failed: {e}");
                    Ok(None)
                }
            }
        })?;

        match Cortex::from_idcode(idcode) {
            Some(cortex) => debug!("Value: IDCODE {idcode} {}", cortex.as_str()),
            None => debug!("Value: IDCODE {idcode} (unknown core)"),
        }
        self.idcode = Some(idcode);
        Ok(idcode)
    }

    /// Requests debug and system power up, and waits for both acknowledges.
    ///
    /// If the request itself fails, CTRL/STAT is read once more to get the
    /// link back in step, and the first error returned.
    pub fn power_on_reset(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Power up debug domain");
        if let Err(e) = self.write_ctrl_stat(CtrlStat::power_up_request()) {
            let _ = self.read_ctrl_stat();
            return Err(e);
        }

        let clock = self.clock.clone();
        let policy = self.config.power_up_policy();
        policy.poll(&clock, "power-on reset", || {
            let stat = self.read_ctrl_stat()?;
            Ok(stat.powered_up().then_some(()))
        })?;

        debug!("OK:    Debug domain powered up");
        Ok(())
    }

    /// Performs a line reset.  DP SELECT is no longer known afterwards.
    pub fn line_reset(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Reset SWD");
        self.invalidate_select();
        self.transport.line_reset()
    }

    /// Forgets the cached DP SELECT, so the next AP access writes it.
    /// Needed whenever the target may have reset its debug port.
    pub fn invalidate_select(&mut self) {
        self.dp_select = None;
    }

    /// Writes ABORT, clearing the sticky error flags given.
    pub fn abort(&mut self, flags: Abort) -> Result<(), SwdError> {
        trace!("Exec:  Write ABORT {flags}");
        self.write_dp_register(AbortRegister, flags)
    }

    pub fn read_idcode(&mut self) -> Result<IdCode, SwdError> {
        self.read_dp_register(IdCodeRegister)
    }

    pub fn read_ctrl_stat(&mut self) -> Result<CtrlStat, SwdError> {
        self.read_dp_register(CtrlStatRegister)
    }

    pub fn write_ctrl_stat(&mut self, value: CtrlStat) -> Result<(), SwdError> {
        self.write_dp_register(CtrlStatRegister, value)
    }

    /// Reads RDBUFF, which holds the result of the last AP read.
    pub fn read_rdbuff(&mut self) -> Result<u32, SwdError> {
        self.read_dp(RdBuffRegister::NAME, RdBuffRegister::ADDRESS)
    }

    /// Writes DP SELECT, unless it already holds this AP and bank.
    pub fn select(&mut self, apsel: u8, bank: u8) -> Result<(), SwdError> {
        let select = Select::new(apsel, bank);
        if self.dp_select == Some(select) {
            trace!("Value: DP SELECT unchanged {select}");
            return Ok(());
        }

        trace!("Exec:  Update DP SELECT {select}");
        self.write_dp_register(SelectRegister, select)
    }
}

// Typed DP and AP register access
impl<T: Transport, C: Clock> SwdInterface<T, C> {
    /// Reads a Debug Port register.
    ///
    /// ```rust,ignore
    /// use tinyswd_core::arm::dp::CtrlStatRegister;
    /// let stat = swd_if.read_dp_register(CtrlStatRegister)?;
    /// ```
    pub fn read_dp_register<R>(&mut self, _reg: R) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + DpRegister,
        R::Value: From<u32>,
    {
        let data = self.read_dp(R::NAME, R::ADDRESS)?;
        Ok(R::from_raw(data))
    }

    /// Writes a Debug Port register.
    pub fn write_dp_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), SwdError>
    where
        R: WritableRegister + DpRegister,
        R::Value: Into<u32>,
    {
        self.write_dp(R::NAME, R::ADDRESS, R::to_raw(value))
    }

    /// Reads a register of the memory AP, selecting its bank first.
    pub fn read_ap_register<R>(&mut self, _reg: R) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + ApRegister,
        R::Value: From<u32>,
    {
        let data = self.read_ap_banked(R::NAME, R::bank(), R::ADDRESS)?;
        Ok(R::from_raw(data))
    }

    /// Writes a register of the memory AP, selecting its bank first.
    pub fn write_ap_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), SwdError>
    where
        R: WritableRegister + ApRegister,
        R::Value: Into<u32>,
    {
        self.write_ap_banked(R::NAME, R::bank(), R::ADDRESS, R::to_raw(value))
    }

    /// Raw DP read.
    pub fn read_dp(&mut self, name: &str, address: u8) -> Result<u32, SwdError> {
        let tx = self.transmit(name, PortType::DebugPort, Direction::Read, address, 0)?;
        Ok(tx.data)
    }

    /// Raw DP write.  Writing SELECT this way keeps the cache in step.
    pub fn write_dp(&mut self, name: &str, address: u8, data: u32) -> Result<(), SwdError> {
        self.transmit(name, PortType::DebugPort, Direction::Write, address, data)?;
        if address == SelectRegister::ADDRESS {
            self.dp_select = Some(Select::from(data));
        }
        Ok(())
    }

    /// Raw AP read.  Selects the memory AP and `address`'s bank, issues the
    /// AP read, then collects the result from RDBUFF.
    pub fn read_ap(&mut self, name: &str, address: u8) -> Result<u32, SwdError> {
        self.read_ap_banked(name, address >> 4, address)
    }

    /// Raw AP write, selecting the memory AP and `address`'s bank first.
    pub fn write_ap(&mut self, name: &str, address: u8, data: u32) -> Result<(), SwdError> {
        self.write_ap_banked(name, address >> 4, address, data)
    }

    fn read_ap_banked(&mut self, name: &str, bank: u8, address: u8) -> Result<u32, SwdError> {
        self.select(self.mem_ap, bank)?;
        self.transmit(name, PortType::AccessPort, Direction::Read, address, 0)?;
        self.read_rdbuff()
    }

    fn write_ap_banked(&mut self, name: &str, bank: u8, address: u8, data: u32) -> Result<(), SwdError> {
        self.select(self.mem_ap, bank)?;
        self.transmit(name, PortType::AccessPort, Direction::Write, address, data)?;
        Ok(())
    }
}

// MEM-AP
impl<T: Transport, C: Clock> SwdInterface<T, C> {
    pub fn read_idr(&mut self) -> Result<Idr, SwdError> {
        self.read_ap_register(IdrRegister)
    }

    pub fn read_base(&mut self) -> Result<Base, SwdError> {
        self.read_ap_register(BaseRegister)
    }

    pub fn read_csw(&mut self) -> Result<Csw, SwdError> {
        self.read_ap_register(CswRegister)
    }

    pub fn write_csw(&mut self, csw: Csw) -> Result<(), SwdError> {
        self.write_ap_register(CswRegister, csw)
    }

    /// Read-modify-write of CSW: the fields in `mask` are taken from
    /// `value`, the rest kept as read.
    pub fn update_csw(&mut self, value: Csw, mask: Csw) -> Result<(), SwdError> {
        let csw = self.read_csw()?;
        let csw = csw.merge(value, mask);
        trace!("Exec:  Update CSW {csw}");
        self.write_csw(csw)
    }

    pub fn write_tar(&mut self, address: u32) -> Result<(), SwdError> {
        self.write_ap_register(TarRegister, Tar::new(address))
    }

    pub fn write_drw(&mut self, data: u32) -> Result<(), SwdError> {
        self.write_ap_register(DrwRegister, Drw::new(data))
    }

    pub fn read_drw(&mut self) -> Result<u32, SwdError> {
        let drw = self.read_ap_register(DrwRegister)?;
        Ok(drw.data())
    }

    /// Reads the word at `address`.
    ///
    /// Writes TAR, reads DRW (via RDBUFF), then reads CTRL/STAT.  Sticky
    /// errors in CTRL/STAT are logged but do not fail the read.
    pub fn read_register(&mut self, address: u32) -> Result<u32, SwdError> {
        self.write_tar(address)?;
        let data = self.read_drw()?;
        self.check_status()?;

        trace!("Value: 0x{address:08X} = 0x{data:08X}");
        Ok(data)
    }

    /// Writes the word at `address`.
    ///
    /// Writes TAR and DRW, then reads RDBUFF and CTRL/STAT so the write has
    /// completed before returning.
    pub fn write_register(&mut self, address: u32, data: u32) -> Result<(), SwdError> {
        trace!("Exec:  Write 0x{address:08X} = 0x{data:08X}");
        self.write_tar(address)?;
        self.write_drw(data)?;
        self.read_rdbuff()?;
        self.check_status()
    }

    /// Read-modify-write of the word at `address`.
    pub fn update_register_bits(&mut self, address: u32, mask: u32, data: u32) -> Result<(), SwdError> {
        let value = self.read_register(address)?;
        self.write_register(address, (value & !mask) | (data & mask))
    }

    /// Reads a memory mapped register.
    ///
    /// ```rust,ignore
    /// use tinyswd_core::arm::scs::DhcsrRegister;
    /// let dhcsr = swd_if.read_mem_register(DhcsrRegister)?;
    /// if dhcsr.s_halt() { ... }
    /// ```
    pub fn read_mem_register<R: MemoryRegister>(&mut self, _reg: R) -> Result<R::Value, SwdError> {
        trace!("Exec:  Read {}", R::NAME);
        let data = self.read_register(R::ADDRESS)?;
        Ok(R::Value::from(data))
    }

    /// Writes a memory mapped register.
    pub fn write_mem_register<R: MemoryRegister>(
        &mut self,
        _reg: R,
        value: R::Value,
    ) -> Result<(), SwdError> {
        trace!("Exec:  Write {}", R::NAME);
        self.write_register(R::ADDRESS, value.into())
    }

    fn check_status(&mut self) -> Result<(), SwdError> {
        let status = self.read_ctrl_stat()?;
        if status.has_errors() {
            let states: Vec<&str> = status.error_states().collect();
            warn!("DP status errors detected: {}", states.join(", "));
        }
        Ok(())
    }
}

impl<T: Transport, C: Clock> RegisterAccess for SwdInterface<T, C> {
    fn read_register(&mut self, address: u32) -> Result<u32, SwdError> {
        SwdInterface::read_register(self, address)
    }

    fn write_register(&mut self, address: u32, data: u32) -> Result<(), SwdError> {
        SwdInterface::write_register(self, address, data)
    }

    fn update_register_bits(&mut self, address: u32, mask: u32, data: u32) -> Result<(), SwdError> {
        SwdInterface::update_register_bits(self, address, mask, data)
    }
}

// Internal functions
impl<T: Transport, C: Clock> SwdInterface<T, C> {
    /// Performs one transaction, retrying while the target answers WAIT.
    fn transmit(
        &mut self,
        name: &str,
        port: PortType,
        direction: Direction,
        address: u8,
        data: u32,
    ) -> Result<Transaction, SwdError> {
        let request = Transaction::new(port, direction, address, data);
        trace!("Exec:  {name} {request}");

        let clock = self.clock.clone();
        let policy = self.config.wait_policy();
        let result = policy.poll(&clock, "transaction", || {
            let (response, result) = match self.transport.transmit(request) {
                Ok(response) => (response, check_response(&response)),
                Err(e) => (request, Err(e)),
            };
            self.hook.notify(name, &response, result.as_ref().err());
            result
        });

        match &result {
            Ok(tx) if tx.is_read() => trace!("OK:    {name} 0x{:08X}", tx.data),
            Ok(_) => trace!("OK:    {name}"),
            Err(e) => debug!("Error: {name} {request}: {e}"),
        }
        result
    }
}

fn check_response(response: &Transaction) -> Result<Option<Transaction>, SwdError> {
    match response.ack {
        Ack::Ok => {
            if response.is_read() && !response.parity_ok() {
                Err(SwdError::BadParity)
            } else {
                Ok(Some(*response))
            }
        }
        Ack::Wait => {
            trace!("Exec:  {response} Wait ACK");
            Ok(None)
        }
        ack => Err(SwdError::BadAck(ack)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::data_parity;
    use alloc::collections::VecDeque;
    use alloc::rc::Rc;
    use alloc::string::{String, ToString};
    use core::cell::RefCell;
    use pretty_assertions::assert_eq;

    // Answers from a script, then OK with `read_value` forever.
    #[derive(Default)]
    struct MockTransport {
        sent: Vec<Transaction>,
        line_resets: usize,
        script: VecDeque<(Ack, u32, bool)>,
        read_value: u32,
        closed: bool,
    }

    impl MockTransport {
        fn reading(read_value: u32) -> Self {
            Self {
                read_value,
                ..Default::default()
            }
        }

        fn then(mut self, ack: Ack, data: u32) -> Self {
            self.script.push_back((ack, data, false));
            self
        }

        fn then_corrupt(mut self, data: u32) -> Self {
            self.script.push_back((Ack::Ok, data, true));
            self
        }

        fn writes_to(&self, port: PortType, address: u8) -> usize {
            self.sent
                .iter()
                .filter(|tx| tx.port == port && !tx.is_read() && tx.address == address)
                .count()
        }

        fn reads_of(&self, port: PortType, address: u8) -> usize {
            self.sent
                .iter()
                .filter(|tx| tx.port == port && tx.is_read() && tx.address == address)
                .count()
        }
    }

    impl Transport for MockTransport {
        fn line_reset(&mut self) -> Result<(), SwdError> {
            self.line_resets += 1;
            Ok(())
        }

        fn transmit(&mut self, mut tx: Transaction) -> Result<Transaction, SwdError> {
            self.sent.push(tx);
            let (ack, data, corrupt) = self
                .script
                .pop_front()
                .unwrap_or((Ack::Ok, self.read_value, false));
            tx.ack = ack;
            if tx.is_read() && ack == Ack::Ok {
                tx.data = data;
                tx.parity = data_parity(data) ^ corrupt;
            }
            Ok(tx)
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[derive(Clone, Default)]
    struct RecordingHook(Rc<RefCell<Vec<(String, Ack, Option<String>)>>>);

    impl TransactionHook for RecordingHook {
        fn notify(&mut self, name: &str, transaction: &Transaction, error: Option<&SwdError>) {
            self.0.borrow_mut().push((
                name.to_string(),
                transaction.ack,
                error.map(|e| e.to_string()),
            ));
        }
    }

    fn session(transport: MockTransport) -> (SwdInterface<MockTransport, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (SwdInterface::with_clock(transport, clock.clone()), clock)
    }

    #[test]
    fn select_written_only_on_change() {
        let (mut swd, _) = session(MockTransport::reading(0x2300_0052));

        swd.read_csw().unwrap();
        swd.read_csw().unwrap();
        swd.write_tar(0x2000_0000).unwrap();
        assert_eq!(swd.transport().writes_to(PortType::DebugPort, 0x08), 1);

        // IDR lives in bank 0xF
        swd.read_idr().unwrap();
        swd.read_csw().unwrap();
        assert_eq!(swd.transport().writes_to(PortType::DebugPort, 0x08), 3);
    }

    #[test]
    fn line_reset_invalidates_select() {
        let (mut swd, _) = session(MockTransport::reading(0));

        swd.read_csw().unwrap();
        swd.line_reset().unwrap();
        swd.read_csw().unwrap();

        assert_eq!(swd.transport().writes_to(PortType::DebugPort, 0x08), 2);
        assert_eq!(swd.transport().line_resets, 1);
    }

    #[test]
    fn ap_reads_collect_rdbuff() {
        let (mut swd, _) = session(MockTransport::reading(0x0477_0031));

        let idr = swd.read_idr().unwrap();
        assert_eq!(idr.data(), 0x0477_0031);

        let sent = &swd.transport().sent;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], Transaction::write(PortType::DebugPort, 0x08, 0x0000_00F0));
        assert_eq!(sent[1], Transaction::read(PortType::AccessPort, 0x0C));
        assert_eq!(sent[2], Transaction::read(PortType::DebugPort, 0x0C));
    }

    #[test]
    fn wait_is_retried_and_each_attempt_reported() {
        let transport = MockTransport::reading(0)
            .then(Ack::Wait, 0)
            .then(Ack::Wait, 0)
            .then(Ack::Ok, 0x0BC1_1477);
        let hook = RecordingHook::default();
        let (swd, clock) = session(transport);
        let mut swd = swd.with_hook(hook.clone());

        let idcode = swd.read_idcode().unwrap();

        assert_eq!(idcode.data(), 0x0BC1_1477);
        assert_eq!(clock.elapsed(), Duration::from_millis(20));
        let seen = hook.0.borrow();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(name, _, error)| name == "IDCODE" && error.is_none()));
        assert_eq!(seen[0].1, Ack::Wait);
        assert_eq!(seen[2].1, Ack::Ok);
    }

    #[test]
    fn fault_and_invalid_acks_fail() {
        let transport = MockTransport::reading(0)
            .then(Ack::Fault, 0)
            .then(Ack::Invalid(0b111), 0);
        let hook = RecordingHook::default();
        let (swd, _) = session(transport);
        let mut swd = swd.with_hook(hook.clone());

        assert_eq!(swd.read_ctrl_stat(), Err(SwdError::BadAck(Ack::Fault)));
        assert_eq!(
            swd.write_ctrl_stat(CtrlStat::power_up_request()),
            Err(SwdError::BadAck(Ack::Invalid(7)))
        );
        assert_eq!(swd.transport().sent.len(), 2);
        assert!(hook.0.borrow().iter().all(|(_, _, error)| error.is_some()));
    }

    #[test]
    fn read_parity_mismatch_fails() {
        let transport = MockTransport::reading(0).then_corrupt(0x1234_5678);
        let (mut swd, _) = session(transport);

        let result = swd.read_idcode();
        assert_eq!(result, Err(SwdError::BadParity));
        assert!(result.unwrap_err().requires_reset());
    }

    #[test]
    fn write_select_directly_updates_cache() {
        let (mut swd, _) = session(MockTransport::reading(0));

        swd.write_dp_register(SelectRegister, Select::new(0, 0)).unwrap();
        swd.read_csw().unwrap();

        assert_eq!(swd.transport().writes_to(PortType::DebugPort, 0x08), 1);
    }

    #[test]
    fn power_on_reset_times_out() {
        let (mut swd, clock) = session(MockTransport::reading(0));

        assert_eq!(swd.power_on_reset(), Err(SwdError::Timeout("power-on reset")));
        assert_eq!(swd.transport().writes_to(PortType::DebugPort, 0x04), 1);
        assert_eq!(swd.transport().reads_of(PortType::DebugPort, 0x04), 10);
        assert_eq!(clock.elapsed(), Duration::from_millis(9));
    }

    #[test]
    fn power_on_reset_write_failure_reads_ctrl_stat() {
        let transport = MockTransport::reading(0).then(Ack::Fault, 0);
        let (mut swd, _) = session(transport);

        assert_eq!(swd.power_on_reset(), Err(SwdError::BadAck(Ack::Fault)));
        assert_eq!(swd.transport().reads_of(PortType::DebugPort, 0x04), 1);
    }

    #[test]
    fn initialize_returns_idcode() {
        let (mut swd, _) = session(MockTransport::reading(0xF000_0000));

        let idcode = swd.initialize().unwrap();

        assert_eq!(idcode.data(), 0xF000_0000);
        assert_eq!(swd.idcode(), Some(idcode));
        assert_eq!(swd.transport().line_resets, 2);
        let last = swd.transport().sent.last().copied().unwrap();
        assert_eq!(last, Transaction::write(PortType::DebugPort, 0x00, 0x1E));
    }

    #[test]
    fn initialize_aborts_on_every_attempt() {
        let (mut swd, clock) = session(MockTransport::reading(0));

        assert_eq!(swd.initialize(), Err(SwdError::Timeout("initialize")));

        assert_eq!(swd.idcode(), None);
        assert_eq!(swd.transport().line_resets, 200);
        assert_eq!(swd.transport().writes_to(PortType::DebugPort, 0x00), 100);
        // 9ms waiting for power up per attempt, plus 1ms between attempts
        assert_eq!(clock.elapsed(), Duration::from_millis(100 * 9 + 99));
    }

    #[test]
    fn initialize_stops_on_idcode_error() {
        let transport = MockTransport::reading(0).then(Ack::Invalid(7), 0);
        let (mut swd, _) = session(transport);

        assert_eq!(swd.initialize(), Err(SwdError::BadAck(Ack::Invalid(7))));
        assert_eq!(swd.transport().line_resets, 2);
    }

    #[test]
    fn initialize_survives_failed_abort() {
        let transport = MockTransport::reading(0)
            .then(Ack::Ok, 0xF000_0000)
            .then(Ack::Ok, 0)
            .then(Ack::Ok, 0xF000_0000)
            .then(Ack::Fault, 0);
        let (mut swd, _) = session(transport);

        let idcode = swd.initialize().unwrap();

        assert_eq!(idcode.data(), 0xF000_0000);
        assert_eq!(swd.idcode(), Some(idcode));
        assert_eq!(swd.transport().line_resets, 2);
        assert_eq!(swd.transport().writes_to(PortType::DebugPort, 0x00), 1);
    }

    #[test]
    fn register_write_sequence() {
        let (mut swd, _) = session(MockTransport::reading(0));

        swd.write_register(0xE000_EDF0, 0xA05F_0001).unwrap();

        let sent = &swd.transport().sent;
        assert_eq!(sent.len(), 5);
        assert_eq!(sent[1], Transaction::write(PortType::AccessPort, 0x04, 0xE000_EDF0));
        assert_eq!(sent[2], Transaction::write(PortType::AccessPort, 0x0C, 0xA05F_0001));
        assert_eq!(sent[3], Transaction::read(PortType::DebugPort, 0x0C));
        assert_eq!(sent[4], Transaction::read(PortType::DebugPort, 0x04));
    }

    #[test]
    fn update_register_bits_keeps_unmasked_bits() {
        let (mut swd, _) = session(MockTransport::reading(0x0000_0600));

        swd.update_register_bits(0x4002_2000, 0x7, 0x2).unwrap();

        let drw_write = swd
            .transport()
            .sent
            .iter()
            .find(|tx| tx.port == PortType::AccessPort && !tx.is_read() && tx.address == 0x0C)
            .copied()
            .unwrap();
        assert_eq!(drw_write.data, 0x0000_0602);
    }

    #[test]
    fn close_returns_closed_transport() {
        let (swd, _) = session(MockTransport::reading(0));
        let transport = swd.close();
        assert!(transport.closed);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: SwdConfig =
            serde_json::from_str(r#"{"init_attempts": 5, "wait_retry_interval_ms": 2}"#).unwrap();

        assert_eq!(config.wait_policy().interval(), Duration::from_millis(2));
        assert_eq!(
            config.init_policy(),
            RetryPolicy::attempts(5, Duration::from_millis(1))
        );
        assert_eq!(config.power_up_attempts, 10);
        assert_eq!(config.power_up_interval_ms, 1);
    }

    #[test]
    fn empty_config_is_default() {
        let config: SwdConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SwdConfig::default());

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["init_attempts"], 100);
        assert_eq!(json["wait_retry_interval_ms"], 10);
    }
}
