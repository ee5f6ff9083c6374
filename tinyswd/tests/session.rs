// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Link session behaviour against the simulated target.

use std::cell::RefCell;
use std::rc::Rc;

use embassy_time::Duration;
use pretty_assertions::assert_eq;

use tinyswd::clock::ManualClock;
use tinyswd::hook::{LogHook, TransactionHook};
use tinyswd::protocol::PortType;
use tinyswd::sim::{SIM_IDCODE, SimTarget};
use tinyswd::{Ack, DebugInterface, SwdConfig, SwdInterface, Transaction};
use tinyswd_core::arm::dp::CtrlStat;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Default)]
struct Recorder {
    attempts: Rc<RefCell<Vec<(String, Ack, bool)>>>,
}

impl TransactionHook for Recorder {
    fn notify(&mut self, name: &str, transaction: &Transaction, error: Option<&tinyswd::SwdError>) {
        self.attempts
            .borrow_mut()
            .push((name.to_string(), transaction.ack, error.is_some()));
    }
}

fn session(sim: SimTarget) -> (SwdInterface<SimTarget, ManualClock>, ManualClock) {
    init_logging();
    let clock = ManualClock::new();
    (SwdInterface::with_clock(sim, clock.clone()), clock)
}

#[test]
fn initialize_reads_idcode_and_powers_up() {
    let (mut swd, _) = session(SimTarget::new());

    let idcode = swd.initialize().unwrap();

    assert_eq!(idcode.data(), SIM_IDCODE);
    assert_eq!(swd.idcode(), Some(idcode));
    assert!(swd.read_ctrl_stat().unwrap().powered_up());
    assert_eq!(swd.transport().line_resets(), 2);
}

#[test]
fn initialize_retries_slow_power_up() {
    let mut sim = SimTarget::new();
    sim.set_power_up_delay(15);
    let (mut swd, _) = session(sim);

    swd.initialize().unwrap();

    // The first attempt gives up after 10 polls, the second sees the acks
    assert_eq!(swd.transport().line_resets(), 4);
}

#[test]
fn initialize_gives_up_without_power() {
    let mut sim = SimTarget::new();
    sim.refuse_power_up(true);
    let config = SwdConfig {
        init_attempts: 3,
        ..Default::default()
    };
    let clock = ManualClock::new();
    let mut swd = SwdInterface::with_clock(sim, clock.clone()).with_config(config);

    let result = swd.initialize();

    assert_eq!(result, Err(tinyswd::SwdError::Timeout("initialize")));
    assert_eq!(swd.idcode(), None);
    assert_eq!(swd.transport().line_resets(), 6);
}

#[test]
fn wait_is_retried_and_observed() {
    let recorder = Recorder::default();
    let (swd, clock) = session(SimTarget::new());
    let mut swd = swd.with_hook(recorder.clone());
    swd.initialize().unwrap();
    recorder.attempts.borrow_mut().clear();
    let start = clock.elapsed();

    swd.transport_mut().inject_waits(3);
    let idcode = swd.read_idcode().unwrap();

    assert_eq!(idcode.data(), SIM_IDCODE);
    let acks: Vec<Ack> = recorder.attempts.borrow().iter().map(|a| a.1).collect();
    assert_eq!(acks, vec![Ack::Wait, Ack::Wait, Ack::Wait, Ack::Ok]);
    assert!(recorder.attempts.borrow().iter().all(|a| !a.2));
    assert_eq!(clock.elapsed() - start, Duration::from_millis(30));
}

#[test]
fn fault_needs_abort() {
    let (mut swd, _) = session(SimTarget::new());
    swd.initialize().unwrap();

    swd.transport_mut().inject_faults(1);
    let result = swd.read_csw();

    let error = result.unwrap_err();
    assert_eq!(error, tinyswd::SwdError::BadAck(Ack::Fault));
    assert!(error.requires_reset());

    swd.abort(tinyswd_core::arm::dp::Abort::ALL).unwrap();
    swd.invalidate_select();
    assert!(swd.read_csw().is_ok());
}

#[test]
fn parity_errors_are_reported() {
    let (mut swd, _) = session(SimTarget::new());
    swd.initialize().unwrap();

    swd.transport_mut().corrupt_next_reads(1);

    assert_eq!(swd.read_idcode(), Err(tinyswd::SwdError::BadParity));
    assert!(swd.read_idcode().is_ok());
}

#[test]
fn memory_round_trip() {
    let (mut swd, _) = session(SimTarget::new());
    swd.initialize().unwrap();

    swd.write_register(0x2000_0100, 0xDEAD_BEEF).unwrap();

    assert_eq!(swd.read_register(0x2000_0100).unwrap(), 0xDEAD_BEEF);
    assert_eq!(swd.transport().memory_word(0x2000_0100), 0xDEAD_BEEF);

    swd.update_register_bits(0x2000_0100, 0x0000_FFFF, 0x0000_1234)
        .unwrap();
    assert_eq!(swd.read_register(0x2000_0100).unwrap(), 0xDEAD_1234);
}

#[test]
fn select_written_once_per_bank() {
    let (mut swd, _) = session(SimTarget::new());
    swd.initialize().unwrap();
    swd.transport_mut().clear_log();

    swd.read_csw().unwrap();
    swd.read_csw().unwrap();
    swd.read_idr().unwrap();
    swd.read_csw().unwrap();

    let selects: Vec<u32> = swd
        .transport()
        .transactions()
        .iter()
        .filter(|tx| tx.port == PortType::DebugPort && !tx.is_read() && tx.address == 0x8)
        .map(|tx| tx.data)
        .collect();
    assert_eq!(selects, vec![0x0000_0000, 0x0000_00F0, 0x0000_0000]);
}

#[test]
fn severed_link_reads_as_invalid_ack() {
    let (mut swd, _) = session(SimTarget::new());
    swd.initialize().unwrap();

    swd.transport_mut().sever_link();

    assert_eq!(
        swd.read_idcode(),
        Err(tinyswd::SwdError::BadAck(Ack::Invalid(7)))
    );
    swd.initialize().unwrap();
    let stat: CtrlStat = swd.read_ctrl_stat().unwrap();
    assert!(!stat.has_errors());
}

#[test]
fn log_hook_does_not_change_behaviour() {
    let (swd, _) = session(SimTarget::new());
    let mut swd = swd.with_hook(LogHook::default());

    swd.initialize().unwrap();
    swd.transport_mut().inject_waits(1);
    swd.transport_mut().inject_faults(1);

    assert!(swd.read_idcode().is_err());
    swd.abort(tinyswd_core::arm::dp::Abort::ALL).unwrap();
    assert!(swd.read_idcode().is_ok());
}

#[test]
fn close_hands_back_closed_transport() {
    let (mut swd, _) = session(SimTarget::new());
    swd.initialize().unwrap();

    let sim = swd.close();

    assert!(sim.is_closed());
}

#[test]
fn debug_interface_halt_reset_cycle() {
    init_logging();
    let clock = ManualClock::new();
    let mut debug = DebugInterface::from_swd(SwdInterface::with_clock(SimTarget::new(), clock));

    debug.initialize().unwrap();
    debug.halt().unwrap();
    assert!(debug.swd_if().transport().core_halted());

    debug.core_debug().write_core_register(0, 0x1234_5678).unwrap();
    assert_eq!(debug.swd_if().transport().core_register(0), 0x1234_5678);

    debug.run_after_reset().unwrap();
    debug.reset().unwrap();
    debug.initialize().unwrap();

    assert!(!debug.swd_if().transport().core_halted());
    assert_eq!(debug.swd_if().transport().system_resets(), 1);
}
