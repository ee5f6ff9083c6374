// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32G0 flash programming against the simulated target.

use embassy_time::Duration;
use pretty_assertions::assert_eq;
use test_case::test_case;

use tinyswd::clock::ManualClock;
use tinyswd::flash::{Flash, FlashState, Stm32G0PllSetup};
use tinyswd::sim::SimTarget;
use tinyswd::{DebugInterface, FlashFault, SwdError, SwdInterface};
use tinyswd_core::stm::FlashSr;

fn connect(sim: SimTarget) -> (SwdInterface<SimTarget, ManualClock>, ManualClock) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = ManualClock::new();
    let mut swd = SwdInterface::with_clock(sim, clock.clone());
    swd.initialize().unwrap();
    (swd, clock)
}

fn image(len: usize) -> Vec<u8> {
    (0..len).map(|ii| (ii * 7 + 3) as u8).collect()
}

fn expected_word(image: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    for (ii, byte) in bytes.iter_mut().enumerate() {
        *byte = image.get(offset + ii).copied().unwrap_or(0);
    }
    u32::from_le_bytes(bytes)
}

#[test_case(0; "empty")]
#[test_case(1; "one byte")]
#[test_case(4; "one word")]
#[test_case(5; "word and a byte")]
#[test_case(8; "one double word")]
#[test_case(13; "ragged")]
#[test_case(256; "page")]
#[test_case(2047; "odd tail")]
#[test_case(2048; "two kilobytes")]
fn write_then_read_back(len: usize) {
    let (mut swd, _) = connect(SimTarget::new());
    let mut state = FlashState::new();
    let mut flash = Flash::new(&mut swd, &mut state);
    let image = image(len);

    flash.initialize().unwrap();
    flash.erase_all(Duration::from_secs(1)).unwrap();
    let written = flash.write(0, &image[..]).unwrap();
    assert_eq!(written, len);

    let size = len.div_ceil(4) * 4;
    let mut readback = Vec::new();
    flash.read(0, size as u32, &mut readback).unwrap();
    assert_eq!(readback.len(), size);
    assert_eq!(&readback[..len], &image[..]);
    assert!(readback[len..].iter().all(|byte| *byte == 0));

    let sim = swd.transport();
    // Programming happens a double word at a time, padded with zeros
    let programmed = len.div_ceil(8) * 8;
    for offset in (0..programmed).step_by(4) {
        assert_eq!(sim.flash_word(offset as u32), expected_word(&image, offset));
    }
    assert_eq!(sim.flash_word(programmed as u32), 0xFFFF_FFFF);
}

#[test]
fn write_at_offset() {
    let (mut swd, _) = connect(SimTarget::new());
    let mut state = FlashState::new();
    let mut flash = Flash::new(&mut swd, &mut state);

    flash.erase_all(Duration::from_secs(1)).unwrap();
    flash.write(0x800, &[0x11u8, 0x22, 0x33, 0x44][..]).unwrap();

    let sim = swd.transport();
    assert_eq!(sim.flash_word(0x7FC), 0xFFFF_FFFF);
    assert_eq!(sim.flash_word(0x800), 0x4433_2211);
    assert_eq!(sim.flash_word(0x804), 0x0000_0000);
}

#[test]
fn write_clears_empty_flag() {
    let (mut swd, _) = connect(SimTarget::new());
    let mut state = FlashState::new();
    let mut flash = Flash::new(&mut swd, &mut state);

    flash.initialize().unwrap();
    assert_ne!(flash.read_acr().unwrap().data() & tinyswd_core::stm::FlashAcr::EMPTY, 0);

    flash.erase_all(Duration::from_secs(1)).unwrap();
    flash.write(0, &[0u8; 8][..]).unwrap();

    let acr = flash.read_acr().unwrap();
    assert_eq!(acr.data() & tinyswd_core::stm::FlashAcr::EMPTY, 0);
    assert_eq!(acr.latency(), 2);
}

#[test]
fn erase_times_out() {
    let mut sim = SimTarget::new();
    sim.set_erase_busy_reads(u32::MAX);
    let (mut swd, clock) = connect(sim);
    let mut state = FlashState::new();
    let start = clock.elapsed();

    let result = Flash::new(&mut swd, &mut state).erase_all(Duration::from_millis(500));

    assert_eq!(result, Err(SwdError::Timeout("flash erase")));
    let waited = clock.elapsed() - start;
    assert!(waited >= Duration::from_millis(500), "{waited:?}");
    assert!(waited < Duration::from_millis(700), "{waited:?}");
}

#[test]
fn erase_waits_for_busy_controller() {
    let mut sim = SimTarget::new();
    sim.set_erase_busy_reads(20);
    let (mut swd, _) = connect(sim);
    let mut state = FlashState::new();
    let mut flash = Flash::new(&mut swd, &mut state);

    flash.erase_all(Duration::from_secs(10)).unwrap();
    assert!(!flash.read_sr().unwrap().busy());
}

#[test]
fn erase_removes_programmed_data() {
    let (mut swd, _) = connect(SimTarget::new());
    let mut state = FlashState::new();
    let mut flash = Flash::new(&mut swd, &mut state);

    flash.erase_all(Duration::from_secs(1)).unwrap();
    flash.write(0, &[0xA5u8; 16][..]).unwrap();
    flash.erase_all(Duration::from_secs(1)).unwrap();

    assert_eq!(swd.transport().flash_word(0), 0xFFFF_FFFF);
}

#[test]
fn program_error_clears_cr() {
    let (mut swd, _) = connect(SimTarget::new());
    let mut state = FlashState::new();
    Flash::new(&mut swd, &mut state)
        .erase_all(Duration::from_secs(1))
        .unwrap();

    swd.transport_mut().fail_next_program(FlashSr::PROGERR);

    let mut flash = Flash::new(&mut swd, &mut state);
    let result = flash.write(0, &[1u8; 16][..]);
    assert_eq!(result, Err(SwdError::HardwareFault(FlashFault::Programming)));
    assert_eq!(flash.read_cr().unwrap().data(), 0);
    assert_eq!(flash.read_sr().unwrap().data() & FlashSr::ERRORS, 0);
}

#[test_case(FlashSr::WRPERR; "write protected")]
#[test_case(FlashSr::PGSERR; "sequence error")]
#[test_case(FlashSr::SIZERR; "size error")]
#[test_case(FlashSr::MISSERR; "fast programming data miss")]
#[test_case(FlashSr::FASTERR; "fast programming error")]
fn other_status_errors_end_the_write(bits: u32) {
    let (mut swd, _) = connect(SimTarget::new());
    let mut state = FlashState::new();
    {
        let mut flash = Flash::new(&mut swd, &mut state);
        flash.initialize().unwrap();
        flash.erase_all(Duration::from_secs(1)).unwrap();
    }

    swd.transport_mut().fail_next_program(bits);

    let mut flash = Flash::new(&mut swd, &mut state);
    let result = flash.write(0, &[1u8; 8][..]);
    assert_eq!(result, Err(SwdError::HardwareFault(FlashFault::Other(bits))));
    assert_eq!(flash.read_cr().unwrap().data(), 0);
    assert_eq!(flash.read_sr().unwrap().data() & FlashSr::ERRORS, 0);
}

#[test]
fn write_past_address_space_is_rejected() {
    let (mut swd, _) = connect(SimTarget::new());
    let mut state = FlashState::new();
    let mut flash = Flash::new(&mut swd, &mut state);
    flash.erase_all(Duration::from_secs(1)).unwrap();

    let result = flash.write(0xF800_0000, &[1u8; 8][..]);

    assert!(matches!(result, Err(SwdError::Api(_))), "{result:?}");
    assert_eq!(flash.read_cr().unwrap().data(), 0);
}

#[test]
fn writing_unerased_flash_fails() {
    let (mut swd, _) = connect(SimTarget::new());
    let mut state = FlashState::new();
    let mut flash = Flash::new(&mut swd, &mut state);
    flash.erase_all(Duration::from_secs(1)).unwrap();
    flash.write(0, &[1u8; 8][..]).unwrap();

    let result = flash.write(0, &[2u8; 8][..]);

    assert_eq!(result, Err(SwdError::HardwareFault(FlashFault::Programming)));
    assert_eq!(flash.read_cr().unwrap().data(), 0);
    assert_eq!(swd.transport().flash_word(0), 0x0101_0101);
}

#[test]
fn misaligned_offset_is_alignment_error() {
    let (mut swd, _) = connect(SimTarget::new());
    let mut state = FlashState::new();
    let mut flash = Flash::new(&mut swd, &mut state);
    flash.erase_all(Duration::from_secs(1)).unwrap();

    let result = flash.write(4, &[1u8; 8][..]);

    assert_eq!(result, Err(SwdError::HardwareFault(FlashFault::Alignment)));
    assert_eq!(flash.read_cr().unwrap().data(), 0);
}

#[test]
fn slow_programming_is_waited_for() {
    let mut sim = SimTarget::new();
    sim.set_program_busy_reads(5);
    let (mut swd, _) = connect(sim);
    let mut state = FlashState::new();
    let mut flash = Flash::new(&mut swd, &mut state);

    flash.erase_all(Duration::from_secs(1)).unwrap();
    flash.write(0, &image(64)[..]).unwrap();

    assert_eq!(swd.transport().flash_word(60), expected_word(&image(64), 60));
}

#[test]
fn waits_during_programming_are_retried() {
    let (mut swd, _) = connect(SimTarget::new());
    let mut state = FlashState::new();
    {
        let mut flash = Flash::new(&mut swd, &mut state);
        flash.erase_all(Duration::from_secs(1)).unwrap();
    }

    swd.transport_mut().inject_waits(5);
    Flash::new(&mut swd, &mut state)
        .write(0, &[0x5Au8; 8][..])
        .unwrap();

    assert_eq!(swd.transport().flash_word(4), 0x5A5A_5A5A);
}

#[test]
fn keys_written_once_per_session() {
    let (mut swd, _) = connect(SimTarget::new());
    let mut state = FlashState::new();
    let mut flash = Flash::new(&mut swd, &mut state);

    flash.erase_all(Duration::from_secs(1)).unwrap();
    flash.write(0, &[1u8; 8][..]).unwrap();
    flash.write(8, &[2u8; 8][..]).unwrap();

    assert_eq!(swd.transport().keyr_writes(), 2);
}

#[test]
fn program_with_pll_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut debug = DebugInterface::from_swd(SwdInterface::with_clock(
        SimTarget::new(),
        ManualClock::new(),
    ))
    .with_clock_setup(Stm32G0PllSetup);
    let image = image(100);

    debug.initialize().unwrap();
    debug.program(&image, Duration::from_secs(1)).unwrap();

    assert!(debug.flash_state().clocks_ready());
    let sim = debug.swd_if().transport();
    assert_eq!(sim.flash_word(96), expected_word(&image, 96));
    assert_eq!(sim.flash_word(104), 0xFFFF_FFFF);
}
