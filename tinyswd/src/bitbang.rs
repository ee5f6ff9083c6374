// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Wire Protocol over GPIOs
//!
//! This module implements [`Transport`] by bit-banging two lines, SWCLK and
//! SWDIO, through the [`Pins`] trait.  It knows the bit framing of an SWD
//! transaction, and nothing about what the registers mean: acknowledges and
//! parity are handed back to the link session to interpret.
//!
//! Bits are sent LSB first.  The host changes SWDIO while SWCLK is low and
//! the target samples it on the rising edge.  The host samples SWDIO just
//! before raising SWCLK, as the target moves to the next bit on that edge.

use alloc::format;
use alloc::string::String;
use core::fmt::Debug;
use embassy_time::Duration;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::SwdError;
use crate::clock::{Clock, SystemClock};
use crate::protocol::{Ack, Direction, Transaction, Transport};

// 50+ clock cycles with SWDIO high
const LINE_RESET_SWDIO_HIGH_CYCLES: u32 = 51;

// 2+ clock cycles with SWDIO low
const LINE_RESET_SWDIO_LOW_CYCLES: u32 = 3;

// Minimum 8 clocks after a single operation
const POST_OPERATION_CYCLES: u32 = 8;

/// Default SWCLK frequency, in Hz
pub const DEFAULT_FREQUENCY_HZ: u64 = 1_000_000;

/// The two SWD lines
///
/// SWCLK is always an output.  SWDIO is switched between output, when the
/// host drives it, and input, when the target does.
pub trait Pins {
    type Error: Debug;

    fn set_clock(&mut self, high: bool) -> Result<(), Self::Error>;

    /// Drives SWDIO.  Only meaningful while SWDIO is an output.
    fn set_data(&mut self, high: bool) -> Result<(), Self::Error>;

    /// Samples SWDIO.  Only meaningful while SWDIO is an input.
    fn data(&mut self) -> Result<bool, Self::Error>;

    fn data_input(&mut self) -> Result<(), Self::Error>;

    fn data_output(&mut self) -> Result<(), Self::Error>;

    /// Releases the lines.
    fn close(&mut self);
}

/// Bit-banged SWD transport
///
/// ```rust,ignore
/// use tinyswd::SwdInterface;
/// use tinyswd::bitbang::BitBang;
///
/// let transport = BitBang::new(pins).with_frequency(400_000);
/// let mut swd = SwdInterface::new(transport);
/// let idcode = swd.initialize()?;
/// ```
pub struct BitBang<P: Pins, C: Clock = SystemClock> {
    pins: P,
    clock: C,
    frequency_hz: u64,
    half_period: Duration,
    closed: bool,
}

impl<P: Pins> BitBang<P, SystemClock> {
    /// Creates a new bit-bang transport, clocking at 1MHz.
    pub fn new(pins: P) -> Self {
        Self::with_clock(pins, SystemClock)
    }
}

impl<P: Pins, C: Clock> BitBang<P, C> {
    pub fn with_clock(pins: P, clock: C) -> Self {
        Self {
            pins,
            clock,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            half_period: half_period(DEFAULT_FREQUENCY_HZ),
            closed: false,
        }
    }

    /// Sets the target SWCLK frequency.
    ///
    /// This is a ceiling: the pins and the clock's sleep resolution decide
    /// how fast the lines actually toggle.  A frequency of 0 is treated as
    /// 1Hz.
    pub fn with_frequency(mut self, frequency_hz: u64) -> Self {
        self.set_frequency(frequency_hz);
        self
    }

    pub fn set_frequency(&mut self, frequency_hz: u64) {
        let frequency_hz = frequency_hz.max(1);
        self.frequency_hz = frequency_hz;
        self.half_period = half_period(frequency_hz);
        debug!("SWD frequency set to {frequency_hz}Hz");
    }

    pub fn frequency(&self) -> u64 {
        self.frequency_hz
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }

    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    #[inline]
    fn delay(&self) {
        if self.half_period.as_ticks() > 0 {
            self.clock.sleep(self.half_period);
        }
    }

    fn write_bit(&mut self, bit: bool) -> Result<(), P::Error> {
        self.pins.set_data(bit)?;
        self.pins.set_clock(false)?;
        self.delay();
        self.pins.set_clock(true)?;
        self.delay();
        Ok(())
    }

    fn read_bit(&mut self) -> Result<bool, P::Error> {
        self.pins.set_clock(false)?;
        self.delay();

        let bit = self.pins.data()?;

        self.pins.set_clock(true)?;
        self.delay();
        Ok(bit)
    }

    fn write_bits(&mut self, count: u32, data: u32) -> Result<(), P::Error> {
        let mut data = data;
        for _ in 0..count {
            self.write_bit(data & 1 == 1)?;
            data >>= 1;
        }
        self.pins.set_clock(false)
    }

    fn read_bits(&mut self, count: u32) -> Result<u32, P::Error> {
        let mut data = 0u32;
        for ii in 0..count {
            if self.read_bit()? {
                data |= 1 << ii;
            }
        }
        Ok(data)
    }

    /// Clocks `cycles` times without touching SWDIO, leaving SWCLK low.
    fn clock(&mut self, cycles: u32) -> Result<(), P::Error> {
        for _ in 0..cycles {
            self.pins.set_clock(false)?;
            self.delay();
            self.pins.set_clock(true)?;
            self.delay();
        }
        self.pins.set_clock(false)
    }

    fn turnaround_to_output(&mut self) -> Result<(), P::Error> {
        self.clock(1)?;
        self.pins.data_output()?;
        self.pins.set_data(false)?;
        self.pins.set_clock(false)
    }

    fn do_line_reset(&mut self) -> Result<(), P::Error> {
        self.pins.data_output()?;

        self.pins.set_data(true)?;
        self.clock(LINE_RESET_SWDIO_HIGH_CYCLES)?;

        self.pins.set_data(false)?;
        self.clock(LINE_RESET_SWDIO_LOW_CYCLES)
    }

    fn exchange(&mut self, mut tx: Transaction) -> Result<Transaction, P::Error> {
        self.pins.data_output()?;
        self.write_bits(8, u32::from(tx.request_header()))?;

        // Target takes SWDIO for the acknowledge
        self.pins.data_input()?;
        self.clock(1)?;

        tx.ack = Ack::from_bits(self.read_bits(3)? as u8);

        match (tx.ack, tx.direction) {
            (Ack::Ok, Direction::Write) => {
                self.turnaround_to_output()?;
                self.write_bits(32, tx.data)?;
                self.write_bits(1, u32::from(tx.parity))?;
            }
            (Ack::Ok, Direction::Read) => {
                tx.data = self.read_bits(32)?;
                tx.parity = self.read_bit()?;
                self.turnaround_to_output()?;
            }
            (ack, _) => {
                trace!("ACK error - turnaround: {ack}");
                self.turnaround_to_output()?;
            }
        }

        self.pins.set_data(false)?;
        self.clock(POST_OPERATION_CYCLES)?;
        Ok(tx)
    }

    fn check_open(&self) -> Result<(), SwdError> {
        if self.closed {
            Err(SwdError::Transport(String::from("transport closed")))
        } else {
            Ok(())
        }
    }
}

impl<P: Pins, C: Clock> Transport for BitBang<P, C> {
    fn line_reset(&mut self) -> Result<(), SwdError> {
        self.check_open()?;
        self.do_line_reset().map_err(pin_error)
    }

    fn transmit(&mut self, transaction: Transaction) -> Result<Transaction, SwdError> {
        self.check_open()?;
        self.exchange(transaction).map_err(pin_error)
    }

    fn close(&mut self) {
        if !self.closed {
            debug!("Closing bit-bang transport");
            self.pins.close();
            self.closed = true;
        }
    }
}

fn half_period(frequency_hz: u64) -> Duration {
    Duration::from_hz(frequency_hz.saturating_mul(2))
}

fn pin_error(e: impl Debug) -> SwdError {
    debug!("Error: Pin access failed {e:?}");
    SwdError::Transport(format!("pin error: {e:?}"))
}
