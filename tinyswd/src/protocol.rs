// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Transaction Encoding
//!
//! A [`Transaction`] is one SWD bus exchange: an 8-bit request header, a
//! 3-bit acknowledge and, when the target answers OK, a 32-bit data phase
//! with a parity bit.  This module builds the request header and computes
//! parity, and defines the [`Transport`] trait which puts transactions on a
//! wire.
//!
//! The request header, transmitted LSB first:
//!
//! ```text
//!   bit   0      1      2     3    4     5       6      7
//!       start  APnDP   RnW   A2   A3  parity  stop   park
//!         1                               0      1
//! ```
//!
//! Parity is even parity over APnDP, RnW, A2 and A3.  Data parity is set
//! when the data word has an odd number of ones.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::SwdError;

const HEADER_START: u8 = 1 << 0;
const HEADER_APNDP: u8 = 1 << 1;
const HEADER_RNW: u8 = 1 << 2;
const HEADER_ADDR_SHIFT: u8 = 1;
const HEADER_ADDR_MASK: u8 = 0x0C << HEADER_ADDR_SHIFT;
const HEADER_PARITY_BIT: u8 = 5;
const HEADER_PARK: u8 = 1 << 7;

/// Which port a transaction addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    DebugPort,
    AccessPort,
}

/// Transfer direction, from the host's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Write,
    Read,
}

/// Target acknowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ack {
    /// 0b001
    Ok,
    /// 0b010 - target busy, retry the same request
    Wait,
    /// 0b100 - sticky error set, transaction refused
    Fault,
    /// Any other bit pattern, most often 0b111 from an undriven line
    Invalid(u8),
}

impl Ack {
    /// Decodes the 3 acknowledge bits, as received LSB first.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b001 => Ack::Ok,
            0b010 => Ack::Wait,
            0b100 => Ack::Fault,
            other => Ack::Invalid(other),
        }
    }

    pub const fn bits(&self) -> u8 {
        match self {
            Ack::Ok => 0b001,
            Ack::Wait => 0b010,
            Ack::Fault => 0b100,
            Ack::Invalid(bits) => *bits,
        }
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ack::Ok => write!(f, "OK"),
            Ack::Wait => write!(f, "WAIT"),
            Ack::Fault => write!(f, "FAULT"),
            Ack::Invalid(bits) => write!(f, "invalid ({bits:#05b})"),
        }
    }
}

/// One SWD bus exchange
///
/// Built by the link session, completed by a [`Transport`], which fills in
/// `ack` and, for reads, `data` and `parity` as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub port: PortType,
    pub direction: Direction,
    /// Register offset.  Only bits 3:2 are sent on the wire.
    pub address: u8,
    pub data: u32,
    /// Data parity bit: computed for writes, as received for reads.
    pub parity: bool,
    /// `Invalid(0)` until a transport has completed the transaction.
    pub ack: Ack,
}

impl Transaction {
    pub const fn new(port: PortType, direction: Direction, address: u8, data: u32) -> Self {
        let data = match direction {
            Direction::Write => data,
            Direction::Read => 0,
        };
        Transaction {
            port,
            direction,
            address: address & 0x0C,
            data,
            parity: data_parity(data),
            ack: Ack::Invalid(0),
        }
    }

    pub const fn read(port: PortType, address: u8) -> Self {
        Self::new(port, Direction::Read, address, 0)
    }

    pub const fn write(port: PortType, address: u8, data: u32) -> Self {
        Self::new(port, Direction::Write, address, data)
    }

    pub const fn is_read(&self) -> bool {
        matches!(self.direction, Direction::Read)
    }

    pub const fn request_header(&self) -> u8 {
        request_header(self.port, self.direction, self.address)
    }

    /// Whether the parity bit matches the data.
    pub const fn parity_ok(&self) -> bool {
        self.parity == data_parity(self.data)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let port = match self.port {
            PortType::DebugPort => "DP",
            PortType::AccessPort => "AP",
        };
        match self.direction {
            Direction::Read => write!(f, "{port} Read 0x{:02X}", self.address),
            Direction::Write => write!(
                f,
                "{port} Write 0x{:02X} 0x{:08X}",
                self.address, self.data
            ),
        }
    }
}

/// Builds the 8-bit SWD request header.
///
/// Only bits 3:2 of `address` are used.
pub const fn request_header(port: PortType, direction: Direction, address: u8) -> u8 {
    let mut header = HEADER_START | HEADER_PARK;
    if matches!(port, PortType::AccessPort) {
        header |= HEADER_APNDP;
    }
    if matches!(direction, Direction::Read) {
        header |= HEADER_RNW;
    }
    header |= (address << HEADER_ADDR_SHIFT) & HEADER_ADDR_MASK;

    let parity = (header & (HEADER_APNDP | HEADER_RNW | HEADER_ADDR_MASK)).count_ones() & 1;
    header | ((parity as u8) << HEADER_PARITY_BIT)
}

/// SWD data parity: true when `word` has an odd number of bits set.
pub const fn data_parity(word: u32) -> bool {
    word.count_ones() % 2 == 1
}

/// A physical SWD transport
///
/// Anything that can clock a [`Transaction`] onto a wire and report what came
/// back: a bit-banged pair of GPIOs ([`crate::bitbang::BitBang`]), an external
/// probe, or a simulated target ([`crate::sim::SimTarget`]).
///
/// A transport does not interpret acknowledges or check parity.  It returns
/// the transaction with `ack` set and, for reads, `data` and `parity` as
/// received, and the link session decides what they mean.  An `Err` is
/// reserved for failures of the transport itself.
pub trait Transport {
    /// At least 50 clocks with SWDIO high, then at least 2 idle clocks.
    fn line_reset(&mut self) -> Result<(), SwdError>;

    /// Performs one transaction.
    fn transmit(&mut self, transaction: Transaction) -> Result<Transaction, SwdError>;

    /// Releases the underlying resources.  The transport is not used again.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn line_reset(&mut self) -> Result<(), SwdError> {
        (**self).line_reset()
    }

    fn transmit(&mut self, transaction: Transaction) -> Result<Transaction, SwdError> {
        (**self).transmit(transaction)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
