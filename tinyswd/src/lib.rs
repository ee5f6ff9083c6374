// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! tinyswd library
//!
//! ARM Serial Wire Debug (SWD) link layer, register client and target
//! controllers.
//!
//! This can be used to identify, halt, reset and program ARM Cortex-M MCUs
//! using the
//! [ARM SWD protocol](https://developer.arm.com/documentation/ihi0031/latest/)
//!
//! It is `no_std` and requires an `alloc` implementation.  Time comes from
//! [`embassy-time`](https://embassy.dev/), and the default `std` feature
//! selects its host driver.  Everything is synchronous and blocking: a
//! session owns one physical link, and operations run to completion on the
//! calling thread.
//!
//! The following diagram shows the key `tinyswd` concepts.
//!
//! ```text
//!      Application
//! ----------------------
//!     DebugInterface           CoreDebug / Scb / Flash
//! ----------------------    /
//!      SwdInterface  ------<--  TransactionHook (tracing)
//! ----------------------    \
//!   protocol::Transport       SwdError
//! ----------------------
//!  BitBang<Pins> | SimTarget
//! ----------------------
//!    SWDIO / SWCLK     >======================<   SWD Target
//! ```
//!
//! * [`DebugInterface`] owns a session plus the flash session state, and
//!   provides target level operations: initialize, reset, halt, program.
//! * [`SwdInterface`] is the link session.  It performs individual DP and AP
//!   register operations, retries WAIT acknowledges, caches DP SELECT and
//!   brings the link up.
//! * [`core_debug::CoreDebug`], [`scb::Scb`] and [`flash::Flash`] are
//!   controllers which borrow a session and drive memory mapped target
//!   registers through it.
//! * [`protocol::Transport`] is the physical layer.  [`bitbang::BitBang`]
//!   implements it over two GPIO lines, and [`sim::SimTarget`] over an
//!   in-memory model of a target.
//!
//! `tinyswd` is designed to be used alongside the [`tinyswd_core`] library,
//! which provides the register definitions used here.

#![cfg_attr(not(test), no_std)]

pub mod bitbang;
pub mod clock;
pub mod core_debug;
pub mod debug;
pub mod flash;
pub mod hook;
pub mod interface;
pub mod protocol;
pub mod scb;
pub mod sim;

#[doc(inline)]
pub use crate::debug::DebugInterface;
#[doc(inline)]
pub use crate::interface::{SwdConfig, SwdInterface};
#[doc(inline)]
pub use crate::protocol::{Ack, Transaction, Transport};

extern crate alloc;
use alloc::format;
use alloc::string::String;
use core::fmt;
use serde::Serialize;

/// Core error type used by all tinyswd objects
///
/// WAIT acknowledges never appear here: the link session retries them until
/// the target answers OK, or something else.
///
/// [`SwdError::requires_reset()`] tells apart errors which leave the link in
/// an unknown state, and need [`SwdInterface::initialize()`] before further
/// use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwdError {
    /// The physical transport failed.  Not recoverable by this layer.
    Transport(String),

    /// The target answered FAULT, or with a bit pattern that is no valid
    /// acknowledge.  7 means SWDIO stayed high for the entire acknowledge
    /// phase, which is the most common case when nothing is connected, or the
    /// target has just reset.
    ///
    /// Following a FAULT, clear the sticky flags using
    /// [`SwdInterface::abort()`] before retrying.
    BadAck(Ack),

    /// The parity bit read from the target did not match the data.  The data
    /// was discarded.
    ///
    /// A significant number of parity errors suggests either noise on the SWD
    /// lines, or clocking them faster than the target or wiring can handle.
    BadParity,

    /// A bounded poll gave up.  Carries the operation that timed out.
    Timeout(&'static str),

    /// The flash controller reported an error for the current program or
    /// erase operation.
    HardwareFault(FlashFault),

    /// The target is not ready to receive the requested operation, for
    /// example the flash controller is still busy.
    NotReady,

    /// The API was called incorrectly.
    Api(String),

    /// The caller supplied byte source or sink failed.
    Io(embedded_io::ErrorKind),
}

/// Flash controller status register errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlashFault {
    /// Programming alignment error (PGAERR)
    Alignment,
    /// Programming error (PROGERR), e.g. programming a word not erased
    Programming,
    /// Operation error (OPERR)
    Operation,
    /// Any other FLASH_SR error bits, e.g. WRPERR or PGSERR
    Other(u32),
}

impl FlashFault {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashFault::Alignment => "programming alignment error",
            FlashFault::Programming => "programming error",
            FlashFault::Operation => "operation error",
            FlashFault::Other(_) => "flash error",
        }
    }
}

impl fmt::Display for FlashFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashFault::Other(bits) => write!(f, "{} (SR 0x{bits:08X})", self.as_str()),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl SwdError {
    /// Returns true if the link is in an unknown state, and must be brought
    /// up again with [`SwdInterface::initialize()`].  If the error persists,
    /// the target may need a hard reset.
    pub fn requires_reset(&self) -> bool {
        matches!(self, SwdError::BadAck(_) | SwdError::BadParity)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SwdError::Timeout(_))
    }

    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwdError::Transport(_) => "Transport Error",
            SwdError::BadAck(_) => "Bad ACK",
            SwdError::BadParity => "Read Parity Error",
            SwdError::Timeout(_) => "Timeout",
            SwdError::HardwareFault(_) => "Hardware Fault",
            SwdError::NotReady => "Not Ready",
            SwdError::Api(_) => "API Error",
            SwdError::Io(_) => "I/O Error",
        }
    }

    pub(crate) fn io(error: impl embedded_io::Error) -> Self {
        SwdError::Io(error.kind())
    }
}

impl Serialize for SwdError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("SwdError", 2)?;

        let kind = match self {
            SwdError::Transport(_) => "transport",
            SwdError::BadAck(_) => "bad ack",
            SwdError::BadParity => "bad parity",
            SwdError::Timeout(_) => "timeout",
            SwdError::HardwareFault(_) => "hardware fault",
            SwdError::NotReady => "not ready",
            SwdError::Api(_) => "api error",
            SwdError::Io(_) => "io error",
        };
        state.serialize_field("kind", kind)?;

        let detail = match self {
            SwdError::Transport(msg) | SwdError::Api(msg) => msg.clone(),
            SwdError::BadAck(ack) => format!("{}", ack.bits()),
            SwdError::Timeout(operation) => String::from(*operation),
            SwdError::HardwareFault(fault) => format!("{fault}"),
            SwdError::Io(kind) => format!("{kind:?}"),
            SwdError::BadParity | SwdError::NotReady => String::new(),
        };
        state.serialize_field("detail", &detail)?;
        state.end()
    }
}

impl fmt::Display for SwdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwdError::Transport(msg) | SwdError::Api(msg) => write!(f, "{}: {msg}", self.as_str()),
            SwdError::BadAck(ack) => write!(f, "{}: {ack}", self.as_str()),
            SwdError::Timeout(operation) => write!(f, "{}: {operation}", self.as_str()),
            SwdError::HardwareFault(fault) => write!(f, "{}: {fault}", self.as_str()),
            SwdError::Io(kind) => write!(f, "{}: {kind:?}", self.as_str()),
            SwdError::BadParity | SwdError::NotReady => write!(f, "{}", self.as_str()),
        }
    }
}

impl core::error::Error for SwdError {}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display() {
        assert_eq!(
            SwdError::BadAck(Ack::Invalid(7)).to_string(),
            "Bad ACK: invalid (0b111)"
        );
        assert_eq!(SwdError::BadAck(Ack::Fault).to_string(), "Bad ACK: FAULT");
        assert_eq!(
            SwdError::Timeout("flash erase").to_string(),
            "Timeout: flash erase"
        );
        assert_eq!(
            SwdError::HardwareFault(FlashFault::Alignment).to_string(),
            "Hardware Fault: programming alignment error"
        );
        assert_eq!(
            SwdError::HardwareFault(FlashFault::Other(0x10)).to_string(),
            "Hardware Fault: flash error (SR 0x00000010)"
        );
    }

    #[test]
    fn serializes_kind_and_detail() {
        let json = serde_json::to_value(SwdError::Timeout("flash erase")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "timeout", "detail": "flash erase"}));

        let json = serde_json::to_value(SwdError::HardwareFault(FlashFault::Other(0x80))).unwrap();
        assert_eq!(json["detail"], "flash error (SR 0x00000080)");

        let json = serde_json::to_value(SwdError::BadParity).unwrap();
        assert_eq!(json["detail"], "");
    }

    #[test]
    fn reset_classification() {
        assert!(SwdError::BadParity.requires_reset());
        assert!(SwdError::BadAck(Ack::Fault).requires_reset());
        assert!(!SwdError::Timeout("halt").requires_reset());
        assert!(SwdError::Timeout("halt").is_timeout());
    }
}
