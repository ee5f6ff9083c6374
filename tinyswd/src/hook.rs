// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Transaction observability
//!
//! A [`TransactionHook`] is told about every transaction attempt the link
//! session makes, including each retry after a WAIT.  Hooks observe only:
//! nothing they do changes what goes on the wire.

use log::{Level, log, log_enabled};

use crate::SwdError;
use crate::protocol::Transaction;

/// Receives every transaction attempt
pub trait TransactionHook {
    /// Called after each attempt.  `name` is the register or operation name
    /// given by the caller, `transaction` is as completed by the transport
    /// (or as requested, if the transport itself failed), and `error` is set
    /// when the attempt ended the operation with an error.
    fn notify(&mut self, name: &str, transaction: &Transaction, error: Option<&SwdError>);
}

/// Does nothing.  The default hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopHook;

impl TransactionHook for NopHook {
    fn notify(&mut self, _name: &str, _transaction: &Transaction, _error: Option<&SwdError>) {}
}

/// Logs every attempt through `log`
///
/// Successful and WAIT attempts are logged at the configured level, errors
/// one level higher (but at least `Debug`).
#[derive(Debug, Clone, Copy)]
pub struct LogHook {
    level: Level,
}

impl LogHook {
    pub const fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Default for LogHook {
    fn default() -> Self {
        Self::new(Level::Trace)
    }
}

impl TransactionHook for LogHook {
    fn notify(&mut self, name: &str, transaction: &Transaction, error: Option<&SwdError>) {
        match error {
            None => {
                if log_enabled!(self.level) {
                    if transaction.is_read() {
                        log!(
                            self.level,
                            "SWD:   {name:<10} {transaction} {} 0x{:08X}",
                            transaction.ack,
                            transaction.data
                        );
                    } else {
                        log!(self.level, "SWD:   {name:<10} {transaction} {}", transaction.ack);
                    }
                }
            }
            Some(e) => {
                let level = match self.level {
                    Level::Trace => Level::Debug,
                    Level::Debug => Level::Info,
                    Level::Info => Level::Warn,
                    Level::Warn | Level::Error => Level::Error,
                };
                log!(level, "SWD:   {name:<10} {transaction} {e}");
            }
        }
    }
}
