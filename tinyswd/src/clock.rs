// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Time and retry policies
//!
//! Every loop in tinyswd which waits on the target goes through
//! [`RetryPolicy::poll`]: WAIT acknowledge retries, power-up, link bring-up,
//! core halt and resume, and flash busy polling.  The policy says how long
//! to keep trying and how long to sleep in between.  The [`Clock`] says what
//! "now" and "sleep" mean, so tests can use a [`ManualClock`] and run without
//! sleeping.

use alloc::rc::Rc;
use core::cell::Cell;
use embassy_time::{Duration, Instant};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::SwdError;

/// Source of time for polling loops
pub trait Clock: Clone {
    fn now(&self) -> Instant;

    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// The embassy-time clock
///
/// With the `std` feature this uses embassy-time's host driver.  Otherwise
/// the application must provide an embassy-time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        embassy_time::block_for(duration);
    }
}

/// A clock which only moves when slept on, or when advanced explicitly.
///
/// Clones share the same time, so a test can keep a handle to the clock it
/// gave a session.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.micros.set(self.micros.get() + duration.as_micros());
    }

    /// Total time slept or advanced since creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.micros.get())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.micros.get())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// How long a [`RetryPolicy`] keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Until the step finishes or fails.
    Unbounded,
    /// At most this many attempts.
    Attempts(u32),
    /// Until this much time has passed since the first attempt.
    Deadline(Duration),
}

/// A retry-until-condition loop, as a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    limit: RetryLimit,
    interval: Duration,
}

impl RetryPolicy {
    pub const fn unbounded(interval: Duration) -> Self {
        Self {
            limit: RetryLimit::Unbounded,
            interval,
        }
    }

    pub const fn attempts(attempts: u32, interval: Duration) -> Self {
        Self {
            limit: RetryLimit::Attempts(attempts),
            interval,
        }
    }

    pub const fn deadline(timeout: Duration, interval: Duration) -> Self {
        Self {
            limit: RetryLimit::Deadline(timeout),
            interval,
        }
    }

    pub const fn limit(&self) -> RetryLimit {
        self.limit
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs `step` until it produces a value.
    ///
    /// `step` returns `Ok(Some(value))` when done, `Ok(None)` to try again
    /// after the interval, or `Err` to stop immediately.  When the limit is
    /// exhausted, fails with [`SwdError::Timeout`] naming `operation`.
    ///
    /// With an attempt limit, the interval is slept between attempts but not
    /// after the last one.  With a deadline, the deadline is checked before
    /// every attempt, so a zero deadline times out without calling `step`.
    pub fn poll<C, T, F>(&self, clock: &C, operation: &'static str, mut step: F) -> Result<T, SwdError>
    where
        C: Clock,
        F: FnMut() -> Result<Option<T>, SwdError>,
    {
        let start = clock.now();
        let mut attempt: u32 = 0;

        loop {
            match self.limit {
                RetryLimit::Unbounded => (),
                RetryLimit::Attempts(max) => {
                    if attempt >= max {
                        break;
                    }
                }
                RetryLimit::Deadline(timeout) => {
                    if clock.now().duration_since(start) >= timeout {
                        break;
                    }
                }
            }

            if let Some(value) = step()? {
                return Ok(value);
            }
            attempt = attempt.saturating_add(1);

            if let RetryLimit::Attempts(max) = self.limit {
                if attempt >= max {
                    break;
                }
            }
            clock.sleep(self.interval);
        }

        debug!("Timeout: {operation} after {attempt} attempts");
        Err(SwdError::Timeout(operation))
    }
}
