//! Countdown tracking for timed voting rounds
//!
//! A run is identified by its absolute end instant. The controller reports
//! the remaining whole seconds on each tick and reports expiry exactly once
//! per run, no matter how many later ticks land past the deadline.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Cadence at which the countdown is re-evaluated
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Remaining whole seconds until `end`, rounded up
pub fn remaining_seconds(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (end - now).num_milliseconds();
    (millis + 999).div_euclid(1000)
}

/// What a single tick observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    /// Still counting down
    Running(i64),
    /// The deadline passed on this tick; reported once per run
    Expired,
    /// Already expired earlier, nothing to do
    Stopped,
}

#[derive(Debug, Clone)]
pub struct TimerController {
    end: DateTime<Utc>,
    fired: bool,
}

impl TimerController {
    pub fn new(end: DateTime<Utc>) -> Self {
        Self { end, fired: false }
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Evaluate the countdown at `now`
    pub fn tick(&mut self, now: DateTime<Utc>) -> TimerTick {
        if self.fired {
            return TimerTick::Stopped;
        }

        let remaining = remaining_seconds(self.end, now);
        if remaining <= 0 {
            self.fired = true;
            TimerTick::Expired
        } else {
            TimerTick::Running(remaining)
        }
    }

    /// Seconds left at `now`, clamped at zero
    pub fn remaining(&self, now: DateTime<Utc>) -> i64 {
        remaining_seconds(self.end, now).max(0)
    }
}
