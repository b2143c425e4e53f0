//! Cancellable repeating timers driven by the server's event loop
//!
//! A room does not own a background task per loop. Instead each loop is a
//! `RepeatingTimer` holding its next deadline; the server loop sleeps until the
//! earliest deadline across all rooms and then asks each timer whether it is
//! due. Disarming a timer is the cancellation; a disarmed timer never fires.

use tokio::time::{Duration, Instant};

/// A fixed-period timer that is either armed (has a next deadline) or idle.
#[derive(Debug, Clone)]
pub struct RepeatingTimer {
    period: Duration,
    next_due: Option<Instant>,
}

impl RepeatingTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arms the timer so it first fires one period after `now`.
    ///
    /// Returns false and leaves the existing deadline untouched if the timer
    /// is already armed.
    pub fn arm(&mut self, now: Instant) -> bool {
        if self.next_due.is_some() {
            return false;
        }
        self.next_due = Some(now + self.period);
        true
    }

    /// Disarms the timer. Returns false if it was already idle.
    pub fn cancel(&mut self) -> bool {
        self.next_due.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Fires at most once per call if the deadline has passed.
    ///
    /// Deadlines that were missed entirely are skipped rather than replayed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        let due = match self.next_due {
            Some(due) if due <= now => due,
            _ => return false,
        };

        let mut next = due + self.period;
        if next <= now {
            let missed = (now - due).as_nanos() / self.period.as_nanos().max(1);
            next = due + self.period * (missed as u32 + 1);
        }
        self.next_due = Some(next);
        true
    }
}

/// Period of one physics tick for the given rate.
pub fn tick_period(tick_rate: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(tick_rate.max(1)))
}
