//! Round Timer
//!
//! A periodic countdown advanced explicitly by its owner. The session feeds
//! it the elapsed time of each tick, so expiry is deterministic and
//! replayable; the async driver is what ties it to the wall clock.
//!
//! Time past a deadline is carried into the next period, so the number of
//! expiries depends only on the total time advanced, never on how it was
//! split into ticks.

use std::fmt;
use std::time::Duration;

use tracing::debug;

type ExpireListener = Box<dyn FnMut() + Send>;

/// Countdown that restarts itself and fires its callbacks once per period.
#[derive(Default)]
pub struct RoundTimer {
    /// Time left in the current period, `None` while stopped
    remaining: Option<Duration>,
    /// Period length
    duration: Duration,
    listeners: Vec<ExpireListener>,
}

impl RoundTimer {
    /// Stopped timer with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback run every time a period ends.
    ///
    /// This is the host's hook (sound, HUD flash); the lock itself is reset
    /// by the owner from the value [`advance`](Self::advance) returns.
    pub fn on_expire<F>(&mut self, listener: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Start (or restart) a countdown.
    ///
    /// A zero duration expires once on the next [`advance`](Self::advance)
    /// and then stops.
    pub fn start(&mut self, duration: Duration) {
        if self.remaining.is_some() {
            debug!("Round timer restarted with {:?} left", self.remaining);
        }
        self.duration = duration;
        self.remaining = Some(duration);
    }

    /// Cancel the countdown. Safe to call when stopped.
    pub fn stop(&mut self) {
        self.remaining = None;
    }

    /// Is a countdown in progress?
    pub fn is_running(&self) -> bool {
        self.remaining.is_some()
    }

    /// Time left, or `None` if stopped.
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining
    }

    /// Period length.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Let `elapsed` pass. Returns how many periods ended during this call;
    /// listeners have run once for each by then.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        let Some(mut left) = self.remaining else {
            return 0;
        };

        let mut rest = elapsed;
        let mut expired = 0u32;
        while rest >= left {
            rest -= left;
            expired = expired.saturating_add(1);
            debug!("Round timer expired after {:?}", self.duration);
            for listener in &mut self.listeners {
                listener();
            }
            if self.duration.is_zero() {
                self.remaining = None;
                return expired;
            }
            left = self.duration;
        }

        self.remaining = Some(left - rest);
        expired
    }
}

impl fmt::Debug for RoundTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundTimer")
            .field("remaining", &self.remaining)
            .field("duration", &self.duration)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
