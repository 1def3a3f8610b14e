//! Lock Events
//!
//! Every transition the engine makes is recorded as a [`LockEvent`]. The
//! integration layer drains them to drive visuals; replays compare them.

use std::collections::VecDeque;

use serde::{Serialize, Deserialize};
use tracing::warn;

use crate::core::hash::StateHash;
use crate::game::combination::Step;
use crate::game::state::{LockState, ResetReason};

/// Lock event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockEventData {
    /// A new combination is in place
    Armed {
        /// Steps to enter
        length: usize,
        /// Hash of the secret
        fingerprint: StateHash,
    },

    /// A notch changed the step at `index`
    Moved {
        /// Position in the input
        index: usize,
        /// Step after the notch
        step: Step,
    },

    /// The step at `index` was finalized
    StepCommitted {
        /// Position in the input
        index: usize,
        /// Final step
        step: Step,
    },

    /// Lock state changed
    StateChanged {
        /// Previous state
        from: LockState,
        /// New state
        to: LockState,
    },

    /// Input matched the secret
    Unlocked {
        /// Failed attempts before this one, across the session
        failed_attempts: u32,
    },

    /// A new combination replaced the old one
    Reset {
        /// Why the round ended
        reason: ResetReason,
    },
}

/// A lock event with ordering information.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEvent {
    /// Monotonic event counter
    pub seq: u64,

    /// Round the event belongs to (the round being left, for resets)
    pub round: u32,

    /// Event data
    pub data: LockEventData,
}

impl LockEvent {
    /// Create a new event.
    pub fn new(seq: u64, round: u32, data: LockEventData) -> Self {
        Self { seq, round, data }
    }

    /// Is this the unlock event?
    pub fn is_unlock(&self) -> bool {
        matches!(self.data, LockEventData::Unlocked { .. })
    }

    /// Reset reason, if this is a reset event.
    pub fn reset_reason(&self) -> Option<ResetReason> {
        match self.data {
            LockEventData::Reset { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Pending events, oldest first, bounded by a capacity.
///
/// Owners that only use listeners never drain the log; once full, the
/// oldest event is dropped for every new one.
#[derive(Clone, Debug)]
pub struct EventLog {
    events: VecDeque<LockEvent>,
    capacity: usize,
    dropped: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(crate::EVENT_LOG_CAPACITY)
    }
}

impl EventLog {
    /// Log holding at most `capacity` events (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Append an event, evicting the oldest if full.
    pub fn push(&mut self, event: LockEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            if self.dropped == 0 {
                warn!("Event log full ({} events), dropping oldest", self.capacity);
            }
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Take every pending event (consumes them).
    pub fn drain(&mut self) -> Vec<LockEvent> {
        self.events.drain(..).collect()
    }

    /// Events waiting to be drained.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Nothing pending?
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
