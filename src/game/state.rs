//! Lock State Definitions
//!
//! Plain data owned by the engine: the lock state, why a round was reset,
//! and the player's partial input.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::game::combination::Step;

// =============================================================================
// LOCK STATE
// =============================================================================

/// State of the lock.
///
/// ```text
///   Idle ──start──► Armed ──full input──► Evaluating ──match──► Unlocked
///                     ▲                        │                   │
///                     │                     mismatch               │
///                     │                        ▼                   │
///                     └────────start──────── Failed                │
///                     └──────────────reset (replay/timeout)────────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
#[derive(Default)]
pub enum LockState {
    /// No combination generated yet
    #[default]
    Idle = 0,
    /// Waiting for moves
    Armed = 1,
    /// Comparing a complete input (transient)
    Evaluating = 2,
    /// Opened; terminal until replayed
    Unlocked = 3,
    /// Wrong input (transient, re-arms immediately)
    Failed = 4,
}

impl LockState {
    /// Does this state accept moves?
    #[inline]
    pub fn accepts_moves(self) -> bool {
        matches!(self, LockState::Armed)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockState::Idle => "idle",
            LockState::Armed => "armed",
            LockState::Evaluating => "evaluating",
            LockState::Unlocked => "unlocked",
            LockState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a new combination was dealt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResetReason {
    /// Complete input did not match
    Mismatch,
    /// Round timer ran out
    Timeout,
    /// Relock delay after an unlock elapsed
    Relock,
    /// Caller asked for it
    External,
}

// =============================================================================
// PLAYER INPUT
// =============================================================================

/// Steps entered so far in the current round.
///
/// `committed` never grows past the combination length: the engine
/// evaluates and clears as soon as it is full.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInput {
    /// Finalized steps, in order
    committed: Vec<Step>,
    /// Step still growing (accumulate mode only)
    open: Option<Step>,
}

impl PlayerInput {
    /// Finalized steps.
    pub fn committed(&self) -> &[Step] {
        &self.committed
    }

    /// Step currently being entered, if any.
    pub fn open(&self) -> Option<Step> {
        self.open
    }

    /// Number of finalized steps.
    pub fn len(&self) -> usize {
        self.committed.len()
    }

    /// Nothing entered at all?
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.open.is_none()
    }

    pub(crate) fn push(&mut self, step: Step) {
        self.committed.push(step);
    }

    pub(crate) fn set_open(&mut self, step: Option<Step>) {
        self.open = step;
    }

    pub(crate) fn take_open(&mut self) -> Option<Step> {
        self.open.take()
    }

    pub(crate) fn take_committed(&mut self) -> Vec<Step> {
        self.open = None;
        std::mem::take(&mut self.committed)
    }

    pub(crate) fn clear(&mut self) {
        self.committed.clear();
        self.open = None;
    }
}

// =============================================================================
// TESTS
// =============================================================================
