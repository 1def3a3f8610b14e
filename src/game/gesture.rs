//! Gesture Normalization
//!
//! Turns continuous pointer drags and discrete key presses into
//! [`NotchEvent`]s, the only rotation input the engine understands.
//!
//! One `GestureNormalizer` lives for the whole session. Per-drag state
//! (baseline, accumulator) is reset in place at every drag start instead of
//! building a new tracker per gesture.
//!
//! ```text
//!  position ──try_to_fixed──► delta = position - baseline
//!                                 │
//!             n = floor(|delta| / threshold)
//!                                 │
//!        n notches (sign of delta), baseline += sign * n * threshold
//! ```

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::core::fixed::{Fixed, NOTCH_THRESHOLD, fixed_abs, to_float, try_to_fixed, whole_steps};
use crate::game::combination::Direction;

/// Errors raised at the input boundary.
///
/// None of these ever reach the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    /// Position was NaN, infinite or out of range
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Drag move or end without a drag start
    #[error("no drag in progress")]
    NoActiveDrag,

    /// Key identifier with no mapping
    #[error("unknown key: {0}")]
    UnknownKey(String),
}

/// One discrete unit of rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotchEvent {
    /// Rotation direction
    pub direction: Direction,
    /// Monotonic sequence number, ascending in emission order
    pub seq: u64,
}

impl NotchEvent {
    /// Notch with sequence number 0, for callers that bypass the normalizer.
    pub const fn new(direction: Direction) -> Self {
        Self { direction, seq: 0 }
    }

    /// Clockwise notch.
    pub const fn cw() -> Self {
        Self::new(Direction::Clockwise)
    }

    /// Counter-clockwise notch.
    pub const fn ccw() -> Self {
        Self::new(Direction::CounterClockwise)
    }
}

/// Discrete key input. Already normalized, one action per press.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyInput {
    /// One notch clockwise (`ArrowRight`)
    RotateClockwise,
    /// One notch counter-clockwise (`ArrowLeft`)
    RotateCounterClockwise,
    /// Finalize the open step (`Enter`)
    Confirm,
}

impl KeyInput {
    /// Map a key identifier (DOM `KeyboardEvent.key` naming).
    pub fn parse(name: &str) -> Result<Self, InputError> {
        match name {
            "ArrowRight" | "Right" | "d" | "D" => Ok(KeyInput::RotateClockwise),
            "ArrowLeft" | "Left" | "a" | "A" => Ok(KeyInput::RotateCounterClockwise),
            "Enter" | " " => Ok(KeyInput::Confirm),
            other => Err(InputError::UnknownKey(other.to_string())),
        }
    }

    /// Key that rotates in `direction`.
    pub fn rotate(direction: Direction) -> Self {
        match direction {
            Direction::Clockwise => KeyInput::RotateClockwise,
            Direction::CounterClockwise => KeyInput::RotateCounterClockwise,
        }
    }

    /// Rotation carried by this key, if any.
    pub fn direction(self) -> Option<Direction> {
        match self {
            KeyInput::RotateClockwise => Some(Direction::Clockwise),
            KeyInput::RotateCounterClockwise => Some(Direction::CounterClockwise),
            KeyInput::Confirm => None,
        }
    }
}

/// What happened during one finished drag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DragSummary {
    /// Notches emitted during the drag
    pub notches: u32,
    /// Sub-threshold offset thrown away at release
    pub discarded: Fixed,
}

/// Converts drag positions into notches.
#[derive(Clone, Debug)]
pub struct GestureNormalizer {
    /// Distance per notch (Fixed, > 0)
    threshold: Fixed,
    /// Position where the current notch window starts
    baseline: Option<Fixed>,
    /// Offset from baseline not yet worth a notch
    accumulator: Fixed,
    /// Notches emitted during the current drag
    drag_notches: u32,
    /// Next sequence number
    next_seq: u64,
}

impl Default for GestureNormalizer {
    fn default() -> Self {
        Self::new(NOTCH_THRESHOLD)
    }
}

impl GestureNormalizer {
    /// Create a normalizer. A non-positive threshold falls back to the default.
    pub fn new(threshold: Fixed) -> Self {
        Self {
            threshold: if threshold > 0 { threshold } else { NOTCH_THRESHOLD },
            baseline: None,
            accumulator: 0,
            drag_notches: 0,
            next_seq: 0,
        }
    }

    /// Distance per notch.
    pub fn threshold(&self) -> Fixed {
        self.threshold
    }

    /// Is a drag in progress?
    pub fn is_dragging(&self) -> bool {
        self.baseline.is_some()
    }

    /// Position the next notch is measured from, `None` between drags.
    pub fn baseline(&self) -> Option<Fixed> {
        self.baseline
    }

    /// Signed offset accumulated since the last notch.
    pub fn pending(&self) -> Fixed {
        self.accumulator
    }

    /// Begin a drag at `position`.
    ///
    /// Starting while already dragging abandons the old drag.
    pub fn on_drag_start(&mut self, position: f64) -> Result<(), InputError> {
        let position = to_position(position)?;
        if self.baseline.is_some() {
            debug!("Drag restarted without release");
        }
        self.baseline = Some(position);
        self.accumulator = 0;
        self.drag_notches = 0;
        Ok(())
    }

    /// Feed the current pointer position.
    ///
    /// Returns one notch per threshold crossed since the baseline, in order.
    pub fn on_drag_move(&mut self, position: f64) -> Result<Vec<NotchEvent>, InputError> {
        let baseline = self.baseline.ok_or(InputError::NoActiveDrag)?;
        let position = to_position(position)?;

        let delta = position as i64 - baseline as i64;
        let crossed = whole_steps(delta, self.threshold);

        let Some(direction) = Direction::from_sign(delta.signum() as i32) else {
            self.accumulator = 0;
            return Ok(Vec::new());
        };
        if crossed == 0 {
            self.accumulator = delta as Fixed;
            return Ok(Vec::new());
        }

        // Re-baseline by whole thresholds only; the remainder carries over.
        let consumed = direction.sign() as i64 * crossed as i64 * self.threshold as i64;
        let new_baseline = (baseline as i64 + consumed) as Fixed;
        self.baseline = Some(new_baseline);
        self.accumulator = position - new_baseline;
        self.drag_notches += crossed;

        let notches: Vec<NotchEvent> = (0..crossed)
            .map(|_| {
                let seq = self.next_seq;
                self.next_seq += 1;
                NotchEvent { direction, seq }
            })
            .collect();

        trace!(
            "Drag crossed {} notch(es) {}, {:.2} pending",
            crossed,
            direction,
            to_float(fixed_abs(self.accumulator))
        );
        Ok(notches)
    }

    /// Finish the drag. Any sub-threshold offset is discarded.
    ///
    /// Returns `None` if no drag was in progress.
    pub fn on_drag_end(&mut self) -> Option<DragSummary> {
        self.baseline.take()?;
        let summary = DragSummary {
            notches: self.drag_notches,
            discarded: self.accumulator,
        };
        self.accumulator = 0;
        self.drag_notches = 0;
        Some(summary)
    }

    /// Sequence-stamp a key press so it orders with drag notches.
    pub fn key_notch(&mut self, key: KeyInput) -> Option<NotchEvent> {
        let direction = key.direction()?;
        let seq = self.next_seq;
        self.next_seq += 1;
        Some(NotchEvent { direction, seq })
    }
}

fn to_position(position: f64) -> Result<Fixed, InputError> {
    try_to_fixed(position)
        .ok_or_else(|| InputError::MalformedInput(format!("position {position} is not a usable coordinate")))
}

// =============================================================================
// TESTS
// =============================================================================
