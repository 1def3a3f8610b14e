//! Puzzle Session
//!
//! The integration layer. A `PuzzleSession` owns one engine, one gesture
//! normalizer, the optional round timer and a [`Presenter`], and is the only
//! place where raw input becomes engine calls.
//!
//! ```text
//!  PuzzleInput ──► GestureNormalizer ──NotchEvent──► MatchEngine
//!                                                        │
//!  advance(dt) ──► RoundTimer ──expired──► reset        take_events
//!              └─► relock delay ──► reset                │
//!                                                        ▼
//!                                     Presenter + session event log
//! ```
//!
//! With `record_inputs` on, every applied input and every advance of time is
//! recorded in order, so a round can be re-run with [`replay_round`] and
//! compared by hash.

use std::time::Duration;

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::fixed::{Fixed, NOTCH_DEGREES, try_to_fixed};
use crate::core::hash::{StateHash, compute_session_hash};
use crate::core::rng::DeterministicRng;
use crate::game::combination::{Combination, CombinationGenerator};
use crate::game::engine::{EngineConfig, LockError, MatchEngine, MatchPolicy, StepMode};
use crate::game::events::{EventLog, LockEvent, LockEventData};
use crate::game::gesture::{GestureNormalizer, InputError, KeyInput, NotchEvent};
use crate::game::state::{LockState, ResetReason};
use crate::game::timer::RoundTimer;
use crate::{COMBINATION_LENGTH, MAGNITUDE_MAX, MAGNITUDE_MIN, RELOCK_AFTER_MS, ROUND_DURATION_MS};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Invalid puzzle configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Combination length of zero
    #[error("combination_length must be at least 1")]
    ZeroLength,

    /// Magnitude range empty or starting at zero
    #[error("magnitude range {min}..={max} is invalid")]
    InvalidMagnitudeRange {
        /// Configured minimum
        min: u8,
        /// Configured maximum
        max: u8,
    },

    /// Threshold not a positive in-range number
    #[error("notch_threshold {0} must be positive and within the input range")]
    InvalidThreshold(f64),

    /// Zero degrees per notch
    #[error("notch_degrees must not be zero")]
    ZeroNotchDegrees,

    /// A round timer of zero length
    #[error("round_duration_ms must be positive (omit it to disable the timer)")]
    ZeroRoundDuration,

    /// JSON could not be parsed
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Puzzle configuration.
///
/// Every field has a default, so a config file only lists what it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PuzzleConfig {
    /// Steps per combination
    pub combination_length: usize,
    /// Smallest step magnitude
    pub magnitude_min: u8,
    /// Largest step magnitude
    pub magnitude_max: u8,
    /// Drag distance per notch, in input units
    pub notch_threshold: f64,
    /// Handle rotation per notch, in degrees
    pub notch_degrees: i32,
    /// Notch aggregation
    pub step_mode: StepMode,
    /// Step comparison
    pub match_policy: MatchPolicy,
    /// Round length, `None` for no timer
    pub round_duration_ms: Option<u64>,
    /// Delay before an opened vault relocks, `None` to stay open
    pub relock_after_ms: Option<u64>,
    /// Keep a recording of inputs and time for [`replay_round`]
    pub record_inputs: bool,
}

impl Default for PuzzleConfig {
    fn default() -> Self {
        Self {
            combination_length: COMBINATION_LENGTH,
            magnitude_min: MAGNITUDE_MIN,
            magnitude_max: MAGNITUDE_MAX,
            notch_threshold: 60.0,
            notch_degrees: NOTCH_DEGREES,
            step_mode: StepMode::default(),
            match_policy: MatchPolicy::default(),
            round_duration_ms: Some(ROUND_DURATION_MS),
            relock_after_ms: Some(RELOCK_AFTER_MS),
            record_inputs: false,
        }
    }
}

impl PuzzleConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.combination_length == 0 {
            return Err(ConfigError::ZeroLength);
        }
        if self.magnitude_min == 0 || self.magnitude_min > self.magnitude_max {
            return Err(ConfigError::InvalidMagnitudeRange {
                min: self.magnitude_min,
                max: self.magnitude_max,
            });
        }
        self.threshold()?;
        if self.notch_degrees == 0 {
            return Err(ConfigError::ZeroNotchDegrees);
        }
        if self.round_duration_ms == Some(0) {
            return Err(ConfigError::ZeroRoundDuration);
        }
        Ok(())
    }

    /// Notch threshold in fixed point.
    pub fn threshold(&self) -> Result<Fixed, ConfigError> {
        match try_to_fixed(self.notch_threshold) {
            Some(fixed) if fixed > 0 => Ok(fixed),
            _ => Err(ConfigError::InvalidThreshold(self.notch_threshold)),
        }
    }

    /// Engine part of the configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            generator: CombinationGenerator {
                length: self.combination_length,
                magnitude_min: self.magnitude_min,
                magnitude_max: self.magnitude_max,
            },
            step_mode: self.step_mode,
            match_policy: self.match_policy,
        }
    }
}

// =============================================================================
// PRESENTATION
// =============================================================================

/// Visual side of the puzzle. Implementations only render; they never
/// change the lock.
pub trait Presenter {
    /// Handle moved to `degrees` (cumulative, signed, clockwise positive).
    fn set_handle_rotation(&mut self, degrees: i32);

    /// The vault opened in `round`.
    fn play_unlock_sequence(&mut self, round: u32);

    /// A new combination was dealt.
    fn play_reset_sequence(&mut self, reason: ResetReason);
}

/// Presenter that draws nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn set_handle_rotation(&mut self, _degrees: i32) {}
    fn play_unlock_sequence(&mut self, _round: u32) {}
    fn play_reset_sequence(&mut self, _reason: ResetReason) {}
}

impl<P: Presenter + ?Sized> Presenter for Box<P> {
    fn set_handle_rotation(&mut self, degrees: i32) {
        (**self).set_handle_rotation(degrees);
    }

    fn play_unlock_sequence(&mut self, round: u32) {
        (**self).play_unlock_sequence(round);
    }

    fn play_reset_sequence(&mut self, reason: ResetReason) {
        (**self).play_reset_sequence(reason);
    }
}

// =============================================================================
// INPUT
// =============================================================================

/// Raw input accepted by a session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PuzzleInput {
    /// Pointer pressed at x
    DragStart(f64),
    /// Pointer moved to x
    DragMove(f64),
    /// Pointer released (confirms the open step)
    DragEnd,
    /// Key pressed
    Key(KeyInput),
    /// Deal a new combination (external replay trigger)
    Replay,
}

/// One entry of a session recording.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordedInput {
    /// An input applied at session time `at_ms`
    Input {
        /// Session time in milliseconds
        at_ms: u64,
        /// The input
        input: PuzzleInput,
    },
    /// Time passed (consecutive advances are merged)
    Advance {
        /// Time advanced
        elapsed: Duration,
    },
}

/// Anything `apply` can reject.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// Rejected at the gesture boundary
    #[error(transparent)]
    Input(#[from] InputError),

    /// Rejected by the engine
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Read-only view of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current round
    pub round: u32,
    /// Lock state
    pub state: LockState,
    /// Steps finalized this round
    pub current_move_index: usize,
    /// Failed attempts so far
    pub failed_attempts: u32,
    /// Cumulative handle rotation
    pub handle_degrees: i32,
    /// Time left in the round
    pub timer_remaining_ms: Option<u64>,
    /// Hash of the current secret
    pub fingerprint: Option<StateHash>,
}

// =============================================================================
// SESSION
// =============================================================================

/// One player's puzzle.
pub struct PuzzleSession<P: Presenter = NullPresenter> {
    config: PuzzleConfig,
    seed: u64,
    engine: MatchEngine,
    gesture: GestureNormalizer,
    /// Never started when the config has no round duration
    timer: RoundTimer,
    /// Time until an opened vault relocks
    relock_in: Option<Duration>,
    presenter: P,
    handle_degrees: i32,
    /// Session time, advanced only by `advance`
    elapsed: Duration,
    recording: Vec<RecordedInput>,
    events: EventLog,
}

impl PuzzleSession<NullPresenter> {
    /// Headless session.
    pub fn new(config: PuzzleConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::with_presenter(config, seed, NullPresenter)
    }
}

impl<P: Presenter> PuzzleSession<P> {
    /// Session rendering through `presenter`. Idle until [`start`](Self::start).
    pub fn with_presenter(config: PuzzleConfig, seed: u64, presenter: P) -> Result<Self, ConfigError> {
        config.validate()?;
        let threshold = config.threshold()?;

        Ok(Self {
            engine: MatchEngine::new(config.engine_config(), DeterministicRng::new(seed)),
            gesture: GestureNormalizer::new(threshold),
            timer: RoundTimer::new(),
            relock_in: None,
            presenter,
            handle_degrees: 0,
            elapsed: Duration::ZERO,
            recording: Vec::new(),
            events: EventLog::default(),
            config,
            seed,
        })
    }

    /// Deal the first combination.
    pub fn start(&mut self) {
        info!("Session started (seed {:#x})", self.seed);
        self.engine.start();
        self.process_engine_events();
    }

    /// Apply one input.
    ///
    /// Errors are benign: the rejected input changes nothing.
    pub fn apply(&mut self, input: PuzzleInput) -> Result<(), SessionError> {
        if self.config.record_inputs {
            self.recording.push(RecordedInput::Input {
                at_ms: self.elapsed.as_millis() as u64,
                input,
            });
        }

        let result = self.dispatch(input);
        self.process_engine_events();

        if let Err(err) = &result {
            match err {
                SessionError::Input(e) => warn!("Input rejected: {}", e),
                SessionError::Lock(e) => debug!("{}", e),
            }
        }
        result
    }

    /// Let time pass: runs the round timer and the relock delay.
    ///
    /// Time is consumed deadline by deadline, so one long advance and many
    /// short ones that add up to it end in the same state.
    pub fn advance(&mut self, elapsed: Duration) {
        self.elapsed += elapsed;
        if self.config.record_inputs {
            match self.recording.last_mut() {
                Some(RecordedInput::Advance { elapsed: last }) => *last += elapsed,
                _ => self.recording.push(RecordedInput::Advance { elapsed }),
            }
        }

        let mut left = elapsed;
        loop {
            let slice = [Some(left), self.timer.remaining(), self.relock_in]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(left);

            if self.timer.advance(slice) > 0 && self.engine.state() == LockState::Armed {
                info!("Round {} timed out", self.engine.round());
                self.engine.reset_with(ResetReason::Timeout);
            }

            if let Some(relock) = self.relock_in {
                if slice >= relock {
                    self.relock_in = None;
                    if self.engine.state() == LockState::Unlocked {
                        self.engine.reset_with(ResetReason::Relock);
                    }
                } else {
                    self.relock_in = Some(relock - slice);
                }
            }

            self.process_engine_events();

            left -= slice;
            if left.is_zero() {
                break;
            }
        }
    }

    /// Register a callback run whenever the round timer runs out, before
    /// the new combination is dealt. Never runs if the timer is disabled.
    pub fn on_timeout<F>(&mut self, listener: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.timer.on_expire(listener);
    }

    /// Take pending events (consumes them).
    ///
    /// At most [`EVENT_LOG_CAPACITY`](crate::EVENT_LOG_CAPACITY) undrained
    /// events are kept; older ones are dropped.
    pub fn take_events(&mut self) -> Vec<LockEvent> {
        self.events.drain()
    }

    /// Recorded inputs and advances, oldest first. Empty unless
    /// `record_inputs` is set.
    pub fn recording(&self) -> &[RecordedInput] {
        &self.recording
    }

    /// Lock state.
    pub fn state(&self) -> LockState {
        self.engine.state()
    }

    /// Cumulative handle rotation in degrees.
    pub fn handle_degrees(&self) -> i32 {
        self.handle_degrees
    }

    /// Session configuration.
    pub fn config(&self) -> &PuzzleConfig {
        &self.config
    }

    /// Seed the session was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The engine, for listener registration and direct calls.
    pub fn engine_mut(&mut self) -> &mut MatchEngine {
        &mut self.engine
    }

    /// The engine, read-only.
    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    /// The gesture normalizer, read-only.
    pub fn gesture(&self) -> &GestureNormalizer {
        &self.gesture
    }

    /// The presenter.
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Current read-only view.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            round: self.engine.round(),
            state: self.engine.state(),
            current_move_index: self.engine.current_move_index(),
            failed_attempts: self.engine.failed_attempts(),
            handle_degrees: self.handle_degrees,
            timer_remaining_ms: self.timer.remaining().map(|d| d.as_millis() as u64),
            fingerprint: self.engine.combination().map(Combination::fingerprint),
        }
    }

    /// Hash of everything that determines future behaviour.
    pub fn compute_hash(&self) -> StateHash {
        compute_session_hash(self.engine.round(), self.seed, |h| {
            h.update_u8(self.engine.state() as u8);
            h.update_u32(self.engine.current_move_index() as u32);
            h.update_u32(self.engine.failed_attempts());
            h.update_i32(self.handle_degrees);
            match self.gesture.baseline() {
                Some(baseline) => {
                    h.update_bool(true);
                    h.update_i32(baseline);
                }
                None => h.update_bool(false),
            }
            h.update_i32(self.gesture.pending());
            match self.engine.combination() {
                Some(secret) => h.update_bytes(&secret.fingerprint()),
                None => h.update_bool(false),
            }
            for step in self.engine.input().committed() {
                h.update_u8(step.magnitude);
                h.update_u8(step.direction as u8);
            }
            match self.engine.input().open() {
                Some(step) => {
                    h.update_bool(true);
                    h.update_u8(step.magnitude);
                    h.update_u8(step.direction as u8);
                }
                None => h.update_bool(false),
            }
            for deadline in [self.timer.remaining(), self.relock_in] {
                match deadline {
                    Some(left) => {
                        h.update_bool(true);
                        h.update_u64(left.as_nanos() as u64);
                    }
                    None => h.update_bool(false),
                }
            }
            for word in self.engine.rng().state() {
                h.update_u64(word);
            }
        })
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn dispatch(&mut self, input: PuzzleInput) -> Result<(), SessionError> {
        match input {
            PuzzleInput::DragStart(x) => {
                self.gesture.on_drag_start(x)?;
            }
            PuzzleInput::DragMove(x) => {
                for notch in self.gesture.on_drag_move(x)? {
                    self.feed(notch)?;
                }
            }
            PuzzleInput::DragEnd => {
                let summary = self.gesture.on_drag_end().ok_or(InputError::NoActiveDrag)?;
                debug!("Drag released after {} notch(es)", summary.notches);
                if self.engine.state().accepts_moves() {
                    self.engine.confirm()?;
                }
            }
            PuzzleInput::Key(KeyInput::Confirm) => {
                self.engine.confirm()?;
            }
            PuzzleInput::Key(key) => {
                if let Some(notch) = self.gesture.key_notch(key) {
                    self.feed(notch)?;
                }
            }
            PuzzleInput::Replay => self.engine.reset(),
        }
        Ok(())
    }

    fn feed(&mut self, notch: NotchEvent) -> Result<(), LockError> {
        self.engine.record_move(notch)?;
        self.handle_degrees = self
            .handle_degrees
            .saturating_add(notch.direction.sign() * self.config.notch_degrees);
        self.presenter.set_handle_rotation(self.handle_degrees);
        Ok(())
    }

    fn process_engine_events(&mut self) {
        for event in self.engine.take_events() {
            match event.data {
                LockEventData::Armed { .. } => {
                    self.relock_in = None;
                    if let Some(ms) = self.config.round_duration_ms {
                        self.timer.start(Duration::from_millis(ms));
                    }
                }
                LockEventData::Unlocked { .. } => {
                    self.timer.stop();
                    self.relock_in = self.config.relock_after_ms.map(Duration::from_millis);
                    self.presenter.play_unlock_sequence(event.round);
                }
                LockEventData::Reset { reason } => {
                    self.presenter.play_reset_sequence(reason);
                }
                _ => {}
            }
            self.events.push(event);
        }
    }
}

/// Result of re-running a recorded session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Final lock state
    pub state: LockState,
    /// Final round
    pub round: u32,
    /// Every event, in order
    pub events: Vec<LockEvent>,
    /// Final session hash
    pub hash: StateHash,
}

/// Re-run a recording on a fresh headless session.
///
/// Inputs and advances are applied in recorded order. Rejected inputs are
/// rejected again and otherwise ignored.
pub fn replay_round(
    config: PuzzleConfig,
    seed: u64,
    recording: &[RecordedInput],
) -> Result<ReplayOutcome, ConfigError> {
    let mut session = PuzzleSession::new(PuzzleConfig { record_inputs: false, ..config }, seed)?;
    session.start();

    for entry in recording {
        match *entry {
            RecordedInput::Input { input, .. } => {
                let _ = session.apply(input);
            }
            RecordedInput::Advance { elapsed } => session.advance(elapsed),
        }
    }

    Ok(ReplayOutcome {
        state: session.state(),
        round: session.engine().round(),
        events: session.take_events(),
        hash: session.compute_hash(),
    })
}

// =============================================================================
// TESTS
// =============================================================================
