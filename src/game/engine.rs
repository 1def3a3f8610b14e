//! Match Engine
//!
//! The lock's state machine. Holds the secret, the player's partial input
//! and the lock state; consumes notches and confirmations; decides between
//! unlock and reset.
//!
//! All mutation happens inside the engine's own methods. Observers either
//! register listeners (`on_move`, `on_unlock`, `on_reset`) or drain the
//! event log with [`MatchEngine::take_events`].

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::hash::short_hex;
use crate::core::rng::{DeterministicRng, RandomSource};
use crate::game::combination::{Combination, CombinationGenerator, Step};
use crate::game::events::{EventLog, LockEvent, LockEventData};
use crate::game::gesture::NotchEvent;
use crate::game::state::{LockState, PlayerInput, ResetReason};

/// Engine errors. All of them are benign: the engine state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// Operation not allowed in the current state
    #[error("{operation} ignored while {state}")]
    InvalidTransition {
        /// Rejected operation
        operation: &'static str,
        /// State at the time
        state: LockState,
    },

    /// A combination needs at least one step
    #[error("combination must contain at least one step")]
    EmptyCombination,
}

// =============================================================================
// POLICIES
// =============================================================================

/// How notches become steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    /// Every notch is a finished one-magnitude step
    PerNotch,
    /// Same-direction notches grow one step; a reversal or a confirm
    /// finalizes it
    #[default]
    AccumulateUntilReverse,
}

/// How a finished step is compared with the secret.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Direction and magnitude must both be equal
    Exact,
    /// Direction equal, magnitude at least the secret's (overshoot allowed)
    #[default]
    AtLeast,
}

impl MatchPolicy {
    /// Compare one step.
    #[inline]
    pub fn step_matches(self, secret: &Step, entered: &Step) -> bool {
        if secret.direction != entered.direction {
            return false;
        }
        match self {
            MatchPolicy::Exact => entered.magnitude == secret.magnitude,
            MatchPolicy::AtLeast => entered.magnitude >= secret.magnitude,
        }
    }

    /// Compare a complete input, position by position.
    pub fn matches(self, secret: &Combination, entered: &[Step]) -> bool {
        secret.len() == entered.len()
            && secret
                .steps()
                .iter()
                .zip(entered)
                .all(|(s, e)| self.step_matches(s, e))
    }
}

/// Engine configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Combination shape
    pub generator: CombinationGenerator,
    /// Notch aggregation
    pub step_mode: StepMode,
    /// Step comparison
    pub match_policy: MatchPolicy,
}

/// Result of an accepted move or confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Round continues; `step` at `index` is the one just touched
    InProgress {
        /// Position in the input
        index: usize,
        /// Step as it stands now
        step: Step,
    },
    /// Confirm with no open step
    NothingToConfirm,
    /// Input matched
    Unlocked,
    /// Input did not match, a new combination is armed
    Reset,
}

// =============================================================================
// LISTENERS
// =============================================================================

type MoveListener = Box<dyn FnMut(usize, Step) + Send>;
type UnlockListener = Box<dyn FnMut() + Send>;
type ResetListener = Box<dyn FnMut(ResetReason) + Send>;

#[derive(Default)]
struct Listeners {
    on_move: Vec<MoveListener>,
    on_unlock: Vec<UnlockListener>,
    on_reset: Vec<ResetListener>,
}

// =============================================================================
// ENGINE
// =============================================================================

/// The combination-lock state machine.
pub struct MatchEngine<R: RandomSource = DeterministicRng> {
    config: EngineConfig,
    rng: R,
    state: LockState,
    combination: Option<Combination>,
    input: PlayerInput,
    round: u32,
    failed_attempts: u32,
    next_event_seq: u64,
    pending_events: EventLog,
    listeners: Listeners,
}

impl MatchEngine<DeterministicRng> {
    /// Engine with default configuration and a seeded RNG.
    pub fn seeded(seed: u64) -> Self {
        Self::new(EngineConfig::default(), DeterministicRng::new(seed))
    }
}

impl<R: RandomSource> MatchEngine<R> {
    /// Create an idle engine. Nothing is generated until [`start`](Self::start).
    pub fn new(config: EngineConfig, rng: R) -> Self {
        Self {
            config,
            rng,
            state: LockState::Idle,
            combination: None,
            input: PlayerInput::default(),
            round: 0,
            failed_attempts: 0,
            next_event_seq: 0,
            pending_events: EventLog::default(),
            listeners: Listeners::default(),
        }
    }

    // -------------------------------------------------------------------------
    // Read-only accessors
    // -------------------------------------------------------------------------

    /// Current lock state.
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Index of the step being entered (number of finalized steps).
    pub fn current_move_index(&self) -> usize {
        self.input.len()
    }

    /// Current round, starting at 1 after the first `start`.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Failed attempts across the engine's lifetime.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// The secret for this round. `None` while idle.
    pub fn combination(&self) -> Option<&Combination> {
        self.combination.as_ref()
    }

    /// The player's input so far.
    pub fn input(&self) -> &PlayerInput {
        &self.input
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Listener registration
    // -------------------------------------------------------------------------

    /// Called with `(step_index, step)` whenever a notch changes a step.
    pub fn on_move<F>(&mut self, listener: F)
    where
        F: FnMut(usize, Step) + Send + 'static,
    {
        self.listeners.on_move.push(Box::new(listener));
    }

    /// Called once per successful unlock.
    pub fn on_unlock<F>(&mut self, listener: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.listeners.on_unlock.push(Box::new(listener));
    }

    /// Called once per reset, after the new combination is armed.
    pub fn on_reset<F>(&mut self, listener: F)
    where
        F: FnMut(ResetReason) + Send + 'static,
    {
        self.listeners.on_reset.push(Box::new(listener));
    }

    /// Take pending events (consumes them).
    ///
    /// Undrained events are bounded; see [`EventLog`].
    pub fn take_events(&mut self) -> Vec<LockEvent> {
        self.pending_events.drain()
    }

    /// Events waiting in the log.
    pub fn pending_events(&self) -> usize {
        self.pending_events.len()
    }

    /// The random source.
    pub fn rng(&self) -> &R {
        &self.rng
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Deal a new combination and arm the lock.
    ///
    /// Valid in every state. The new combination never equals the old one.
    pub fn start(&mut self) {
        let combination = self
            .config
            .generator
            .generate_distinct(&mut self.rng, self.combination.as_ref());
        self.arm(combination);
    }

    /// Arm the lock with a caller-chosen combination.
    pub fn arm_with(&mut self, combination: Combination) {
        self.arm(combination);
    }

    /// Force a new round. Valid in every state.
    pub fn reset(&mut self) {
        self.reset_with(ResetReason::External);
    }

    /// Force a new round, recording why.
    pub fn reset_with(&mut self, reason: ResetReason) {
        let leaving = self.round;
        self.start();
        self.announce_reset(leaving, reason);
    }

    /// Feed one notch.
    pub fn record_move(&mut self, notch: NotchEvent) -> Result<MoveOutcome, LockError> {
        self.ensure_armed("record_move")?;
        let direction = notch.direction;

        match self.config.step_mode {
            StepMode::PerNotch => {
                let step = Step::new(1, direction);
                self.announce_move(self.input.len(), step);
                Ok(self.commit(step))
            }
            StepMode::AccumulateUntilReverse => {
                let step = match self.input.take_open() {
                    Some(open) if open.direction == direction => {
                        Step::new(open.magnitude.saturating_add(1), direction)
                    }
                    Some(open) => {
                        // Reversal finalizes the open step. If that completes
                        // the input, the reversing notch is consumed by the
                        // evaluation and does not carry into the next round.
                        match self.commit(open) {
                            MoveOutcome::InProgress { .. } => Step::new(1, direction),
                            finished => return Ok(finished),
                        }
                    }
                    None => Step::new(1, direction),
                };

                let index = self.input.len();
                self.input.set_open(Some(step));
                self.announce_move(index, step);
                Ok(MoveOutcome::InProgress { index, step })
            }
        }
    }

    /// Finalize the open step (drag release or Enter).
    pub fn confirm(&mut self) -> Result<MoveOutcome, LockError> {
        self.ensure_armed("confirm")?;
        match self.input.take_open() {
            Some(step) => Ok(self.commit(step)),
            None => Ok(MoveOutcome::NothingToConfirm),
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn ensure_armed(&self, operation: &'static str) -> Result<(), LockError> {
        if self.state.accepts_moves() {
            return Ok(());
        }
        debug!("{} ignored while {}", operation, self.state);
        Err(LockError::InvalidTransition { operation, state: self.state })
    }

    fn arm(&mut self, combination: Combination) {
        self.round += 1;
        self.input.clear();

        let fingerprint = combination.fingerprint();
        info!(
            "Round {} armed: {} steps, secret {}",
            self.round,
            combination.len(),
            short_hex(&fingerprint)
        );
        #[cfg(feature = "debug-tracing")]
        tracing::trace!("Round {} secret: {}", self.round, combination);

        let length = combination.len();
        self.combination = Some(combination);
        self.transition(LockState::Armed);
        self.push_event(LockEventData::Armed { length, fingerprint });
    }

    fn commit(&mut self, step: Step) -> MoveOutcome {
        let index = self.input.len();
        self.input.push(step);
        self.push_event(LockEventData::StepCommitted { index, step });
        debug!("Step {} committed: {}", index, step);

        let required = self.combination.as_ref().map_or(0, Combination::len);
        if self.input.len() < required {
            return MoveOutcome::InProgress { index, step };
        }
        self.evaluate()
    }

    fn evaluate(&mut self) -> MoveOutcome {
        self.transition(LockState::Evaluating);
        let entered = self.input.take_committed();

        let matched = self
            .combination
            .as_ref()
            .is_some_and(|secret| self.config.match_policy.matches(secret, &entered));

        if matched {
            self.transition(LockState::Unlocked);
            info!("Round {} unlocked after {} failed attempt(s)", self.round, self.failed_attempts);
            self.push_event(LockEventData::Unlocked { failed_attempts: self.failed_attempts });
            for listener in &mut self.listeners.on_unlock {
                listener();
            }
            MoveOutcome::Unlocked
        } else {
            self.transition(LockState::Failed);
            self.failed_attempts += 1;
            self.reset_with(ResetReason::Mismatch);
            MoveOutcome::Reset
        }
    }

    fn announce_move(&mut self, index: usize, step: Step) {
        self.push_event(LockEventData::Moved { index, step });
        for listener in &mut self.listeners.on_move {
            listener(index, step);
        }
    }

    fn announce_reset(&mut self, leaving: u32, reason: ResetReason) {
        info!("Round {} reset ({:?})", leaving, reason);
        let seq = self.next_seq();
        self.pending_events
            .push(LockEvent::new(seq, leaving, LockEventData::Reset { reason }));
        for listener in &mut self.listeners.on_reset {
            listener(reason);
        }
    }

    fn transition(&mut self, to: LockState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.push_event(LockEventData::StateChanged { from, to });
    }

    fn push_event(&mut self, data: LockEventData) {
        let seq = self.next_seq();
        self.pending_events.push(LockEvent::new(seq, self.round, data));
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_event_seq;
        self.next_event_seq += 1;
        seq
    }
}

impl<R: RandomSource> fmt::Debug for MatchEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchEngine")
            .field("state", &self.state)
            .field("round", &self.round)
            .field("current_move_index", &self.current_move_index())
            .field("failed_attempts", &self.failed_attempts)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn secret() -> Combination {
        Combination::new(vec![Step::cw(3), Step::ccw(5), Step::cw(2)]).unwrap()
    }

    fn armed(config: EngineConfig) -> MatchEngine {
        let mut engine = MatchEngine::new(config, DeterministicRng::new(4242));
        engine.arm_with(secret());
        engine.take_events();
        engine
    }

    /// Enter each step as `magnitude` notches followed by a confirm.
    fn submit(engine: &mut MatchEngine, steps: &[Step]) -> Vec<MoveOutcome> {
        let mut outcomes = Vec::new();
        for step in steps {
            for _ in 0..step.magnitude {
                outcomes.push(engine.record_move(NotchEvent::new(step.direction)).unwrap());
            }
            outcomes.push(engine.confirm().unwrap());
        }
        outcomes
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (count, move || {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_idle_until_started() {
        let mut engine = MatchEngine::seeded(1);

        assert_eq!(engine.state(), LockState::Idle);
        assert!(engine.combination().is_none());
        assert_eq!(
            engine.record_move(NotchEvent::cw()),
            Err(LockError::InvalidTransition { operation: "record_move", state: LockState::Idle })
        );

        engine.start();
        assert_eq!(engine.state(), LockState::Armed);
        assert_eq!(engine.combination().map(Combination::len), Some(3));
        assert_eq!(engine.round(), 1);
    }

    #[test]
    fn test_exact_scenario_unlocks_once() {
        let mut engine = armed(EngineConfig::default());
        let (unlocks, listener) = counter();
        engine.on_unlock(listener);

        let outcomes = submit(&mut engine, &[Step::cw(3), Step::ccw(5), Step::cw(2)]);

        assert_eq!(outcomes.last(), Some(&MoveOutcome::Unlocked));
        assert_eq!(engine.state(), LockState::Unlocked);
        assert_eq!(unlocks.load(Ordering::SeqCst), 1);
        assert_eq!(engine.take_events().iter().filter(|e| e.is_unlock()).count(), 1);
    }

    #[test]
    fn test_wrong_direction_resets_once_with_new_secret() {
        let mut engine = armed(EngineConfig::default());
        let resets = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&resets);
        engine.on_reset(move |reason| sink.lock().unwrap().push(reason));

        let outcomes = submit(&mut engine, &[Step::cw(3), Step::cw(5), Step::cw(2)]);

        assert_eq!(outcomes.last(), Some(&MoveOutcome::Reset));
        assert_eq!(engine.state(), LockState::Armed);
        assert_ne!(engine.combination(), Some(&secret()));
        assert_eq!(*resets.lock().unwrap(), vec![ResetReason::Mismatch]);
        assert_eq!(engine.failed_attempts(), 1);
        assert_eq!(engine.current_move_index(), 0);

        let states: Vec<_> = engine
            .take_events()
            .into_iter()
            .filter_map(|e| match e.data {
                LockEventData::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![LockState::Evaluating, LockState::Failed, LockState::Armed]);
    }

    #[test]
    fn test_reversal_finalizes_step() {
        let mut engine = armed(EngineConfig::default());

        for _ in 0..3 {
            engine.record_move(NotchEvent::cw()).unwrap();
        }
        assert_eq!(engine.current_move_index(), 0);

        let outcome = engine.record_move(NotchEvent::ccw()).unwrap();

        assert_eq!(outcome, MoveOutcome::InProgress { index: 1, step: Step::ccw(1) });
        assert_eq!(engine.input().committed(), &[Step::cw(3)]);
    }

    #[test]
    fn test_reversal_into_full_input_evaluates() {
        let mut engine = armed(EngineConfig::default());

        for _ in 0..3 {
            engine.record_move(NotchEvent::cw()).unwrap();
        }
        for _ in 0..5 {
            engine.record_move(NotchEvent::ccw()).unwrap();
        }
        for _ in 0..2 {
            engine.record_move(NotchEvent::cw()).unwrap();
        }
        // Reversing away from the third step finalizes it and unlocks.
        let outcome = engine.record_move(NotchEvent::ccw()).unwrap();

        assert_eq!(outcome, MoveOutcome::Unlocked);
        assert!(engine.input().is_empty());
    }

    #[test]
    fn test_overshoot_allowed_by_default_policy() {
        let mut engine = armed(EngineConfig::default());

        submit(&mut engine, &[Step::cw(4), Step::ccw(8), Step::cw(2)]);

        assert_eq!(engine.state(), LockState::Unlocked);
    }

    #[test]
    fn test_exact_policy_rejects_overshoot() {
        let config = EngineConfig { match_policy: MatchPolicy::Exact, ..EngineConfig::default() };
        let mut engine = armed(config);

        submit(&mut engine, &[Step::cw(4), Step::ccw(5), Step::cw(2)]);

        assert_eq!(engine.state(), LockState::Armed);
        assert_eq!(engine.failed_attempts(), 1);
    }

    #[test]
    fn test_undershoot_never_matches() {
        let mut engine = armed(EngineConfig::default());

        submit(&mut engine, &[Step::cw(3), Step::ccw(4), Step::cw(2)]);

        assert_eq!(engine.failed_attempts(), 1);
    }

    #[test]
    fn test_reversed_order_does_not_unlock() {
        let mut engine = armed(EngineConfig::default());
        let reversed: Vec<Step> = secret().steps().iter().rev().copied().collect();

        submit(&mut engine, &reversed);

        assert_ne!(engine.state(), LockState::Unlocked);
    }

    #[test]
    fn test_per_notch_mode_commits_every_notch() {
        let config = EngineConfig { step_mode: StepMode::PerNotch, ..EngineConfig::default() };
        let mut engine = MatchEngine::new(config, DeterministicRng::new(9));
        engine.arm_with(Combination::new(vec![Step::cw(1), Step::ccw(1), Step::ccw(1)]).unwrap());

        assert_eq!(
            engine.record_move(NotchEvent::cw()).unwrap(),
            MoveOutcome::InProgress { index: 0, step: Step::cw(1) }
        );
        assert_eq!(engine.current_move_index(), 1);
        assert_eq!(engine.confirm().unwrap(), MoveOutcome::NothingToConfirm);
        engine.record_move(NotchEvent::ccw()).unwrap();

        assert_eq!(engine.record_move(NotchEvent::ccw()).unwrap(), MoveOutcome::Unlocked);
    }

    #[test]
    fn test_fourth_move_never_reaches_old_round() {
        let config = EngineConfig { step_mode: StepMode::PerNotch, ..EngineConfig::default() };
        let mut engine = MatchEngine::new(config, DeterministicRng::new(3));
        engine.arm_with(secret());

        for _ in 0..3 {
            engine.record_move(NotchEvent::cw()).unwrap();
        }
        // Third notch evaluated (and failed) the round; input is empty again.
        assert_eq!(engine.round(), 2);
        assert_eq!(engine.current_move_index(), 0);

        engine.record_move(NotchEvent::cw()).unwrap();
        assert_eq!(engine.current_move_index(), 1);
        assert!(engine.input().len() <= engine.combination().map_or(0, Combination::len));
    }

    #[test]
    fn test_moves_ignored_after_unlock() {
        let mut engine = armed(EngineConfig::default());
        submit(&mut engine, &[Step::cw(3), Step::ccw(5), Step::cw(2)]);

        let result = engine.record_move(NotchEvent::cw());

        assert_eq!(
            result,
            Err(LockError::InvalidTransition { operation: "record_move", state: LockState::Unlocked })
        );
        assert!(engine.confirm().is_err());
        assert_eq!(engine.state(), LockState::Unlocked);
    }

    #[test]
    fn test_reset_twice_is_safe() {
        let mut engine = MatchEngine::seeded(77);
        let (resets, mut listener) = counter();
        engine.on_reset(move |_| listener());

        engine.reset();
        let first = engine.combination().cloned();
        engine.reset();

        assert_eq!(engine.state(), LockState::Armed);
        assert_ne!(engine.combination().cloned(), first);
        assert_eq!(engine.round(), 2);
        assert_eq!(resets.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_only_owner_keeps_bounded_log() {
        let mut engine = MatchEngine::seeded(12);
        let (resets, mut listener) = counter();
        engine.on_reset(move |_| listener());

        for _ in 0..crate::EVENT_LOG_CAPACITY {
            engine.reset();
        }

        assert_eq!(resets.load(Ordering::SeqCst), crate::EVENT_LOG_CAPACITY);
        assert_eq!(engine.pending_events(), crate::EVENT_LOG_CAPACITY);
    }

    #[test]
    fn test_reset_replays_after_unlock() {
        let mut engine = armed(EngineConfig::default());
        submit(&mut engine, &[Step::cw(3), Step::ccw(5), Step::cw(2)]);
        engine.take_events();

        engine.reset();

        assert_eq!(engine.state(), LockState::Armed);
        let events = engine.take_events();
        assert_eq!(events.last().and_then(LockEvent::reset_reason), Some(ResetReason::External));
        assert_eq!(events.last().map(|e| e.round), Some(1));
    }

    #[test]
    fn test_move_listener_sees_growing_step() {
        let mut engine = armed(EngineConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.on_move(move |index, step| sink.lock().unwrap().push((index, step)));

        engine.record_move(NotchEvent::cw()).unwrap();
        engine.record_move(NotchEvent::cw()).unwrap();
        engine.record_move(NotchEvent::ccw()).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(0, Step::cw(1)), (0, Step::cw(2)), (1, Step::ccw(1))]
        );
    }

    #[test]
    fn test_event_seq_is_monotonic() {
        let mut engine = MatchEngine::seeded(11);
        engine.start();
        submit(&mut engine, &[Step::cw(1), Step::cw(1), Step::cw(1)]);
        engine.reset();

        let events = engine.take_events();
        assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn test_match_policy_positional() {
        let s = secret();
        assert!(MatchPolicy::Exact.matches(&s, s.steps()));
        assert!(!MatchPolicy::AtLeast.matches(&s, &s.steps()[..2]));
        assert!(!MatchPolicy::AtLeast.step_matches(&Step::cw(2), &Step::ccw(8)));
    }
}
