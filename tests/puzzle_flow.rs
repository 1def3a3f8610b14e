//! End-to-end puzzle flows through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::{rngs::StdRng, RngCore, SeedableRng};

use vault_dial::game::engine::{EngineConfig, MoveOutcome};
use vault_dial::game::gesture::{GestureNormalizer, NotchEvent};
use vault_dial::game::session::{replay_round, PuzzleInput, RecordedInput};
use vault_dial::game::{KeyInput, ResetReason};
use vault_dial::{
    Combination, CombinationGenerator, Direction, LockState, MatchEngine, PuzzleConfig,
    PuzzleSession, RandomSource, Step,
};

/// `rand`'s generator behind the crate's randomness seam.
struct StdSource(StdRng);

impl RandomSource for StdSource {
    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }
}

fn secret() -> Combination {
    Combination::new(vec![Step::cw(3), Step::ccw(5), Step::cw(2)]).unwrap()
}

#[test]
fn test_external_rng_drives_generation() {
    let generator = CombinationGenerator::default();
    let mut source = StdSource(StdRng::seed_from_u64(7));

    for _ in 0..200 {
        let combo = generator.generate(&mut source);
        assert_eq!(combo.len(), 3);
        assert!(combo.steps().iter().all(|s| (1..=8).contains(&s.magnitude)));
    }
}

#[test]
fn test_engine_with_external_rng() {
    let mut engine = MatchEngine::new(EngineConfig::default(), StdSource(StdRng::seed_from_u64(1)));
    engine.start();
    let dealt = engine.combination().cloned().unwrap();

    for step in dealt.steps() {
        for _ in 0..step.magnitude {
            engine.record_move(NotchEvent::new(step.direction)).unwrap();
        }
        engine.confirm().unwrap();
    }

    assert_eq!(engine.state(), LockState::Unlocked);
}

#[test]
fn test_gesture_to_engine_pipeline() {
    let mut gesture = GestureNormalizer::default();
    let mut engine = MatchEngine::seeded(3);
    engine.arm_with(secret());

    let unlocks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&unlocks);
    engine.on_unlock(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // One continuous drag: right 3, left 5, right 2, then release.
    gesture.on_drag_start(0.0).unwrap();
    let mut outcome = None;
    for x in [180.0, -120.0, 0.0] {
        for notch in gesture.on_drag_move(x).unwrap() {
            outcome = Some(engine.record_move(notch).unwrap());
        }
    }
    gesture.on_drag_end();
    let last = engine.confirm().unwrap();

    assert!(matches!(outcome, Some(MoveOutcome::InProgress { index: 2, .. })));
    assert_eq!(last, MoveOutcome::Unlocked);
    assert_eq!(unlocks.load(Ordering::SeqCst), 1);
}

#[test]
fn test_timeout_then_solve_with_keys() {
    let config = PuzzleConfig { round_duration_ms: Some(1000), ..PuzzleConfig::default() };
    let mut session = PuzzleSession::new(config, 55).unwrap();
    session.start();
    let first = session.engine().combination().cloned().unwrap();

    session.advance(Duration::from_millis(1000));

    assert_eq!(session.state(), LockState::Armed);
    let second = session.engine().combination().cloned().unwrap();
    assert_ne!(first, second);
    let reasons: Vec<_> = session.take_events().iter().filter_map(|e| e.reset_reason()).collect();
    assert_eq!(reasons, vec![ResetReason::Timeout]);

    for step in second.steps() {
        for _ in 0..step.magnitude {
            session.apply(PuzzleInput::Key(KeyInput::rotate(step.direction))).unwrap();
        }
        session.apply(PuzzleInput::Key(KeyInput::Confirm)).unwrap();
    }
    assert_eq!(session.state(), LockState::Unlocked);

    // Open vault ignores the round timer entirely.
    session.advance(Duration::from_millis(4000));
    assert_eq!(session.state(), LockState::Unlocked);
}

#[test]
fn test_replay_from_serialized_recording() {
    let config = PuzzleConfig { record_inputs: true, ..PuzzleConfig::default() };
    let mut session = PuzzleSession::new(config.clone(), 808).unwrap();
    session.start();

    session.apply(PuzzleInput::DragStart(10.0)).unwrap();
    session.advance(Duration::from_millis(120));
    session.apply(PuzzleInput::DragMove(200.0)).unwrap();
    session.apply(PuzzleInput::DragEnd).unwrap();
    session.advance(Duration::from_millis(80));
    session.apply(PuzzleInput::Replay).unwrap();
    session.apply(PuzzleInput::Key(KeyInput::RotateCounterClockwise)).unwrap();

    let json = serde_json::to_string(session.recording()).unwrap();
    let inputs: Vec<RecordedInput> = serde_json::from_str(&json).unwrap();
    let outcome = replay_round(config, 808, &inputs).unwrap();

    assert_eq!(inputs.len(), 7);
    assert!(json.contains(r#""kind":"advance""#));
    assert_eq!(outcome.hash, session.compute_hash());
    assert_eq!(outcome.state, session.state());
    assert_eq!(outcome.events, session.take_events());
}

#[test]
fn test_different_seeds_deal_different_rounds() {
    let deal = |seed| {
        let mut session = PuzzleSession::new(PuzzleConfig::default(), seed).unwrap();
        session.start();
        (0..5)
            .map(|_| {
                session.apply(PuzzleInput::Replay).unwrap();
                session.engine().combination().cloned().unwrap()
            })
            .collect::<Vec<_>>()
    };

    assert_eq!(deal(1), deal(1));
    assert_ne!(deal(1), deal(2));
}

#[test]
fn test_reversed_submission_needs_palindrome() {
    let mut engine = MatchEngine::seeded(10);
    engine.arm_with(secret());

    for step in secret().steps().iter().rev() {
        for _ in 0..step.magnitude {
            engine.record_move(NotchEvent::new(step.direction)).unwrap();
        }
        engine.confirm().unwrap();
    }

    assert_ne!(engine.state(), LockState::Unlocked);
    assert_eq!(Direction::Clockwise.reversed().reversed(), Direction::Clockwise);
}
