//! Vault Dial
//!
//! Headless demo of the combination-lock puzzle: solves a round with drag
//! input, fails one with keys, checks replay determinism, then runs the
//! same session through the async driver.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vault_dial::{
    VERSION, TICK_RATE,
    core::{hash::short_hex, rng::derive_puzzle_seed},
    driver::{self, DriverConfig},
    game::{
        events::LockEventData,
        gesture::KeyInput,
        session::{replay_round, PuzzleConfig, PuzzleInput, PuzzleSession},
        state::LockState,
        Direction,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Vault Dial v{}", VERSION);

    let config = load_config()?;
    info!(
        "Combination: {} steps, magnitudes {}..={}, {:?}/{:?}",
        config.combination_length,
        config.magnitude_min,
        config.magnitude_max,
        config.step_mode,
        config.match_policy
    );

    let puzzle_id = *uuid::Uuid::new_v4().as_bytes();
    let seed = derive_puzzle_seed(&puzzle_id, 0);
    info!("Puzzle ID: {}", hex::encode(puzzle_id));

    demo_session(&config, seed)?;
    demo_driver(config, seed).await?;
    Ok(())
}

/// Config from the JSON file named by the first argument, or defaults.
fn load_config() -> Result<PuzzleConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            PuzzleConfig::from_json_str(&json).with_context(|| format!("parsing config {path}"))
        }
        None => Ok(PuzzleConfig::default()),
    }
}

/// Solve one round by dragging, fail one with keys, then verify replay.
fn demo_session(config: &PuzzleConfig, seed: u64) -> Result<()> {
    info!("=== Session Demo ===");

    let config = PuzzleConfig { record_inputs: true, ..config.clone() };
    let mut session = PuzzleSession::new(config.clone(), seed)?;
    session.start();
    session.on_timeout(|| warn!("Round timer ran out"));

    let threshold = config.notch_threshold;
    let secret = session
        .engine()
        .combination()
        .cloned()
        .context("session started without a combination")?;
    info!("Dialing {} steps by drag", secret.len());

    for step in secret.steps() {
        feed(&mut session, PuzzleInput::DragStart(0.0));
        let end = step.direction.sign() as f64 * threshold * step.magnitude as f64;
        feed(&mut session, PuzzleInput::DragMove(end));
        session.advance(Duration::from_millis(400));
        feed(&mut session, PuzzleInput::DragEnd);
    }
    if session.state() != LockState::Unlocked {
        warn!("Dialing the secret did not open the vault");
    }

    // Let the vault relock, then dial everything clockwise by key
    session.advance(Duration::from_millis(config.relock_after_ms.unwrap_or(0)));
    for _ in 0..config.combination_length {
        feed(&mut session, PuzzleInput::Key(KeyInput::RotateClockwise));
        feed(&mut session, PuzzleInput::Key(KeyInput::Confirm));
    }

    for event in session.take_events() {
        match event.data {
            LockEventData::Armed { fingerprint, .. } => {
                info!("Round {} armed ({})", event.round, short_hex(&fingerprint));
            }
            LockEventData::Unlocked { failed_attempts } => {
                info!("Round {} unlocked ({} failed attempts)", event.round, failed_attempts);
            }
            LockEventData::Reset { reason } => info!("Round {} reset: {:?}", event.round, reason),
            _ => {}
        }
    }

    let live_hash = session.compute_hash();
    info!("Session hash: {}", hex::encode(live_hash));

    info!("=== Verifying Determinism ===");
    let replay = replay_round(config, seed, session.recording())?;
    info!("Replay hash:  {}", hex::encode(replay.hash));

    if replay.hash == live_hash {
        info!("DETERMINISM VERIFIED: Hashes match!");
    } else {
        warn!("DETERMINISM FAILURE: Hashes differ!");
    }
    Ok(())
}

/// Apply an input, logging rejections instead of stopping the demo.
fn feed(session: &mut PuzzleSession, input: PuzzleInput) {
    if let Err(err) = session.apply(input) {
        warn!("{:?} rejected: {}", input, err);
    }
}

/// Run a fresh session on the async driver and watch it for a moment.
async fn demo_driver(config: PuzzleConfig, seed: u64) -> Result<()> {
    info!("=== Driver Demo ({} Hz) ===", TICK_RATE);

    let session = PuzzleSession::new(config, seed.wrapping_add(1))?;
    let mut driver = driver::spawn(session, DriverConfig::default());

    let handle = driver.handle.clone();
    let producer = tokio::spawn(async move {
        for direction in [Direction::Clockwise, Direction::CounterClockwise, Direction::Clockwise] {
            handle.send(PuzzleInput::Key(KeyInput::rotate(direction))).await?;
            handle.send(PuzzleInput::Key(KeyInput::Confirm)).await?;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok::<_, driver::DriverError>(())
    });
    producer.await??;

    let snapshot = driver.handle.snapshot().await?;
    info!(
        "Driver snapshot: round {}, {}, handle at {} degrees",
        snapshot.round, snapshot.state, snapshot.handle_degrees
    );

    driver.handle.shutdown().await?;
    let session = driver.task.await?;

    let mut published = 0;
    while driver.events.try_recv().is_ok() {
        published += 1;
    }
    info!("Driver published {} events, final round {}", published, session.engine().round());
    Ok(())
}
