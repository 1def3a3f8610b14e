//! Async Session Driver
//!
//! Runs a [`PuzzleSession`] on its own tokio task. Any number of producers
//! send inputs through one `mpsc` queue, so every mutation is applied in
//! arrival order by a single owner. A fixed-rate interval feeds wall-clock
//! time to the round timer. Events fan out over a `broadcast` channel.
//!
//! ```text
//!  producers ──mpsc──► ┌──────────────┐ ──broadcast──► subscribers
//!                      │ driver task  │
//!  interval(1/tick) ─► │ PuzzleSession│
//!                      └──────────────┘
//! ```

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::events::LockEvent;
use crate::game::session::{Presenter, PuzzleInput, PuzzleSession, SessionError, SessionSnapshot};
use crate::game::state::LockState;
use crate::TICK_RATE;

/// Driver errors.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver task has stopped
    #[error("driver stopped")]
    Closed,

    /// The driver task panicked or was aborted
    #[error("driver task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Timer updates per second.
    pub tick_rate: u32,
    /// Pending commands before senders wait.
    pub queue_depth: usize,
    /// Events buffered per slow subscriber.
    pub event_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            queue_depth: 64,
            event_capacity: 256,
        }
    }
}

/// Commands accepted by the driver task.
#[derive(Debug)]
pub enum DriverCommand {
    /// Apply an input; the result goes back if a reply channel is given.
    Input(PuzzleInput, Option<oneshot::Sender<Result<(), SessionError>>>),
    /// Report the current snapshot.
    Snapshot(oneshot::Sender<SessionSnapshot>),
    /// Stop the task and hand the session back.
    Shutdown,
}

/// Cloneable handle for talking to a running driver.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    commands: mpsc::Sender<DriverCommand>,
    events: broadcast::Sender<LockEvent>,
}

impl DriverHandle {
    /// Queue an input without waiting for the outcome.
    pub async fn send(&self, input: PuzzleInput) -> Result<(), DriverError> {
        self.commands
            .send(DriverCommand::Input(input, None))
            .await
            .map_err(|_| DriverError::Closed)
    }

    /// Queue an input and wait until it has been applied.
    pub async fn apply(&self, input: PuzzleInput) -> Result<Result<(), SessionError>, DriverError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(DriverCommand::Input(input, Some(tx)))
            .await
            .map_err(|_| DriverError::Closed)?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    /// Current session snapshot.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, DriverError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(DriverCommand::Snapshot(tx))
            .await
            .map_err(|_| DriverError::Closed)?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    /// Ask the driver to stop.
    pub async fn shutdown(&self) -> Result<(), DriverError> {
        self.commands
            .send(DriverCommand::Shutdown)
            .await
            .map_err(|_| DriverError::Closed)
    }

    /// New event subscription. Only sees events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.events.subscribe()
    }
}

/// A spawned driver.
pub struct Driver<P: Presenter> {
    /// Command handle
    pub handle: DriverHandle,
    /// Subscription created before the task started, sees every event
    pub events: broadcast::Receiver<LockEvent>,
    /// Resolves to the session once the driver stops
    pub task: JoinHandle<PuzzleSession<P>>,
}

/// Spawn a driver task owning `session`. An idle session is started.
pub fn spawn<P>(session: PuzzleSession<P>, config: DriverConfig) -> Driver<P>
where
    P: Presenter + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(config.queue_depth.max(1));
    let (event_tx, event_rx) = broadcast::channel(config.event_capacity.max(1));

    let task = tokio::spawn(run(session, command_rx, event_tx.clone(), config.tick_rate));

    Driver {
        handle: DriverHandle { commands: command_tx, events: event_tx },
        events: event_rx,
        task,
    }
}

async fn run<P: Presenter>(
    mut session: PuzzleSession<P>,
    mut commands: mpsc::Receiver<DriverCommand>,
    events: broadcast::Sender<LockEvent>,
    tick_rate: u32,
) -> PuzzleSession<P> {
    if session.state() == LockState::Idle {
        session.start();
    }
    publish(&mut session, &events);

    let tick_duration = Duration::from_micros(1_000_000 / tick_rate.max(1) as u64);
    let mut ticker = interval(tick_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    info!("Driver running at {} Hz", tick_rate);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                session.advance(now - last);
                last = now;
            }
            command = commands.recv() => match command {
                Some(DriverCommand::Input(input, reply)) => {
                    let result = session.apply(input);
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                Some(DriverCommand::Snapshot(reply)) => {
                    let _ = reply.send(session.snapshot());
                }
                Some(DriverCommand::Shutdown) | None => {
                    publish(&mut session, &events);
                    break;
                }
            },
        }
        publish(&mut session, &events);
    }

    info!("Driver stopped at round {}", session.engine().round());
    session
}

fn publish<P: Presenter>(session: &mut PuzzleSession<P>, events: &broadcast::Sender<LockEvent>) {
    for event in session.take_events() {
        debug!("Publishing event {} ({:?})", event.seq, event.data);
        if events.send(event).is_err() {
            warn!("Event dropped: no subscribers");
        }
    }
}
