//! Puzzle Logic Module
//!
//! Everything that decides what the lock does. Deterministic given the
//! seed, the inputs and the elapsed time fed to the session.
//!
//! ## Module Structure
//!
//! - `combination`: Steps, combinations and their generator
//! - `gesture`: Drag and key input to notches
//! - `state`: Lock state and player input
//! - `engine`: The match state machine
//! - `timer`: Periodic round countdown
//! - `events`: Lock events for presentation and replay
//! - `session`: Wires everything to a presenter

pub mod combination;
pub mod gesture;
pub mod state;
pub mod engine;
pub mod timer;
pub mod events;
pub mod session;

// Re-export key types
pub use combination::{Combination, CombinationGenerator, Direction, Step};
pub use gesture::{GestureNormalizer, InputError, KeyInput, NotchEvent};
pub use state::{LockState, PlayerInput, ResetReason};
pub use engine::{EngineConfig, LockError, MatchEngine, MatchPolicy, MoveOutcome, StepMode};
pub use timer::RoundTimer;
pub use events::{EventLog, LockEvent, LockEventData};
pub use session::{Presenter, PuzzleConfig, PuzzleInput, PuzzleSession, RecordedInput, SessionError};
