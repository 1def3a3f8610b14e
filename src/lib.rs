//! # Vault Dial
//!
//! Combination-lock puzzle: a secret sequence of rotations is dealt, the
//! player dials it in by dragging a handle or pressing keys, and the vault
//! opens or re-arms with a new secret.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        VAULT DIAL                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Deterministic primitives                │
//! │  ├── fixed.rs      - Q16.16 fixed-point arithmetic           │
//! │  ├── rng.rs        - RandomSource + Xorshift128+ PRNG        │
//! │  └── hash.rs       - SHA-256 fingerprints and session hash   │
//! │                                                              │
//! │  game/             - Puzzle logic (deterministic)            │
//! │  ├── combination.rs- Steps and combination generator         │
//! │  ├── gesture.rs    - Drag/key input to notches               │
//! │  ├── engine.rs     - Match state machine                     │
//! │  ├── timer.rs      - Round countdown                         │
//! │  └── session.rs    - Integration with a presenter            │
//! │                                                              │
//! │  driver.rs         - Async task owning a session (tokio)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are deterministic:
//! - Pointer positions are converted to fixed point once, at the boundary
//! - All randomness comes from an injected, seeded source
//! - Time only moves when the caller advances it
//!
//! Given the same seed and the same timed inputs, a session produces the
//! same events and the same final hash.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod driver;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_ONE, FIXED_SCALE};
pub use core::rng::{DeterministicRng, RandomSource};
pub use game::combination::{Combination, CombinationGenerator, Direction, Step};
pub use game::engine::{LockError, MatchEngine};
pub use game::session::{PuzzleConfig, PuzzleSession};
pub use game::state::LockState;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Driver tick rate (Hz)
pub const TICK_RATE: u32 = 60;

/// Steps per combination
pub const COMBINATION_LENGTH: usize = 3;

/// Smallest step magnitude
pub const MAGNITUDE_MIN: u8 = 1;

/// Largest step magnitude
pub const MAGNITUDE_MAX: u8 = 8;

/// Round length (30 seconds)
pub const ROUND_DURATION_MS: u64 = 30_000;

/// Time an opened vault stays open (5 seconds)
pub const RELOCK_AFTER_MS: u64 = 5_000;

/// Undrained events kept per engine or session
pub const EVENT_LOG_CAPACITY: usize = 1024;
