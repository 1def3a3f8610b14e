//! Core deterministic primitives.
//!
//! Everything the dial logic needs to behave identically on every replay:
//! fixed-point positions, a seeded PRNG and domain-separated hashing.

pub mod fixed;
pub mod rng;
pub mod hash;

// Re-export core types
pub use fixed::{Fixed, FIXED_ONE, FIXED_SCALE, NOTCH_THRESHOLD};
pub use rng::{DeterministicRng, RandomSource};
pub use hash::{StateHash, StateHasher, compute_session_hash};
