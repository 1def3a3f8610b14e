//! Deterministic Random Number Generation
//!
//! Combination generation never reaches for a process-wide generator.
//! Every draw goes through a [`RandomSource`] handed in by the caller, and
//! the crate ships [`DeterministicRng`] (Xorshift128+) as the default source
//! so a puzzle seeded with the same value deals the same secrets on every
//! platform.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Source of randomness for combination generation.
///
/// Only `next_u64` is required; the bounded helpers are derived from it.
pub trait RandomSource {
    /// Generate the next 64-bit random value.
    fn next_u64(&mut self) -> u64;

    /// Generate a random integer in range [0, max).
    ///
    /// Returns 0 when `max == 0`.
    fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - bias is negligible for the tiny ranges used here
        (self.next_u64() % max as u64) as u32
    }

    /// Generate a random integer in range [min, max].
    fn next_int_range(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        let range = max - min + 1;
        min + self.next_int(range)
    }

    /// Fair coin flip.
    fn next_coin(&mut self) -> bool {
        self.next_u64() >> 63 == 1
    }
}

impl<R: RandomSource + ?Sized> RandomSource for Box<R> {
    fn next_u64(&mut self) -> u64 {
        (**self).next_u64()
    }
}

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Determinism Guarantee
///
/// Given the same seed, this RNG will produce the exact same sequence
/// of random numbers on any platform.
///
/// # Example
///
/// ```
/// use vault_dial::core::rng::{DeterministicRng, RandomSource};
///
/// let mut rng = DeterministicRng::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541); // Always the same!
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Xorshift must never run from an all-zero state
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create an RNG for a puzzle instance.
    ///
    /// See [`derive_puzzle_seed`].
    pub fn for_puzzle(puzzle_id: &[u8; 16], salt: u64) -> Self {
        Self::new(derive_puzzle_seed(puzzle_id, salt))
    }

    /// Current internal state. Two generators with equal state produce
    /// the same sequence from here on.
    pub fn state(&self) -> [u64; 2] {
        self.state
    }
}

impl RandomSource for DeterministicRng {
    #[inline]
    fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a puzzle seed from its identifier and a caller-chosen salt.
///
/// The same `(puzzle_id, salt)` pair always yields the same seed, so a
/// recorded session can be replayed from its id alone.
pub fn derive_puzzle_seed(puzzle_id: &[u8; 16], salt: u64) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"VAULT_DIAL_SEED_V1");
    hasher.update(puzzle_id);
    hasher.update(salt.to_le_bytes());

    let hash = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(seed)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(54321);

        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_rng_known_values() {
        let mut rng = DeterministicRng::new(42);

        // Changing these breaks every recorded session replay.
        assert_eq!(rng.next_u64(), 16629283624882167704);
        assert_eq!(rng.next_u64(), 1420492921613871959);
        assert_eq!(rng.next_u64(), 9768315062676884790);
    }

    #[test]
    fn test_next_int_range() {
        let mut rng = DeterministicRng::new(5678);

        for _ in 0..1000 {
            let val = rng.next_int_range(1, 8);
            assert!((1..=8).contains(&val));
        }

        assert_eq!(rng.next_int_range(5, 5), 5);
        assert_eq!(rng.next_int(0), 0);
        assert_eq!(rng.next_int(1), 0);
    }

    #[test]
    fn test_next_coin_hits_both_sides() {
        let mut rng = DeterministicRng::new(99);
        let heads = (0..1000).filter(|_| rng.next_coin()).count();

        assert!(heads > 400 && heads < 600, "coin is badly skewed: {heads}");
    }

    #[test]
    fn test_boxed_source_delegates() {
        let mut direct = DeterministicRng::new(7);
        let mut boxed: Box<dyn RandomSource> = Box::new(DeterministicRng::new(7));

        for _ in 0..10 {
            assert_eq!(boxed.next_u64(), direct.next_u64());
        }
    }

    #[test]
    fn test_derive_puzzle_seed() {
        let puzzle = [1u8; 16];

        assert_eq!(derive_puzzle_seed(&puzzle, 0), derive_puzzle_seed(&puzzle, 0));
        assert_ne!(derive_puzzle_seed(&puzzle, 0), derive_puzzle_seed(&puzzle, 1));
        assert_ne!(derive_puzzle_seed(&puzzle, 0), derive_puzzle_seed(&[2u8; 16], 0));
    }

    #[test]
    fn test_state_tracks_draws() {
        let mut a = DeterministicRng::new(5555);
        let mut b = DeterministicRng::new(5555);
        for _ in 0..50 {
            a.next_u64();
        }

        assert_ne!(a.state(), b.state());
        for _ in 0..50 {
            b.next_u64();
        }
        assert_eq!(a.state(), b.state());
        assert_eq!(a.next_u64(), b.next_u64());
    }
}
