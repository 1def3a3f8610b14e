//! Secret Combinations
//!
//! A combination is a short ordered list of [`Step`]s the player has to dial
//! in. Generation is a pure function of the injected [`RandomSource`].

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::hash::{StateHash, StateHasher};
use crate::core::rng::RandomSource;
use crate::game::engine::LockError;
use crate::{COMBINATION_LENGTH, MAGNITUDE_MAX, MAGNITUDE_MIN};

// =============================================================================
// DIRECTION
// =============================================================================

/// Rotation direction of the handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// Clockwise (pointer moving right, `ArrowRight`)
    Clockwise = 0,
    /// Counter-clockwise (pointer moving left, `ArrowLeft`)
    CounterClockwise = 1,
}

impl Direction {
    /// Direction of a signed delta. Zero has no direction.
    #[inline]
    pub fn from_sign(value: i32) -> Option<Self> {
        match value.signum() {
            1 => Some(Direction::Clockwise),
            -1 => Some(Direction::CounterClockwise),
            _ => None,
        }
    }

    /// +1 for clockwise, -1 for counter-clockwise.
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Direction::Clockwise => 1,
            Direction::CounterClockwise => -1,
        }
    }

    /// The other direction.
    #[inline]
    pub fn reversed(self) -> Self {
        match self {
            Direction::Clockwise => Direction::CounterClockwise,
            Direction::CounterClockwise => Direction::Clockwise,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Clockwise => f.write_str("CW"),
            Direction::CounterClockwise => f.write_str("CCW"),
        }
    }
}

// =============================================================================
// STEP
// =============================================================================

/// One element of a combination or of the player's input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Step {
    /// Number of notches
    pub magnitude: u8,
    /// Rotation direction
    pub direction: Direction,
}

impl Step {
    /// Create a step.
    pub const fn new(magnitude: u8, direction: Direction) -> Self {
        Self { magnitude, direction }
    }

    /// Clockwise step.
    pub const fn cw(magnitude: u8) -> Self {
        Self::new(magnitude, Direction::Clockwise)
    }

    /// Counter-clockwise step.
    pub const fn ccw(magnitude: u8) -> Self {
        Self::new(magnitude, Direction::CounterClockwise)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.direction)
    }
}

// =============================================================================
// COMBINATION
// =============================================================================

/// Ordered, non-empty sequence of steps.
///
/// Immutable: a new round gets a new `Combination`, never an edited one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combination(Vec<Step>);

impl Combination {
    /// Build a combination from explicit steps.
    pub fn new(steps: Vec<Step>) -> Result<Self, LockError> {
        if steps.is_empty() {
            return Err(LockError::EmptyCombination);
        }
        Ok(Self(steps))
    }

    /// Number of steps (always at least 1).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Steps in order.
    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    /// Step at `index`.
    pub fn get(&self, index: usize) -> Option<&Step> {
        self.0.get(index)
    }

    /// True if the sequence reads the same in both directions.
    pub fn is_palindrome(&self) -> bool {
        self.0.iter().eq(self.0.iter().rev())
    }

    /// Hash of the secret, safe to log.
    pub fn fingerprint(&self) -> StateHash {
        let mut hasher = StateHasher::for_combination();
        hasher.update_u32(self.0.len() as u32);
        for step in &self.0 {
            hasher.update_u8(step.magnitude);
            hasher.update_u8(step.direction as u8);
        }
        hasher.finalize()
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for step in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{step}")?;
            first = false;
        }
        Ok(())
    }
}

// =============================================================================
// GENERATOR
// =============================================================================

/// Draws random combinations.
///
/// Holds no randomness itself; every call borrows the caller's source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinationGenerator {
    /// Steps per combination
    pub length: usize,
    /// Smallest magnitude (inclusive)
    pub magnitude_min: u8,
    /// Largest magnitude (inclusive)
    pub magnitude_max: u8,
}

impl Default for CombinationGenerator {
    fn default() -> Self {
        Self {
            length: COMBINATION_LENGTH,
            magnitude_min: MAGNITUDE_MIN,
            magnitude_max: MAGNITUDE_MAX,
        }
    }
}

impl CombinationGenerator {
    /// Generator with a custom length and the default magnitude range.
    pub fn with_length(length: usize) -> Self {
        Self { length, ..Self::default() }
    }

    /// Draw a fresh combination.
    ///
    /// A zero length is clamped to one so the result is never empty.
    pub fn generate<R: RandomSource + ?Sized>(&self, rng: &mut R) -> Combination {
        let length = self.length.max(1);
        let min = self.magnitude_min.max(1);
        let max = self.magnitude_max.max(min);

        let steps = (0..length)
            .map(|_| {
                let magnitude = rng.next_int_range(min as u32, max as u32) as u8;
                let direction = if rng.next_coin() {
                    Direction::Clockwise
                } else {
                    Direction::CounterClockwise
                };
                Step::new(magnitude, direction)
            })
            .collect();

        Combination(steps)
    }

    /// Draw a combination different from `previous`.
    ///
    /// Directions alone give at least two candidates per step, so the loop
    /// terminates.
    pub fn generate_distinct<R: RandomSource + ?Sized>(
        &self,
        rng: &mut R,
        previous: Option<&Combination>,
    ) -> Combination {
        loop {
            let candidate = self.generate(rng);
            if previous != Some(&candidate) {
                return candidate;
            }
        }
    }

    /// True if `step` could have been produced by this generator.
    pub fn accepts(&self, step: &Step) -> bool {
        (self.magnitude_min..=self.magnitude_max).contains(&step.magnitude)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;
    use proptest::prelude::*;

    /// Source that replays a fixed script of raw values.
    struct Scripted(Vec<u64>, usize);

    impl RandomSource for Scripted {
        fn next_u64(&mut self) -> u64 {
            let value = self.0[self.1 % self.0.len()];
            self.1 += 1;
            value
        }
    }

    #[test]
    fn test_direction_sign() {
        assert_eq!(Direction::from_sign(5), Some(Direction::Clockwise));
        assert_eq!(Direction::from_sign(-1), Some(Direction::CounterClockwise));
        assert_eq!(Direction::from_sign(0), None);
        assert_eq!(Direction::Clockwise.sign(), 1);
        assert_eq!(Direction::Clockwise.reversed(), Direction::CounterClockwise);
    }

    #[test]
    fn test_empty_combination_rejected() {
        assert!(matches!(Combination::new(vec![]), Err(LockError::EmptyCombination)));
        assert!(Combination::new(vec![Step::cw(1)]).is_ok());
    }

    #[test]
    fn test_generate_default_shape() {
        let mut rng = DeterministicRng::new(12345);
        let generator = CombinationGenerator::default();

        for _ in 0..500 {
            let combo = generator.generate(&mut rng);
            assert_eq!(combo.len(), 3);
            for step in combo.steps() {
                assert!((1..=8).contains(&step.magnitude));
            }
        }
    }

    #[test]
    fn test_generate_is_deterministic() {
        let generator = CombinationGenerator::default();
        let a = generator.generate(&mut DeterministicRng::new(77));
        let b = generator.generate(&mut DeterministicRng::new(77));

        assert_eq!(a, b);
    }

    #[test]
    fn test_generate_follows_injected_source() {
        // 0 % 8 -> magnitude 1, high bit clear -> CCW
        // 7 % 8 -> magnitude 8, high bit set -> CW
        let mut source = Scripted(vec![0, 0, 7, u64::MAX, 0, 0], 0);
        let combo = CombinationGenerator::default().generate(&mut source);

        assert_eq!(combo.steps(), &[Step::ccw(1), Step::cw(8), Step::ccw(1)]);
    }

    #[test]
    fn test_zero_length_never_empty() {
        let mut rng = DeterministicRng::new(1);
        let combo = CombinationGenerator::with_length(0).generate(&mut rng);

        assert_eq!(combo.len(), 1);
    }

    #[test]
    fn test_generate_distinct_rerolls() {
        // First draw repeats `previous`; the second differs.
        let mut source = Scripted(vec![0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0], 0);
        let generator = CombinationGenerator::default();
        let previous = Combination::new(vec![Step::ccw(1); 3]).unwrap();

        let next = generator.generate_distinct(&mut source, Some(&previous));

        assert_ne!(next, previous);
        assert_eq!(next.steps()[0], Step::ccw(2));
    }

    #[test]
    fn test_palindrome() {
        let palindrome = Combination::new(vec![Step::cw(2), Step::ccw(4), Step::cw(2)]).unwrap();
        let plain = Combination::new(vec![Step::cw(3), Step::ccw(5), Step::cw(2)]).unwrap();

        assert!(palindrome.is_palindrome());
        assert!(!plain.is_palindrome());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Combination::new(vec![Step::cw(3), Step::ccw(5), Step::cw(2)]).unwrap();
        let b = Combination::new(vec![Step::cw(3), Step::cw(5), Step::cw(2)]).unwrap();

        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.to_string(), "3CW 5CCW 2CW");
    }

    proptest! {
        #[test]
        fn prop_generated_steps_in_range(seed in any::<u64>(), length in 1usize..6, min in 1u8..5, span in 0u8..5) {
            let generator = CombinationGenerator {
                length,
                magnitude_min: min,
                magnitude_max: min + span,
            };
            let combo = generator.generate(&mut DeterministicRng::new(seed));

            prop_assert_eq!(combo.len(), length);
            for step in combo.steps() {
                prop_assert!(generator.accepts(step));
            }
        }
    }
}
