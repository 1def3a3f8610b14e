//! Q16.16 Fixed-Point Arithmetic
//!
//! Pointer positions arrive as floats from the input source. They are
//! converted to fixed point once, at the gesture boundary, so notch
//! quantization is integer-only and replays identically everywhere.
//!
//! ## Format: Q16.16
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bit Layout: Q16.16 (32-bit signed integer)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  [S][IIIIIIIIIIIIIIII][FFFFFFFFFFFFFFFF]                    │
//! │   │  └──── 16 bits ────┘└──── 16 bits ────┘                 │
//! │   └─ Sign bit                                               │
//! │                                                             │
//! │  Range: -32768.0 to +32767.99998 (approx)                   │
//! │  Precision: 1/65536 ≈ 0.000015 units                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! 32k units covers any realistic screen coordinate.

/// Q16.16 fixed-point number stored as i32.
/// 16 bits integer, 16 bits fractional.
pub type Fixed = i32;

/// Number of fractional bits (16)
pub const FIXED_SCALE: i32 = 16;

/// 1.0 in fixed-point (65536)
pub const FIXED_ONE: Fixed = 1 << FIXED_SCALE; // 65536

/// Largest magnitude (in units) accepted from the input source.
pub const MAX_INPUT_UNITS: f64 = 32767.0;

// =============================================================================
// DIAL CONSTANTS (All as integer literals - NO float conversion!)
// =============================================================================

/// Default drag distance for one notch: 60.0 units = 60 * 65536
pub const NOTCH_THRESHOLD: Fixed = 3932160;

/// Handle rotation per notch, in degrees.
pub const NOTCH_DEGREES: i32 = 60;

// =============================================================================
// CORE OPERATIONS
// =============================================================================

/// Convert a compile-time float to fixed-point.
///
/// # Warning
/// Only use at compile-time or for trusted values. Untrusted input goes
/// through [`try_to_fixed`].
///
/// # Example
/// ```
/// use vault_dial::core::fixed::{to_fixed, FIXED_ONE};
/// const MY_VALUE: i32 = to_fixed(2.5);
/// assert_eq!(MY_VALUE, FIXED_ONE * 2 + FIXED_ONE / 2);
/// ```
#[inline]
pub const fn to_fixed(f: f64) -> Fixed {
    (f * (FIXED_ONE as f64)) as Fixed
}

/// Convert an untrusted float to fixed-point.
///
/// Returns `None` for NaN, infinities and values outside the Q16.16 range.
#[inline]
pub fn try_to_fixed(f: f64) -> Option<Fixed> {
    if !f.is_finite() || f.abs() > MAX_INPUT_UNITS {
        return None;
    }
    Some(to_fixed(f))
}

/// Convert fixed-point to float for display/rendering.
///
/// # Warning
/// Only use for visual output. NEVER feed the result back into quantization.
#[inline]
pub fn to_float(f: Fixed) -> f32 {
    f as f32 / FIXED_ONE as f32
}

/// Absolute value of a fixed-point number.
#[inline]
pub fn fixed_abs(x: Fixed) -> Fixed {
    if x < 0 { x.wrapping_neg() } else { x }
}

/// Number of whole `step`s contained in `|value|`.
///
/// Takes a widened value because the difference of two in-range
/// positions can exceed `i32`. Truncates toward zero. Returns 0 for a
/// non-positive step.
#[inline]
pub fn whole_steps(value: i64, step: Fixed) -> u32 {
    if step <= 0 {
        return 0;
    }
    (value.abs() / step as i64) as u32
}

// =============================================================================
// TESTS
// =============================================================================
