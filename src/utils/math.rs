//! Mathematical utility functions.
//!
//! Overflow reasoning in the optimizer never happens in 32-bit arithmetic: bounds
//! are widened to `i64`, combined there, and only narrowed back once they are known
//! to fit.

/// Narrows a widened value back to `i32` if it fits.
///
/// # Examples
///
/// ```rust
/// use seaopt::utils::narrow_i32;
///
/// assert_eq!(narrow_i32(i64::from(i32::MAX)), Some(i32::MAX));
/// assert_eq!(narrow_i32(i64::from(i32::MAX) + 1), None);
/// ```
#[must_use]
pub fn narrow_i32(value: i64) -> Option<i32> {
    i32::try_from(value).ok()
}

/// Returns `true` if the widened value is representable as `i32`.
#[must_use]
pub fn fits_i32(value: i64) -> bool {
    narrow_i32(value).is_some()
}

/// Ceiling division for a non-negative dividend and a positive divisor.
///
/// # Arguments
///
/// * `dividend` - Value to divide, must be `>= 0`
/// * `divisor` - Value to divide by, must be `> 0`
///
/// # Returns
///
/// `ceil(dividend / divisor)`.
#[must_use]
pub fn ceil_div(dividend: i64, divisor: i64) -> i64 {
    debug_assert!(dividend >= 0 && divisor > 0);
    (dividend + divisor - 1) / divisor
}

/// Checks if a value is a power of two and returns the exponent.
///
/// Returns `Some(n)` if `value == 2^n`, `None` otherwise.
/// Only works for positive values.
///
/// # Examples
///
/// ```rust
/// use seaopt::utils::is_power_of_two;
///
/// assert_eq!(is_power_of_two(1), Some(0));   // 2^0 = 1
/// assert_eq!(is_power_of_two(8), Some(3));   // 2^3 = 8
/// assert_eq!(is_power_of_two(0), None);
/// assert_eq!(is_power_of_two(-8), None);
/// assert_eq!(is_power_of_two(6), None);
/// ```
#[must_use]
#[allow(clippy::cast_sign_loss)] // value > 0 verified above
#[allow(clippy::cast_possible_truncation)] // trailing_zeros <= 63 for u64
pub fn is_power_of_two(value: i64) -> Option<u8> {
    if value <= 0 {
        return None;
    }
    let value = value as u64;
    if value.is_power_of_two() {
        Some(value.trailing_zeros() as u8)
    } else {
        None
    }
}

/// Smallest all-ones mask (`2^k - 1`) covering a non-negative value.
///
/// Used to bound the result of bitwise `or`/`xor` on non-negative ranges.
#[must_use]
pub fn covering_mask(value: i32) -> i32 {
    debug_assert!(value >= 0);
    if value == 0 {
        0
    } else {
        let bits = 32 - value.leading_zeros();
        ((1i64 << bits) - 1) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_power_of_two() {
        assert_eq!(is_power_of_two(1), Some(0));
        assert_eq!(is_power_of_two(2), Some(1));
        assert_eq!(is_power_of_two(4), Some(2));
        assert_eq!(is_power_of_two(1024), Some(10));
        assert_eq!(is_power_of_two(1 << 30), Some(30));
        assert_eq!(is_power_of_two(i64::from(i32::MIN)), None);
    }

    #[test]
    fn test_is_power_of_two_non_powers() {
        assert_eq!(is_power_of_two(0), None);
        assert_eq!(is_power_of_two(-1), None);
        assert_eq!(is_power_of_two(3), None);
        assert_eq!(is_power_of_two(6), None);
        assert_eq!(is_power_of_two(15), None);
    }

    #[test]
    fn test_narrowing() {
        assert!(fits_i32(0));
        assert!(fits_i32(i64::from(i32::MIN)));
        assert!(!fits_i32(i64::from(i32::MIN) - 1));
        assert_eq!(narrow_i32(-5), Some(-5));
    }

    #[test]
    fn test_ceil_div() {
        assert_eq!(ceil_div(0, 3), 0);
        assert_eq!(ceil_div(9, 3), 3);
        assert_eq!(ceil_div(10, 3), 4);
        assert_eq!(ceil_div(1, 1 << 31), 1);
    }

    #[test]
    fn test_covering_mask() {
        assert_eq!(covering_mask(0), 0);
        assert_eq!(covering_mask(1), 1);
        assert_eq!(covering_mask(5), 7);
        assert_eq!(covering_mask(8), 15);
        assert_eq!(covering_mask(i32::MAX), i32::MAX);
    }
}
