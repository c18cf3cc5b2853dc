//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;
use std::time::Duration;

/// Convert a purchase count into a `powi` exponent, saturating at `i32::MAX`.
#[must_use]
pub fn count_to_exponent(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Convert u32 to f64; always exact.
#[must_use]
pub fn u32_to_f64(value: u32) -> f64 {
    f64::from(value)
}

/// Truncate a float to u32, saturating at both ends; NaN becomes zero.
#[must_use]
pub fn f64_to_u32_saturating(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        cast::<f64, u32>(value.trunc()).unwrap_or(u32::MAX)
    }
}

/// Convert u64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn u64_to_f64(value: u64) -> f64 {
    cast::<u64, f64>(value).unwrap_or(0.0)
}

/// Millisecond span to a `Duration`, treating negative spans as zero.
#[must_use]
pub fn millis_to_duration(millis: i64) -> Duration {
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

/// Reinterpret a wall-clock timestamp as a seed.
#[must_use]
pub fn timestamp_to_seed(millis: i64) -> u64 {
    millis.unsigned_abs()
}

/// Tick period for a rate in events per second. `None` for non-positive or
/// non-finite rates.
#[must_use]
pub fn rate_to_period(rate_hz: f64) -> Option<Duration> {
    if !rate_hz.is_finite() || rate_hz <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / rate_hz)
        .ok()
        .filter(|period| !period.is_zero())
}

/// Replace non-finite or negative values with zero.
#[must_use]
pub fn non_negative(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponent_saturates() {
        assert_eq!(count_to_exponent(3), 3);
        assert_eq!(count_to_exponent(u32::MAX), i32::MAX);
    }

    #[test]
    fn float_to_u32_saturates() {
        assert_eq!(f64_to_u32_saturating(7.9), 7);
        assert_eq!(f64_to_u32_saturating(-2.0), 0);
        assert_eq!(f64_to_u32_saturating(f64::NAN), 0);
        assert_eq!(f64_to_u32_saturating(1e30), u32::MAX);
    }

    #[test]
    fn negative_spans_become_zero() {
        assert_eq!(millis_to_duration(-5), Duration::ZERO);
        assert_eq!(millis_to_duration(1_500), Duration::from_millis(1_500));
    }

    #[test]
    fn rate_periods() {
        assert_eq!(rate_to_period(2.0), Some(Duration::from_millis(500)));
        assert_eq!(rate_to_period(0.0), None);
        assert_eq!(rate_to_period(f64::NAN), None);
        assert_eq!(rate_to_period(-1.0), None);
    }

    #[test]
    fn non_negative_handles_nan() {
        assert!((non_negative(f64::NAN) - 0.0).abs() < f64::EPSILON);
        assert!((non_negative(-3.0) - 0.0).abs() < f64::EPSILON);
        assert!((non_negative(2.5) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn seeds_from_timestamps() {
        assert_eq!(timestamp_to_seed(-42), 42);
        assert!((u64_to_f64(7) - 7.0).abs() < f64::EPSILON);
        assert!((u32_to_f64(9) - 9.0).abs() < f64::EPSILON);
    }
}
