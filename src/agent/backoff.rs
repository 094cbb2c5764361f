//! Reconnect delay calculation.
//!
//! Pure math, no clock and no RNG. The caller supplies the random sample so
//! the schedule is reproducible in tests.

use std::time::Duration;

/// Growth factor between consecutive retries.
pub const BACKOFF_MULTIPLIER: f64 = 1.5;

/// Upper bound of the jitter, as a fraction of the exponential delay.
pub const JITTER_FRACTION: f64 = 0.5;

/// Delay before the `retry`-th consecutive reconnect attempt.
///
/// Formula: `base * 1.5^(retry - 1) + random * 0.5 * base * 1.5^(retry - 1)`
///
/// `retry` is 1-based; 0 is treated as 1. `random` should be in `[0.0, 1.0)`
/// and is clamped into that range.
#[must_use]
pub fn backoff_delay(retry: u32, base: Duration, random: f64) -> Duration {
    let exponent = retry.saturating_sub(1).min(64) as i32;
    let exponential = base.as_secs_f64() * BACKOFF_MULTIPLIER.powi(exponent);
    let jitter = exponential * JITTER_FRACTION * random.clamp(0.0, 1.0);

    Duration::try_from_secs_f64(exponential + jitter).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    const BASE: Duration = Duration::from_millis(1000);

    #[test]
    fn test_first_retry_without_jitter() {
        assert_eq!(backoff_delay(1, BASE, 0.0), Duration::from_millis(1000));
    }

    #[test]
    fn test_growth() {
        assert_eq!(backoff_delay(2, BASE, 0.0), Duration::from_millis(1500));
        assert_eq!(backoff_delay(3, BASE, 0.0), Duration::from_millis(2250));
    }

    #[test]
    fn test_full_jitter() {
        let delay = backoff_delay(1, BASE, 0.999_999);
        assert!(delay < Duration::from_millis(1500));
        assert!(delay > Duration::from_millis(1499));
    }

    #[test]
    fn test_zero_is_first_retry() {
        assert_eq!(backoff_delay(0, BASE, 0.0), backoff_delay(1, BASE, 0.0));
    }

    proptest! {
        #[test]
        fn prop_delay_within_jitter_bounds(retry in 1u32..12, random in 0.0f64..1.0) {
            let floor = BASE.as_secs_f64() * BACKOFF_MULTIPLIER.powi(retry as i32 - 1);
            let delay = backoff_delay(retry, BASE, random).as_secs_f64();

            prop_assert!(delay >= floor - 1e-9);
            prop_assert!(delay <= floor * (1.0 + JITTER_FRACTION) + 1e-9);
        }

        #[test]
        fn prop_delay_grows_with_retry(retry in 1u32..12, random in 0.0f64..1.0) {
            let this = backoff_delay(retry, BASE, random);
            let next = backoff_delay(retry + 1, BASE, random);
            prop_assert!(next > this);
        }
    }
}
