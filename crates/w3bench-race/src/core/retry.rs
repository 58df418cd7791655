use std::time::Duration;

/// Delay before a retry, using capped exponential backoff.
///
/// The delay formula is: `min(base * 2^retry_count, cap)`
///
/// # Arguments
///
/// * `retry_count` - The current retry number (0-indexed: 0 = first retry)
/// * `base` - The base delay duration
/// * `cap` - Upper bound on the returned delay
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use w3bench_race::core::retry_delay;
///
/// let base = Duration::from_millis(100);
/// let cap = Duration::from_secs(1);
/// assert_eq!(retry_delay(0, base, cap), Duration::from_millis(100));
/// assert_eq!(retry_delay(2, base, cap), Duration::from_millis(400));
/// assert_eq!(retry_delay(8, base, cap), Duration::from_secs(1));
/// ```
pub fn retry_delay(retry_count: u32, base: Duration, cap: Duration) -> Duration {
    let multiplier = 2_u32.saturating_pow(retry_count);
    base.saturating_mul(multiplier).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: Duration = Duration::from_secs(3600);

    #[test]
    fn test_retry_delay_basic() {
        let base = Duration::from_millis(100);

        assert_eq!(retry_delay(0, base, CAP), Duration::from_millis(100));
        assert_eq!(retry_delay(1, base, CAP), Duration::from_millis(200));
        assert_eq!(retry_delay(2, base, CAP), Duration::from_millis(400));
        assert_eq!(retry_delay(3, base, CAP), Duration::from_millis(800));
    }

    #[test]
    fn test_retry_delay_zero_base() {
        let base = Duration::ZERO;

        assert_eq!(retry_delay(0, base, CAP), Duration::ZERO);
        assert_eq!(retry_delay(10, base, CAP), Duration::ZERO);
    }

    #[test]
    fn test_retry_delay_capped() {
        let base = Duration::from_millis(100);
        let cap = Duration::from_secs(10);

        // 100ms * 2^13 would be ~819s
        assert_eq!(retry_delay(13, base, cap), cap);
    }

    #[test]
    fn test_retry_delay_overflow_protection() {
        let base = Duration::from_secs(u64::MAX / 2);

        let delay = retry_delay(40, base, Duration::MAX);
        assert_eq!(delay, Duration::MAX);
    }
}
