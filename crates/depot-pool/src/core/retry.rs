use std::time::Duration;

/// Delay before retry number `attempt` (0-indexed): `base * 2^attempt`,
/// never more than `max`.
///
/// ```
/// use std::time::Duration;
/// use depot_pool::core::backoff_delay;
///
/// let (base, max) = (Duration::from_secs(1), Duration::from_secs(5));
/// assert_eq!(backoff_delay(0, base, max), Duration::from_secs(1));
/// assert_eq!(backoff_delay(2, base, max), Duration::from_secs(4));
/// assert_eq!(backoff_delay(3, base, max), Duration::from_secs(5));
/// ```
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let multiplier = 2_u32.saturating_pow(attempt);
    base.saturating_mul(multiplier).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(1);

        let delays: Vec<_> = (0..6).map(|i| backoff_delay(i, base, max)).collect();
        assert_eq!(delays, vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(800),
            Duration::from_secs(1),
            Duration::from_secs(1),
        ]);
    }

    #[test]
    fn test_backoff_large_attempt_saturates() {
        let max = Duration::from_secs(5);
        assert_eq!(backoff_delay(u32::MAX, Duration::from_secs(u64::MAX / 2), max), max);
    }

    #[test]
    fn test_backoff_zero_base() {
        assert_eq!(backoff_delay(10, Duration::ZERO, Duration::from_secs(5)), Duration::ZERO);
    }
}
