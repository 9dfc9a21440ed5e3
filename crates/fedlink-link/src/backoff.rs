use rand::Rng;
use std::time::Duration;

/// Exponential reconnect backoff with full jitter.
///
/// The delay before retry `n` (0-based) is drawn uniformly from
/// `0..=min(cap, base * 2^n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    /// Upper bound of the delay before retry `attempt`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// A random delay before retry `attempt`.
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        Duration::from_millis(rng.gen_range(0..=ceiling))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn ceiling_doubles_until_cap() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.ceiling(0), Duration::from_secs(5));
        assert_eq!(policy.ceiling(1), Duration::from_secs(10));
        assert_eq!(policy.ceiling(5), Duration::from_secs(160));
        assert_eq!(policy.ceiling(6), Duration::from_secs(300));
        assert_eq!(policy.ceiling(40), Duration::from_secs(300));
    }

    #[test]
    fn delays_stay_within_ceiling() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(1),
        };
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 0..20 {
            let delay = policy.delay(attempt, &mut rng);
            assert!(delay <= policy.ceiling(attempt), "attempt {attempt}: {delay:?}");
        }
    }
}
