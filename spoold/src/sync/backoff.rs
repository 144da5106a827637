use rand::Rng;
use std::time::Duration;

/// Exponential delay schedule, optionally with full jitter.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(attempt);
        if !self.jitter {
            return ceiling;
        }
        let ceiling_ms = ceiling.as_millis().min(u128::from(u64::MAX)) as u64;
        Duration::from_millis(rng.gen_range(0..=ceiling_ms))
    }

    /// Un-jittered delay for `attempt`: `base * 2^attempt`, capped at `max`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = attempt.min(16);
        Duration::from_millis(base_ms.saturating_mul(1u64 << shift).min(max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn ceiling_doubles_until_capped() {
        let backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(1), false);
        let mut rng = StdRng::seed_from_u64(7);
        let delays: Vec<_> = (0..4)
            .map(|attempt| backoff.delay_with_rng(attempt, &mut rng))
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(1),
            ]
        );
    }

    #[test]
    fn jittered_delay_never_exceeds_ceiling() {
        let backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(5), true);
        let mut rng = StdRng::seed_from_u64(42);
        for attempt in 0..10 {
            assert!(backoff.delay_with_rng(attempt, &mut rng) <= backoff.ceiling(attempt));
        }
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), false);
        assert_eq!(backoff.ceiling(u32::MAX), Duration::from_secs(30));
    }
}
