//! Exponential reconnect backoff with full jitter.
//!
//! Attempt `n` (0-based) sleeps a uniformly random duration in
//! `[0, min(cap, base * 2^n)]`.

use std::time::Duration;

use rand::Rng;

use crate::constants::{BACKOFF_BASE, BACKOFF_CAP, BACKOFF_FLOOR};

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_BASE, BACKOFF_CAP)
    }
}

impl Backoff {
    /// `base` is raised to [`BACKOFF_FLOOR`] and `cap` to `base`.
    pub fn new(base: Duration, cap: Duration) -> Self {
        let base = base.max(BACKOFF_FLOOR);
        Self {
            base,
            cap: cap.max(base),
            attempt: 0,
        }
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Largest delay attempt `n` may produce.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Draw the delay for the current attempt and advance.
    pub fn next_delay<R: Rng>(&mut self, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        let nanos = u64::try_from(ceiling.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(rng.gen_range(0..=nanos))
    }

    /// Called after a successful handshake.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn ceiling_doubles_then_caps() {
        let backoff = Backoff::default();
        assert_eq!(backoff.ceiling(0), Duration::from_secs(1));
        assert_eq!(backoff.ceiling(1), Duration::from_secs(2));
        assert_eq!(backoff.ceiling(4), Duration::from_secs(16));
        assert_eq!(backoff.ceiling(5), Duration::from_secs(30));
        assert_eq!(backoff.ceiling(31), Duration::from_secs(30));
        assert_eq!(backoff.ceiling(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn delays_stay_within_ceiling() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut backoff = Backoff::default();
        for attempt in 0..40 {
            let ceiling = backoff.ceiling(attempt);
            let delay = backoff.next_delay(&mut rng);
            assert!(delay <= ceiling, "attempt {attempt}: {delay:?} > {ceiling:?}");
        }
        assert_eq!(backoff.attempt(), 40);
    }

    #[test]
    fn jitter_spreads_delays() {
        let mut rng = StdRng::seed_from_u64(42);
        let delays: Vec<Duration> = (0..50)
            .map(|_| {
                let mut backoff = Backoff::default();
                for _ in 0..6 {
                    backoff.next_delay(&mut rng);
                }
                backoff.next_delay(&mut rng)
            })
            .collect();
        let min = delays.iter().min().unwrap();
        let max = delays.iter().max().unwrap();
        assert!(*max <= BACKOFF_CAP);
        assert!(*max - *min > Duration::from_secs(5));
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(5));
        for _ in 0..10 {
            backoff.next_delay(&mut rng);
        }
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert!(backoff.next_delay(&mut rng) <= Duration::from_millis(100));
    }

    #[test]
    fn zero_base_and_cap_use_floor() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut backoff = Backoff::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(backoff.ceiling(0), BACKOFF_FLOOR);
        assert_eq!(backoff.ceiling(10), BACKOFF_FLOOR);
        assert!(backoff.next_delay(&mut rng) <= BACKOFF_FLOOR);

        let backoff = Backoff::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(backoff.ceiling(2), BACKOFF_FLOOR * 4);
    }

    #[test]
    fn cap_never_below_base() {
        let backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(backoff.ceiling(0), Duration::from_secs(2));
        assert_eq!(backoff.ceiling(3), Duration::from_secs(2));
    }
}
