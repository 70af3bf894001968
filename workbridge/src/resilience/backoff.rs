//! Exponential backoff with multiplicative jitter.
//!
//! `delay = min(base * 2^(attempt-1), max) * U[1-j, 1+j]`, capped at `max`
//! again after jitter. A backend-supplied floor (from `Retry-After`) wins
//! when it is larger.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default jitter ratio (±20%).
pub const DEFAULT_JITTER: f64 = 0.2;

/// How a backend's retry-after hint combines with the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAfterMode {
    /// The hint is a hard floor, even above the ceiling.
    #[default]
    Floor,
    /// The hint is honoured only up to the ceiling.
    Advisory,
}

/// Produces wait durations between attempts.
///
/// Safe to share between concurrent callers; the random source sits behind
/// a mutex.
#[derive(Debug)]
pub struct BackoffGenerator {
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
    retry_after_mode: RetryAfterMode,
    rng: Mutex<StdRng>,
}

impl BackoffGenerator {
    /// Creates a generator seeded from OS entropy.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: DEFAULT_JITTER,
            retry_after_mode: RetryAfterMode::default(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replaces the random source with a deterministic one.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Sets the jitter ratio, clamped to `[0, 1)`.
    #[must_use]
    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter = if ratio.is_finite() { ratio.clamp(0.0, 0.99) } else { 0.0 };
        self
    }

    /// Sets how retry-after hints are applied.
    #[must_use]
    pub fn with_retry_after_mode(mut self, mode: RetryAfterMode) -> Self {
        self.retry_after_mode = mode;
        self
    }

    /// Returns the configured ceiling.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// The un-jittered delay for a 1-based attempt.
    #[must_use]
    pub fn nominal(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = 2u32
            .checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }

    /// The wait before the attempt following `attempt`.
    ///
    /// `floor` is the backend's retry-after hint, if any.
    pub fn next(&self, attempt: u32, floor: Option<Duration>) -> Duration {
        let nominal = self.nominal(attempt);

        let jittered = if self.jitter > 0.0 && !nominal.is_zero() {
            let factor = self
                .rng
                .lock()
                .gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
            Duration::try_from_secs_f64(nominal.as_secs_f64() * factor).unwrap_or(self.max_delay)
        } else {
            nominal
        };
        let delay = jittered.min(self.max_delay);

        match (floor, self.retry_after_mode) {
            (Some(floor), RetryAfterMode::Floor) => delay.max(floor),
            (Some(floor), RetryAfterMode::Advisory) => delay.max(floor.min(self.max_delay)),
            (None, _) => delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> BackoffGenerator {
        BackoffGenerator::new(Duration::from_millis(100), Duration::from_secs(5)).with_seed(7)
    }

    #[test]
    fn test_nominal_doubles() {
        let backoff = generator();
        assert_eq!(backoff.nominal(1), Duration::from_millis(100));
        assert_eq!(backoff.nominal(2), Duration::from_millis(200));
        assert_eq!(backoff.nominal(3), Duration::from_millis(400));
        assert_eq!(backoff.nominal(0), Duration::from_millis(100));
    }

    #[test]
    fn test_nominal_capped() {
        let backoff = generator();
        assert_eq!(backoff.nominal(10), Duration::from_secs(5));
        assert_eq!(backoff.nominal(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_bounds() {
        let backoff = generator();
        for _ in 0..200 {
            let delay = backoff.next(3, None);
            assert!(delay >= Duration::from_millis(320));
            assert!(delay <= Duration::from_millis(480));
        }
    }

    #[test]
    fn test_never_exceeds_ceiling() {
        let backoff = generator();
        for attempt in 1..40 {
            for _ in 0..20 {
                assert!(backoff.next(attempt, None) <= backoff.max_delay());
            }
        }
    }

    #[test]
    fn test_non_decreasing_in_expectation() {
        let backoff = BackoffGenerator::new(Duration::from_millis(10), Duration::from_secs(60))
            .with_seed(42);

        let mean = |attempt: u32| -> f64 {
            let total: f64 = (0..500)
                .map(|_| backoff.next(attempt, None).as_secs_f64())
                .sum();
            total / 500.0
        };

        let mut previous = 0.0;
        for attempt in 1..=8 {
            let current = mean(attempt);
            assert!(current >= previous, "attempt {attempt}: {current} < {previous}");
            previous = current;
        }
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let a = generator();
        let b = generator();
        let seq_a: Vec<_> = (1..6).map(|n| a.next(n, None)).collect();
        let seq_b: Vec<_> = (1..6).map(|n| b.next(n, None)).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn test_floor_wins_when_larger() {
        let backoff = generator();
        let delay = backoff.next(1, Some(Duration::from_secs(2)));
        assert_eq!(delay, Duration::from_secs(2));

        let small_floor = backoff.next(3, Some(Duration::from_millis(1)));
        assert!(small_floor >= Duration::from_millis(320));
    }

    #[test]
    fn test_floor_is_hard_by_default() {
        let backoff = generator();
        let delay = backoff.next(1, Some(Duration::from_secs(30)));
        assert_eq!(delay, Duration::from_secs(30));
    }

    #[test]
    fn test_advisory_floor_capped() {
        let backoff = generator().with_retry_after_mode(RetryAfterMode::Advisory);
        let delay = backoff.next(1, Some(Duration::from_secs(30)));
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn test_no_jitter() {
        let backoff = generator().with_jitter(0.0);
        assert_eq!(backoff.next(2, None), Duration::from_millis(200));
    }
}
