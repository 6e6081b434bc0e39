//! Retry schedules: how many retries to make and how long to wait before each.

use std::sync::Arc;
use std::time::Duration;

use crate::error::BuildError;

/// Generates the wait before the n-th retry (1-based).
pub type DelayProvider = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// The waits between attempts. Its length is the maximum number of retries.
#[derive(Clone)]
pub enum RetrySchedule {
    /// One explicit wait per retry; the waits may differ.
    Durations(Arc<[Duration]>),
    /// `retries` retries, waiting `provider(n)` before retry `n`.
    Generated {
        retries: u32,
        provider: DelayProvider,
    },
}

impl RetrySchedule {
    /// Retry once per element, waiting that long first.
    pub fn durations<I>(waits: I) -> Self
    where
        I: IntoIterator<Item = Duration>,
    {
        Self::Durations(waits.into_iter().collect())
    }

    /// Retry `retries` times, asking `provider` for each wait.
    pub fn generated<F>(retries: u32, provider: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self::Generated {
            retries,
            provider: Arc::new(provider),
        }
    }

    /// Retry `retries` times without waiting.
    pub fn immediate(retries: u32) -> Self {
        Self::generated(retries, |_| Duration::ZERO)
    }

    /// Retry `retries` times with the same wait each time.
    pub fn constant(retries: u32, wait: Duration) -> Self {
        Self::generated(retries, move |_| wait)
    }

    /// Capped exponential backoff.
    pub fn exponential(config: BackoffConfig) -> Result<Self, BuildError> {
        config.validate()?;
        Ok(Self::generated(config.max_retries, move |retry| {
            config.delay(retry)
        }))
    }

    /// Maximum number of retries (not counting the first attempt).
    pub fn retries(&self) -> u32 {
        match self {
            Self::Durations(waits) => u32::try_from(waits.len()).unwrap_or(u32::MAX),
            Self::Generated { retries, .. } => *retries,
        }
    }

    /// Wait before the `retry`-th retry (1-based).
    /// Returns `None` once the schedule is exhausted.
    pub fn delay(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.retries() {
            return None;
        }
        match self {
            Self::Durations(waits) => waits.get((retry - 1) as usize).copied(),
            Self::Generated { provider, .. } => Some(provider(retry)),
        }
    }
}

impl std::fmt::Debug for RetrySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Durations(waits) => f.debug_tuple("Durations").field(waits).finish(),
            Self::Generated { retries, .. } => f
                .debug_struct("Generated")
                .field("retries", retries)
                .field("provider", &"<fn>")
                .finish(),
        }
    }
}

/// Configuration for capped exponential backoff with optional jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
    /// Wait before the first retry.
    pub initial_backoff: Duration,
    /// Maximum backoff delay (caps exponential growth).
    pub max_backoff: Duration,
    /// Multiplier applied to backoff on each retry.
    pub multiplier: f64,
    /// Spread each wait by up to ±`jitter_fraction * backoff` (0.0 = no jitter).
    pub jitter_fraction: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), BuildError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(BuildError::InvalidSchedule(format!(
                "multiplier must be a finite value >= 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(BuildError::InvalidSchedule(format!(
                "jitter_fraction must be within [0, 1], got {}",
                self.jitter_fraction
            )));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(BuildError::InvalidSchedule(format!(
                "initial_backoff {:?} exceeds max_backoff {:?}",
                self.initial_backoff, self.max_backoff
            )));
        }
        Ok(())
    }

    /// Returns the delay before the `retry`-th retry (1-based).
    ///
    /// Jitter is derived from the retry number, so the same config always
    /// yields the same schedule.
    pub fn delay(&self, retry: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        // an overflowing power is still above the cap
        let cap = self.max_backoff.as_secs_f64();
        let capped = if base.is_finite() { base.min(cap) } else { cap };

        let spread = 2.0 * unit_interval(mix64(u64::from(retry))) - 1.0;
        let jittered = capped * (1.0 + self.jitter_fraction * spread);

        Duration::try_from_secs_f64(jittered.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// SplitMix64 finaliser.
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn unit_interval(bits: u64) -> f64 {
    (bits >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(max_retries: u32) -> BackoffConfig {
        BackoffConfig {
            max_retries,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_fraction: 0.0,
        }
    }

    #[test]
    fn explicit_durations() {
        let s = RetrySchedule::durations([
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3),
        ]);
        assert_eq!(s.retries(), 3);
        assert_eq!(s.delay(1), Some(Duration::from_secs(1)));
        assert_eq!(s.delay(3), Some(Duration::from_secs(3)));
        assert_eq!(s.delay(4), None);
        assert_eq!(s.delay(0), None);
    }

    #[test]
    fn generated_gets_one_based_retry() {
        let s = RetrySchedule::generated(2, |n| Duration::from_millis(u64::from(n) * 10));
        assert_eq!(s.delay(1), Some(Duration::from_millis(10)));
        assert_eq!(s.delay(2), Some(Duration::from_millis(20)));
        assert!(s.delay(3).is_none());
    }

    #[test]
    fn zero_retries_is_empty() {
        let s = RetrySchedule::immediate(0);
        assert_eq!(s.retries(), 0);
        assert!(s.delay(1).is_none());
        assert_eq!(RetrySchedule::durations([]).retries(), 0);
    }

    #[test]
    fn exponential_doubles() {
        let s = RetrySchedule::exponential(no_jitter(3)).unwrap();
        assert_eq!(s.delay(1).unwrap().as_millis(), 100);
        assert_eq!(s.delay(2).unwrap().as_millis(), 200);
        assert_eq!(s.delay(3).unwrap().as_millis(), 400);
        assert!(s.delay(4).is_none());
    }

    #[test]
    fn delay_capped_at_max() {
        let config = BackoffConfig {
            max_retries: 10,
            max_backoff: Duration::from_millis(500),
            multiplier: 10.0,
            ..no_jitter(10)
        };
        // After a few multiplications it should be capped
        let d5 = config.delay(5);
        assert!(d5 <= Duration::from_millis(500), "d5={d5:?} exceeds max");
    }

    #[test]
    fn jitter_stays_in_band_and_is_deterministic() {
        let config = BackoffConfig {
            jitter_fraction: 0.5,
            ..no_jitter(5)
        };
        for retry in 1..=5 {
            let d = config.delay(retry);
            let base = no_jitter(5).delay(retry).as_secs_f64();
            assert!(d.as_secs_f64() >= base * 0.5 - 1e-9, "retry {retry}: {d:?}");
            assert!(d.as_secs_f64() <= base * 1.5 + 1e-9, "retry {retry}: {d:?}");
            assert_eq!(d, config.delay(retry));
        }
    }

    #[test]
    fn uncapped_backoff_saturates() {
        let config = BackoffConfig {
            max_retries: 100,
            max_backoff: Duration::MAX,
            ..no_jitter(100)
        };
        let s = RetrySchedule::exponential(config).unwrap();
        assert_eq!(s.delay(1), Some(Duration::from_millis(100)));
        assert!(s.delay(80).unwrap() > Duration::from_secs(60 * 60 * 24 * 365));

        let jittered = BackoffConfig {
            jitter_fraction: 1.0,
            ..config
        };
        for retry in [64, 80, 100] {
            let d = jittered.delay(retry);
            assert_eq!(d, jittered.delay(retry));
        }
        assert_eq!(config.delay(u32::MAX), Duration::MAX);
    }

    #[test]
    fn zero_initial_backoff_stays_zero() {
        let config = BackoffConfig {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(10),
            ..no_jitter(2000)
        };
        assert_eq!(config.delay(1), Duration::ZERO);
        assert_eq!(config.delay(1100), Duration::ZERO);
    }

    #[test]
    fn overflowing_power_stays_at_the_cap() {
        let config = BackoffConfig {
            max_backoff: Duration::from_secs(10),
            ..no_jitter(2000)
        };
        assert_eq!(config.delay(1100), Duration::from_secs(10));
    }

    #[test]
    fn rejects_invalid_backoff() {
        let shrinking = BackoffConfig {
            multiplier: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            RetrySchedule::exponential(shrinking),
            Err(BuildError::InvalidSchedule(_))
        ));

        let wild = BackoffConfig {
            jitter_fraction: 1.5,
            ..Default::default()
        };
        assert!(wild.validate().is_err());

        let inverted = BackoffConfig {
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }
}
