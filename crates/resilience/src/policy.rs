//! Retry policy: how many times, how long to wait, and which codes qualify.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::result_code::ResultCode;

// ---------------------------------------------------------------------------
// RetryLimit
// ---------------------------------------------------------------------------

/// Upper bound on retries after the initial attempt.
///
/// Serialized as an integer where `-1` means [`RetryLimit::Unbounded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum RetryLimit {
    /// At most this many retries
    Limited(u32),
    /// Retry until success, cancellation, or a non-retryable error
    Unbounded,
}

impl RetryLimit {
    /// Whether another retry is permitted after `retries_done` retries.
    #[must_use]
    pub const fn allows(self, retries_done: u32) -> bool {
        match self {
            Self::Limited(max) => retries_done < max,
            Self::Unbounded => true,
        }
    }
}

impl Default for RetryLimit {
    fn default() -> Self {
        Self::Limited(1)
    }
}

impl TryFrom<i64> for RetryLimit {
    type Error = ConfigError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Unbounded),
            n if n < -1 => Err(ConfigError::validation(
                "max_retries",
                format!("{n} is not a retry count (use -1 for unbounded)"),
            )),
            n => u32::try_from(n).map(Self::Limited).map_err(|_| {
                ConfigError::validation("max_retries", format!("{n} exceeds {}", u32::MAX))
            }),
        }
    }
}

impl From<RetryLimit> for i64 {
    fn from(limit: RetryLimit) -> Self {
        match limit {
            RetryLimit::Limited(n) => Self::from(n),
            RetryLimit::Unbounded => -1,
        }
    }
}

impl fmt::Display for RetryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{n}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

// ---------------------------------------------------------------------------
// Backoff and jitter
// ---------------------------------------------------------------------------

/// Growth of the wait between successive retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `retry_wait × multiplier^(n-1)` before the n-th retry
    #[default]
    Exponential,
    /// `retry_wait` before the first retry, then `retry_wait × multiplier × (n-1)`
    Linear,
}

impl Backoff {
    fn factor(self, multiplier: f64, retry: u32) -> f64 {
        let step = retry.saturating_sub(1);
        match self {
            Self::Exponential => multiplier.powi(step.min(i32::MAX as u32) as i32),
            Self::Linear if step == 0 => 1.0,
            Self::Linear => multiplier * f64::from(step),
        }
    }
}

/// Randomisation applied to a computed delay, spreading out reconnect storms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterPolicy {
    /// Use the computed delay as-is
    #[default]
    None,
    /// Uniform in `[0, delay]`
    Full,
    /// `delay/2` plus uniform in `[0, delay/2]`
    Equal,
    /// Uniform in `[delay, 3 × previous]`, equal jitter on the first retry
    Decorrelated,
}

impl JitterPolicy {
    /// Apply jitter to `delay`; `previous` is the delay actually used last time.
    #[must_use]
    pub fn apply(self, delay: Duration, previous: Option<Duration>) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Self::None => delay,
            Self::Full if millis == 0 => delay,
            Self::Full => Duration::from_millis(fastrand::u64(0..=millis)),
            Self::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + fastrand::u64(0..=half))
            }
            Self::Decorrelated => match previous {
                Some(prev) => {
                    let prev = u64::try_from(prev.as_millis()).unwrap_or(u64::MAX);
                    let upper = prev.saturating_mul(3).max(millis);
                    Duration::from_millis(fastrand::u64(millis..=upper))
                }
                None => Self::Equal.apply(delay, None),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Policy attached to an operation invocation.
///
/// Defaults allow one retry with no wait, retrying only on
/// [`ResultCode::TRANSIENT`] codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; `-1` in config means unbounded
    pub max_retries: RetryLimit,
    /// Base wait before the first retry
    #[serde(with = "humantime_serde")]
    pub retry_wait: Duration,
    /// Growth factor, at least 1
    pub backoff_multiplier: f64,
    /// How the multiplier is applied
    pub backoff: Backoff,
    /// Ceiling on any single wait
    #[serde(with = "humantime_serde")]
    pub max_wait: Option<Duration>,
    /// Randomisation of the computed wait
    pub jitter: JitterPolicy,
    /// Result codes that trigger a reopen and retry
    pub retryable_codes: HashSet<ResultCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: RetryLimit::default(),
            retry_wait: Duration::ZERO,
            backoff_multiplier: 1.0,
            backoff: Backoff::Exponential,
            max_wait: None,
            jitter: JitterPolicy::None,
            retryable_codes: ResultCode::TRANSIENT.iter().copied().collect(),
        }
    }
}

impl RetryPolicy {
    /// Set the retry limit
    #[must_use]
    pub fn with_max_retries(mut self, limit: RetryLimit) -> Self {
        self.max_retries = limit;
        self
    }

    /// Set the base wait
    #[must_use]
    pub fn with_retry_wait(mut self, wait: Duration) -> Self {
        self.retry_wait = wait;
        self
    }

    /// Set the backoff multiplier
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the backoff kind
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Cap every wait at `max_wait`
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Set the jitter policy
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the retryable code set
    #[must_use]
    pub fn with_retryable_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = ResultCode>,
    {
        self.retryable_codes = codes.into_iter().collect();
        self
    }

    /// Validate policy parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::validation(
                "backoff_multiplier",
                format!("must be finite and >= 1, got {}", self.backoff_multiplier),
            ));
        }
        if let Some(max_wait) = self.max_wait
            && max_wait < self.retry_wait
        {
            return Err(ConfigError::validation(
                "max_wait",
                format!("{max_wait:?} is shorter than retry_wait {:?}", self.retry_wait),
            ));
        }
        Ok(())
    }

    /// Whether a failure with `code` should be retried.
    #[must_use]
    pub fn is_retryable(&self, code: ResultCode) -> bool {
        self.retryable_codes.contains(&code)
    }

    /// Wait before the `retry`-th retry (1-based), before jitter.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.backoff.factor(self.backoff_multiplier, retry);
        let nanos = self.retry_wait.as_nanos() as f64 * factor;
        let delay = if nanos.is_finite() && nanos < u64::MAX as f64 {
            Duration::from_nanos(nanos.round() as u64)
        } else {
            Duration::from_nanos(u64::MAX)
        };
        match self.max_wait {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn defaults_retry_transient_codes_once() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, RetryLimit::Limited(1));
        assert_eq!(policy.retry_wait, Duration::ZERO);
        assert!(policy.is_retryable(ResultCode::ServerDown));
        assert!(policy.is_retryable(ResultCode::Busy));
        assert!(!policy.is_retryable(ResultCode::NoSuchObject));
        assert!(policy.validate().is_ok());
    }

    #[rstest]
    #[case(1, 100)]
    #[case(2, 200)]
    #[case(3, 400)]
    #[case(4, 800)]
    fn exponential_delay_doubles(#[case] retry: u32, #[case] expected: u64) {
        let policy = RetryPolicy::default()
            .with_retry_wait(ms(100))
            .with_backoff_multiplier(2.0);
        assert_eq!(policy.delay(retry), ms(expected));
    }

    #[rstest]
    #[case(1, 100)]
    #[case(2, 300)]
    #[case(3, 600)]
    #[case(4, 900)]
    fn linear_delay_grows_by_step(#[case] retry: u32, #[case] expected: u64) {
        let policy = RetryPolicy::default()
            .with_retry_wait(ms(100))
            .with_backoff_multiplier(3.0)
            .with_backoff(Backoff::Linear);
        assert_eq!(policy.delay(retry), ms(expected));
    }

    #[test]
    fn unit_multiplier_keeps_constant_wait() {
        let policy = RetryPolicy::default().with_retry_wait(ms(1000));
        for retry in 1..=5 {
            assert_eq!(policy.delay(retry), ms(1000));
        }
    }

    #[test]
    fn max_wait_caps_delay() {
        let policy = RetryPolicy::default()
            .with_retry_wait(ms(100))
            .with_backoff_multiplier(10.0)
            .with_max_wait(ms(2500));
        assert_eq!(policy.delay(2), ms(1000));
        assert_eq!(policy.delay(3), ms(2500));
        assert_eq!(policy.delay(400), ms(2500));
    }

    #[test]
    fn huge_exponent_saturates() {
        let policy = RetryPolicy::default()
            .with_retry_wait(Duration::from_secs(1))
            .with_backoff_multiplier(10.0);
        assert_eq!(policy.delay(u32::MAX), Duration::from_nanos(u64::MAX));
    }

    #[rstest]
    #[case(0.5)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn rejects_bad_multiplier(#[case] multiplier: f64) {
        let policy = RetryPolicy::default().with_backoff_multiplier(multiplier);
        assert!(matches!(
            policy.validate(),
            Err(ConfigError::Validation { field: "backoff_multiplier", .. })
        ));
    }

    #[test]
    fn rejects_cap_below_base_wait() {
        let policy = RetryPolicy::default()
            .with_retry_wait(ms(500))
            .with_max_wait(ms(100));
        assert!(policy.validate().is_err());
    }

    #[test]
    fn retry_limit_from_integer() {
        assert_eq!(RetryLimit::try_from(-1).unwrap(), RetryLimit::Unbounded);
        assert_eq!(RetryLimit::try_from(3).unwrap(), RetryLimit::Limited(3));
        assert!(RetryLimit::try_from(-2).is_err());
        assert!(RetryLimit::try_from(i64::MAX).is_err());
        assert_eq!(i64::from(RetryLimit::Unbounded), -1);
    }

    #[test]
    fn retry_limit_allows() {
        assert!(RetryLimit::Limited(3).allows(2));
        assert!(!RetryLimit::Limited(3).allows(3));
        assert!(!RetryLimit::Limited(0).allows(0));
        assert!(RetryLimit::Unbounded.allows(u32::MAX));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let delay = ms(1000);
        for _ in 0..200 {
            assert!(JitterPolicy::Full.apply(delay, None) <= delay);
            let equal = JitterPolicy::Equal.apply(delay, None);
            assert!(equal >= ms(500) && equal <= delay);
            let decorrelated = JitterPolicy::Decorrelated.apply(delay, Some(ms(2000)));
            assert!(decorrelated >= delay && decorrelated <= ms(6000));
        }
        assert_eq!(JitterPolicy::None.apply(delay, None), delay);
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO, None), Duration::ZERO);
    }

    #[test]
    fn deserializes_from_toml() {
        let policy: RetryPolicy = toml::from_str(
            r#"
            max_retries = -1
            retry_wait = "250ms"
            backoff_multiplier = 2.0
            backoff = "linear"
            max_wait = "5s"
            jitter = "equal"
            retryable_codes = ["server_down", "busy"]
            "#,
        )
        .unwrap();
        assert_eq!(policy.max_retries, RetryLimit::Unbounded);
        assert_eq!(policy.retry_wait, ms(250));
        assert_eq!(policy.backoff, Backoff::Linear);
        assert_eq!(policy.max_wait, Some(Duration::from_secs(5)));
        assert_eq!(policy.jitter, JitterPolicy::Equal);
        assert_eq!(policy.retryable_codes.len(), 2);
        assert!(!policy.is_retryable(ResultCode::Unavailable));
    }

    #[test]
    fn json_rejects_negative_retry_count() {
        let err = serde_json::from_str::<RetryPolicy>(r#"{"max_retries": -5}"#).unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }
}
