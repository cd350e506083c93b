use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::IntakeError;

/// Fixed part of every backoff delay, in seconds.
const BASE_DELAY_SECS: u64 = 15;

/// Why a job stopped being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    /// Every retry in the budget failed.
    RetriesExhausted,
    /// The error can never succeed on retry, so the budget was skipped.
    NonRetryable,
}

impl ExhaustReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExhaustReason::RetriesExhausted => "retries_exhausted",
            ExhaustReason::NonRetryable => "non_retryable",
        }
    }
}

/// Delay schedule between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `retry_count^4 + 15s`.
    Polynomial,
    /// The same delay before every retry.
    Fixed(Duration),
}

/// What to do with a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run again after `delay` as retry number `retry_count`.
    Retry { retry_count: u32, delay: Duration },
    Exhausted(ExhaustReason),
}

/// Retry budget and backoff schedule, handed to the worker pool when it is
/// built.
///
/// `retry_count` is the number of retries already spent: 0 for the first
/// execution. With the default budget of 14 retries the delays add up to
/// roughly 25 hours before jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub jitter: bool,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            jitter: config.jitter,
            backoff: match config.fixed_delay_secs {
                Some(secs) => Backoff::Fixed(Duration::from_secs(secs)),
                None => Backoff::Polynomial,
            },
        }
    }
}

impl RetryPolicy {
    /// Returns a copy without random jitter, for predictable schedules.
    pub fn without_jitter(self) -> Self {
        Self {
            jitter: false,
            ..self
        }
    }

    /// Returns a copy that waits `delay` before every retry, without jitter.
    pub fn with_fixed_delay(self, delay: Duration) -> Self {
        Self {
            jitter: false,
            backoff: Backoff::Fixed(delay),
            ..self
        }
    }

    /// `retry_count^4 + 15s`, plus up to `10 * (retry_count + 1)` seconds of
    /// jitter.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let n = u64::from(retry_count);
        let base = match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Polynomial => {
                Duration::from_secs(n.saturating_pow(4).saturating_add(BASE_DELAY_SECS))
            }
        };
        if self.jitter {
            let extra = rand::thread_rng().gen_range(0..10 * (n + 1));
            base.saturating_add(Duration::from_secs(extra))
        } else {
            base
        }
    }

    pub fn has_budget(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Decides the fate of an execution that failed with `error` after
    /// `retry_count` retries.
    pub fn decide(&self, retry_count: u32, error: &IntakeError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Exhausted(ExhaustReason::NonRetryable);
        }
        if !self.has_budget(retry_count) {
            return RetryDecision::Exhausted(ExhaustReason::RetriesExhausted);
        }
        RetryDecision::Retry {
            retry_count: retry_count + 1,
            delay: self.delay_for(retry_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MetadataError, UploadError};

    fn transient() -> IntakeError {
        IntakeError::from(UploadError::Rejected {
            provider: "benefits_intake",
            status: 503,
            body: String::new(),
        })
    }

    #[test]
    fn test_delay_schedule_without_jitter() {
        let policy = RetryPolicy::default().without_jitter();
        assert_eq!(policy.delay_for(0), Duration::from_secs(15));
        assert_eq!(policy.delay_for(1), Duration::from_secs(16));
        assert_eq!(policy.delay_for(2), Duration::from_secs(31));
        assert_eq!(policy.delay_for(13), Duration::from_secs(28_576));
    }

    #[test]
    fn test_default_budget_spans_about_a_day() {
        let policy = RetryPolicy::default().without_jitter();
        assert_eq!(policy.max_retries, 14);

        let total: u64 = (0..policy.max_retries)
            .map(|n| policy.delay_for(n).as_secs())
            .sum();
        let hours = total / 3600;
        assert!((20..=30).contains(&hours), "total backoff was {}h", hours);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.delay_for(3).as_secs();
            assert!((96..96 + 40).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn test_decide_retries_transient_errors() {
        let policy = RetryPolicy::default().without_jitter();
        assert_eq!(
            policy.decide(0, &transient()),
            RetryDecision::Retry {
                retry_count: 1,
                delay: Duration::from_secs(15)
            }
        );
    }

    #[test]
    fn test_decide_exhausts_after_budget() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default().without_jitter()
        };
        assert!(matches!(
            policy.decide(1, &transient()),
            RetryDecision::Retry { retry_count: 2, .. }
        ));
        assert_eq!(
            policy.decide(2, &transient()),
            RetryDecision::Exhausted(ExhaustReason::RetriesExhausted)
        );
    }

    #[test]
    fn test_fixed_backoff_from_config() {
        let config = RetryConfig {
            max_retries: 3,
            jitter: true,
            fixed_delay_secs: Some(2),
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.backoff, Backoff::Fixed(Duration::from_secs(2)));

        let policy = policy.with_fixed_delay(Duration::from_millis(10));
        assert_eq!(policy.delay_for(7), Duration::from_millis(10));
    }

    #[test]
    fn test_fatal_errors_skip_budget() {
        let policy = RetryPolicy::default();
        let err = IntakeError::from(MetadataError::MissingField {
            field: "veteranFullName",
        });
        assert_eq!(
            policy.decide(0, &err),
            RetryDecision::Exhausted(ExhaustReason::NonRetryable)
        );
        assert_eq!(ExhaustReason::NonRetryable.as_str(), "non_retryable");
    }
}
