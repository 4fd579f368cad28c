use std::time::Duration;

use crate::config::RetryConfig;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry; the failure is terminal.
    NoRetry,
    /// Re-dispatch after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff with a cap, kept short so a failing task does not
/// hot-loop but also does not sit idle on a concurrency slot for long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Same delay before every retry.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
        }
    }

    pub fn from_config(cfg: &RetryConfig) -> Self {
        let base = Duration::from_secs_f64(cfg.base_delay_secs.max(0.0));
        let max = Duration::from_secs_f64(cfg.max_delay_secs.max(0.0));
        Self {
            base_delay: base,
            max_delay: max.max(base),
        }
    }

    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = 1u32 << retry.saturating_sub(1).min(8);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }

    /// `retries_done` is how many retries the task has already used.
    pub fn decide(&self, retries_done: u32, max_retries: u32) -> RetryDecision {
        if retries_done >= max_retries {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delay_for(retries_done + 1))
    }
}
