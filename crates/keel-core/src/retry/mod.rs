//! Retry executor: exponential backoff around a fallible async call.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::Retryable;

/// Retry configuration for one external-call site.
///
/// With `max_retries = 3` an operation runs at most 4 times. The wait before
/// retry `n` is `base_delay * 2^(n - 1)`:
/// - retry 1: base
/// - retry 2: 2 * base
/// - retry 3: 4 * base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay_ms: base_delay.as_millis() as u64,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Standard wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        backoff(self.base_delay(), retry.saturating_sub(1))
    }

    /// Extra wait after a rate-limited failure of attempt `attempt`
    /// (0-based). Applied on top of [`Self::delay_for`].
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        backoff(self.base_delay(), attempt.saturating_add(2))
    }
}

/// `base * 2^exponent`, saturating.
pub fn backoff(base: Duration, exponent: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(exponent))
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_retries` retries have been spent. The last error is returned
/// on exhaustion.
///
/// A rate-limited failure (status 429) adds `policy.rate_limit_delay` before
/// the regular backoff.
pub async fn call_with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let mut attempt: u32 = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!(attempt, error = %err, "non-retryable failure");
            return Err(err);
        }
        if attempt >= policy.max_retries {
            warn!(attempts = attempt + 1, error = %err, "retries exhausted");
            return Err(err);
        }

        if err.status_code() == Some(429) {
            let extra = policy.rate_limit_delay(attempt);
            debug!(attempt, delay_ms = extra.as_millis() as u64, "rate limited");
            tokio::time::sleep(extra).await;
        }

        attempt += 1;
        let delay = policy.delay_for(attempt);
        warn!(
            retry = attempt,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "call failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
