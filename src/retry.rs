//! Shared exponential backoff for every external call.
//!
//! Each attempt runs under a hard per-call timeout; a timeout counts as a transient
//! failure. Permanent errors return immediately. Dropping the returned future aborts
//! the in-flight attempt, so cancellation of the caller propagates.

use std::future::Future;
use std::time::{Duration, SystemTime};

use crate::config::RetryConfig;
use crate::error::{Dependency, MemoryError, MemoryResult};

/// Backoff parameters for one class of external call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Hard timeout for each attempt.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), with ±25% jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(2u64.saturating_pow(retry.min(16)));
        let capped_ms = exp_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(apply_jitter(capped_ms))
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempt budget is spent.
///
/// Returns the last error on exhaustion.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    dependency: Dependency,
    operation: &str,
    mut op: F,
) -> MemoryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = MemoryResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = policy.delay_for(attempt - 1);
            tracing::warn!(
                dependency = %dependency,
                operation,
                attempt = attempt + 1,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
        }

        let result = match tokio::time::timeout(policy.call_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(MemoryError::Unavailable(
                dependency,
                format!("{operation} timed out after {}ms", policy.call_timeout.as_millis()),
            )),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                tracing::debug!(dependency = %dependency, operation, error = %err, "attempt failed");
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        MemoryError::Unavailable(dependency, format!("{operation} made no attempts"))
    }))
}

fn apply_jitter(base_ms: u64) -> u64 {
    let range = (base_ms / 4) as i64;
    if range == 0 {
        return base_ms;
    }
    let offset = (clock_jitter() % (2 * range + 1)) - range;
    (base_ms as i64 + offset).max(0) as u64
}

fn clock_jitter() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 10_007) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            call_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = fast_policy(3);
        let result = with_retry(&policy, Dependency::Embedding, "embed", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(MemoryError::Unavailable(Dependency::Embedding, "503".into()))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_at_attempt_budget() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: MemoryResult<()> =
            with_retry(&fast_policy(3), Dependency::Completion, "complete", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(MemoryError::Unavailable(Dependency::Completion, "down".into()))
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: MemoryResult<()> =
            with_retry(&fast_policy(5), Dependency::Embedding, "embed", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(MemoryError::Failed(Dependency::Embedding, "HTTP 400".into()))
            })
            .await;

        assert!(matches!(result, Err(MemoryError::Failed(..))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let policy = RetryPolicy {
            call_timeout: Duration::from_millis(10),
            ..fast_policy(2)
        };
        let result: MemoryResult<()> =
            with_retry(&policy, Dependency::VectorStore, "query", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            call_timeout: Duration::from_secs(1),
        };
        let first = policy.delay_for(0).as_millis();
        let capped = policy.delay_for(10).as_millis();
        assert!((75..=125).contains(&first), "got {first}");
        assert!((300..=500).contains(&capped), "got {capped}");
    }

    #[test]
    fn zero_attempts_config_still_tries_once() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(RetryPolicy::from(&config).max_attempts, 1);
    }
}
