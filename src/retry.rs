//! Capped exponential backoff for foreign RPC and oracle reads

use crate::config::RetryConfig;
use crate::error::{BridgeError, BridgeResult};

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1)
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> BridgeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BridgeResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    let remaining = self.max_attempts - attempt - 1;
                    if remaining == 0 {
                        warn!("{} failed after {} attempts: {}", operation, self.max_attempts, e);
                        last_error = Some(e);
                        break;
                    }
                    let delay = self.delay(attempt);
                    debug!("{} failed ({}), retrying in {:?}", operation, e, delay);
                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BridgeError::Timeout {
            operation: operation.to_string(),
        }))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.max_attempts,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 10);
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(6), Duration::from_secs(60));
        assert_eq!(policy.delay(40), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors() {
        let policy = RetryPolicy::new(Duration::from_millis(10), Duration::from_secs(60), 5);
        let calls = AtomicU32::new(0);

        let result = policy
            .run("flaky read", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BridgeError::Timeout {
                        operation: "read".into(),
                    })
                } else {
                    Ok(7u64)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let policy = RetryPolicy::new(Duration::ZERO, Duration::ZERO, 5);
        let calls = AtomicU32::new(0);

        let result: BridgeResult<()> = policy
            .run("config read", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BridgeError::Config("bad".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
