//! Bounded retry with exponential backoff for idempotent store reads.
//!
//! Only reads go through [`ReadRetry`]: a mutation that failed with an
//! ambiguous error may have committed, so retrying it blindly could apply
//! it twice. Mutations are resolved by the join coordinator and the
//! reconciliation sweep instead.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::StoreError;

/// Retry policy for idempotent reads.
#[derive(Debug, Clone, Copy)]
pub struct ReadRetry {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for ReadRetry {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

impl ReadRetry {
    /// Creates a policy making at most `attempts` tries (at least one).
    #[must_use]
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(2),
        }
    }

    /// Policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Maximum number of tries.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry` capped
    /// at the maximum, plus up to 50% random jitter.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay);
        let jitter_cap = u64::try_from(exp.as_millis() / 2).unwrap_or(0);
        if jitter_cap == 0 {
            return exp;
        }
        let jitter = rand::thread_rng().gen_range(0..=jitter_cap);
        exp.saturating_add(Duration::from_millis(jitter))
    }

    /// Runs `op`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient error, or the last error once the
    /// attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if retry > 0 {
                        tracing::debug!(what, retry, "store read succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && retry + 1 < self.attempts => {
                    let delay = self.delay_for(retry);
                    tracing::warn!(what, retry, ?delay, error = %e, "transient store error, retrying");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn delay_grows_and_caps() {
        let policy = ReadRetry::new(10, Duration::from_millis(100));
        let first = policy.delay_for(0);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        let capped = policy.delay_for(20);
        assert!(capped >= Duration::from_secs(2) && capped <= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = ReadRetry::new(3, Duration::from_millis(1));
        let counter = Arc::clone(&calls);
        let result = policy
            .run("lookup", || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result.ok(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = ReadRetry::new(5, Duration::from_millis(1))
            .run("lookup", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::Corrupt("bad row".to_string()))
                }
            })
            .await;
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = ReadRetry::new(3, Duration::from_millis(1))
            .run("lookup", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::Database(sqlx::Error::PoolTimedOut))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
