//! Bounded exponential-backoff retry for store operations

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::{Result, SidebarError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// How many times to try a store operation and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Wait before the second attempt; doubles after each failure
    pub base_delay:   Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay:   DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): `base × 2^(attempt-1)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out
///
/// Quota exhaustion is surfaced immediately. Errors that are not store
/// failures (validation, not-found, bad payloads) are returned as-is. The last
/// transient error is propagated unchanged once the budget is spent.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_quota_exceeded() => {
                warn!("Store quota exceeded on attempt {}", attempt);
                return Err(SidebarError::QuotaExceededError);
            },
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if attempt >= policy.max_attempts => {
                warn!(attempts = attempt, "Store operation failed: {}", err);
                return Err(err);
            },
            Err(err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying store operation after error: {}",
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use rusqlite::ffi;
    use tokio::time::Instant;

    use super::*;
    use crate::errors::RecordKind;

    fn busy() -> SidebarError {
        rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        )
        .into()
    }

    fn full() -> SidebarError {
        rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_FULL), None).into()
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_with_backoff() {
        let start = Instant::now();
        let attempts = Mutex::new(Vec::new());

        let result = run_with_retry(&RetryPolicy::default(), || {
            let offsets = {
                let mut offsets = attempts.lock().unwrap();
                offsets.push(start.elapsed());
                offsets.len()
            };
            async move {
                if offsets < 3 {
                    Err(busy())
                } else {
                    Ok("saved")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "saved");
        let offsets = attempts.into_inner().unwrap();
        assert_eq!(offsets.len(), 3);
        assert_eq!(offsets[1] - offsets[0], Duration::from_millis(100));
        assert_eq!(offsets[2] - offsets[1], Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_is_not_retried() {
        let start = Instant::now();
        let calls = AtomicU32::new(0);

        let result: Result<()> = run_with_retry(&RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(full()) }
        })
        .await;

        assert!(matches!(result, Err(SidebarError::QuotaExceededError)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = run_with_retry(&RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(busy()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(SidebarError::DatabaseError(err)) => {
                assert!(err.to_string().contains("locked"));
            },
            other => panic!("Expected DatabaseError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = run_with_retry(&RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(SidebarError::NotFoundError {
                    kind: RecordKind::Conversation,
                    id:   9,
                })
            }
        })
        .await;

        assert!(matches!(result, Err(SidebarError::NotFoundError { id: 9, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay:   Duration::from_millis(5),
        };

        let result: Result<()> = run_with_retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(busy()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
