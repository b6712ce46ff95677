//! # Unit-of-Work Retry
//!
//! Optimistic writes fail with [`DbError::Conflict`] when another session
//! changed the rows first. The whole unit of work is then re-run from the
//! top (re-read, re-check, re-write) after an exponential backoff.
//!
//! ```text
//! attempt 1 ──► Conflict ──► sleep ~50ms ──► attempt 2 ──► Conflict
//!          ──► sleep ~100ms ──► attempt 3 ──► Ok(T)
//!
//! attempt == max_attempts and still Conflict ──► CommitFailed { attempts }
//! ```
//!
//! Business rejections (`OutOfStock`, `InvalidAmount`, ...) are returned
//! immediately; they would fail the same way on every attempt.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};

/// How hard a unit of work tries before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Minimum 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None, // bounded by max_attempts instead
            ..Default::default()
        }
    }
}

/// Runs `attempt` until it succeeds, fails with a non-conflict error, or
/// the policy's attempts are used up.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut attempt: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.create_backoff();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match attempt().await {
            Err(err) if err.is_conflict() => {
                if attempts >= max_attempts {
                    warn!(operation, attempts, "Giving up after repeated write conflicts");
                    return Err(DbError::CommitFailed { attempts });
                }

                let delay = backoff.next_backoff().unwrap_or(policy.max_backoff);
                warn!(operation, attempt = attempts, ?delay, error = %err, "Write conflict, retrying");
                tokio::time::sleep(delay).await;
            }
            result => {
                if attempts > 1 {
                    debug!(operation, attempts, ok = result.is_ok(), "Unit of work settled after retry");
                }
                return result;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitstop_core::StockError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retries_conflicts_then_succeeds() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(&fast(), "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DbError::conflict("stock changed"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_with_commit_failed() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: DbResult<()> = with_retry(&fast(), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(DbError::conflict("stock changed"))
        })
        .await;

        assert!(matches!(result, Err(DbError::CommitFailed { attempts: 3 })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: DbResult<()> = with_retry(&fast(), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StockError::invalid_item("empty").into())
        })
        .await;

        assert!(matches!(result, Err(DbError::Stock(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
