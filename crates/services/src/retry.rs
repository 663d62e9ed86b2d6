//! Bounded re-read/recompute loop for optimistic-version conflicts.
//!
//! Only `StorageError::Conflict` is retried. Each attempt must re-read the
//! latest record itself, so there is nothing to wait for between attempts.
//! Connection failures go straight back to the caller.

use std::future::Future;

use crate::error::ProgressServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Run `f` until it succeeds, fails with a non-conflict error, or the
/// attempts run out. `f` receives the 1-based attempt number.
///
/// # Errors
///
/// Returns the first non-conflict error, or
/// `ProgressServiceError::ConflictRetriesExhausted` after `max_attempts`
/// consecutive conflicts.
pub async fn retry_on_conflict<F, Fut, T>(
    config: RetryConfig,
    operation: &'static str,
    mut f: F,
) -> Result<T, ProgressServiceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProgressServiceError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match f(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_conflict() => {
                if attempt >= max_attempts {
                    tracing::warn!(operation, attempts = attempt, "conflict retries exhausted");
                    return Err(ProgressServiceError::ConflictRetriesExhausted { attempts: attempt });
                }
                tracing::debug!(operation, attempt, "version conflict, re-reading");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use storage::repository::StorageError;

    #[tokio::test]
    async fn conflicts_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let res = retry_on_conflict(RetryConfig { max_attempts: 3 }, "test", |_| async {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ProgressServiceError::Storage(StorageError::Conflict))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(res.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let res: Result<(), _> = retry_on_conflict(RetryConfig { max_attempts: 2 }, "test", |_| async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ProgressServiceError::Storage(StorageError::Conflict))
        })
        .await;

        assert!(matches!(
            res,
            Err(ProgressServiceError::ConflictRetriesExhausted { attempts: 2 })
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn connection_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let res: Result<(), _> = retry_on_conflict(RetryConfig::default(), "test", |_| async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ProgressServiceError::Storage(StorageError::Connection("offline".into())))
        })
        .await;

        assert!(matches!(
            res,
            Err(ProgressServiceError::Storage(StorageError::Connection(_)))
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
