//! One retry policy shared by every network entry point.

use crate::error::{InstallError, InstallResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Small metadata documents (catalog, loader lists, profiles).
    pub fn catalog() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(250),
        }
    }

    /// Large artifacts are not retried blindly; the next run resumes from the verified cache.
    pub fn artifact() -> Self {
        Self::once()
    }

    pub fn subprocess() -> Self {
        Self::once()
    }

    fn once() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Exponential backoff with random jitter before attempt `attempt + 1`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return backoff;
        }
        backoff + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> InstallResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = InstallResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && is_transient(&e) => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms...",
                        label,
                        attempt,
                        attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Connection failures and server-side statuses; client errors are final.
fn is_transient(err: &InstallError) -> bool {
    match err {
        InstallError::Network { .. } => true,
        InstallError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = fast(4)
            .run("lookup", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(InstallError::HttpStatus {
                        url: "u".into(),
                        status: 503,
                    })
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_cancellation_or_not_found() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = fast(4)
            .run("lookup", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(InstallError::Cancelled)
            })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = fast(4)
            .run("lookup", || async {
                Err::<(), _>(InstallError::HttpStatus {
                    url: "u".into(),
                    status: 404,
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::HttpStatus { status: 404, .. }));
    }

    #[test]
    fn presets() {
        assert_eq!(RetryPolicy::catalog().max_attempts, 4);
        assert_eq!(RetryPolicy::artifact().max_attempts, 1);
        assert_eq!(RetryPolicy::subprocess().max_attempts, 1);
    }
}
