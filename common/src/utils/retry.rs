use std::{future::Future, time::Duration};

use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::warn;

use crate::error::AppError;

use super::config::AppConfig;

/// Capped exponential backoff for calls against the storage collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delays between attempts before jitter: base, 2*base, 4*base ... capped at `max_delay`.
    fn backoff(&self) -> impl Iterator<Item = Duration> {
        let half_base = u64::try_from(self.base_delay.as_millis() / 2)
            .unwrap_or(u64::MAX)
            .max(1);
        ExponentialBackoff::from_millis(2)
            .factor(half_base)
            .max_delay(self.max_delay)
            .take(self.max_attempts.saturating_sub(1))
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        self.backoff().map(jitter)
    }

    /// Runs `action` until it succeeds, fails with a non-transient error, or the attempt budget
    /// is spent. The final error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, action: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        RetryIf::spawn(self.delays(), action, |err: &AppError| {
            let retry = err.is_transient();
            if retry {
                warn!(operation, error = %err, "transient storage failure, retrying");
            }
            retry
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy(3)
            .run("get", || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(AppError::Io(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "timed out",
                        )))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("third attempt succeeds"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget_and_returns_last_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), AppError> = fast_policy(3)
            .run("get", || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(AppError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("attempt {attempt}"),
                    )))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(AppError::Io(err)) => assert_eq!(err.to_string(), "attempt 2"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn does_not_retry_not_found() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), AppError> = fast_policy(5)
            .run("get", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::NotFound("missing".into())) }
            })
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delays_double_and_are_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(3000),
        };
        let backoff: Vec<Duration> = policy.backoff().collect();

        assert_eq!(
            backoff,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(3000),
                Duration::from_millis(3000),
                Duration::from_millis(3000),
            ]
        );
        let jittered: Vec<Duration> = policy.delays().collect();
        assert_eq!(jittered.len(), backoff.len());
        assert!(jittered
            .iter()
            .zip(&backoff)
            .all(|(delay, ceiling)| delay <= ceiling));
        assert_eq!(RetryPolicy::none().delays().count(), 0);
    }
}
