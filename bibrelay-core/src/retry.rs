//! Fixed-delay retry for short-lived I/O contention.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default number of attempts, including the first.
pub const DEFAULT_ATTEMPTS: u8 = 3;

/// Default pause between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u8,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay_ms: DEFAULT_DELAY.as_millis() as u64,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u8, delay: Duration) -> Self {
        Self {
            attempts,
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Retry every I/O failure.
    pub async fn retry_io<T, F, Fut>(&self, op: F) -> std::io::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::io::Result<T>>,
    {
        self.retry_with(op, |_| true).await
    }

    /// Run `op` until it succeeds, `should_retry` declines the error, or
    /// the attempts are used up. The last error is returned.
    pub async fn retry_with<T, E, F, Fut, P>(
        &self,
        mut op: F,
        should_retry: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && should_retry(&err) => {
                    debug!(attempt, max = attempts, error = %err, "retrying after failure");
                    attempt += 1;
                    tokio::time::sleep(self.delay()).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicU8, Ordering};

    use super::*;

    fn fast() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let counter = AtomicU8::new(0);
        let calls = &counter;
        let result = fast()
            .retry_io(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(io::Error::new(io::ErrorKind::WouldBlock, "busy"))
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_configured_attempts() {
        let counter = AtomicU8::new(0);
        let calls = &counter;
        let result: io::Result<()> = fast()
            .retry_io(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(io::Error::other("still busy"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let counter = AtomicU8::new(0);
        let calls = &counter;
        let result: io::Result<()> = fast()
            .retry_with(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
                },
                |err| err.kind() != io::ErrorKind::PermissionDenied,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"delay_ms": 50}"#).unwrap();
        assert_eq!(policy.attempts, DEFAULT_ATTEMPTS);
        assert_eq!(policy.delay(), Duration::from_millis(50));
    }
}
