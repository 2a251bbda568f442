//! Bounded retry for network calls.
//!
//! Each call to [`with_retry`] is independent; nothing is shared between
//! invocations. Only completed failures are retried, and the caller decides
//! what to do once the attempts are exhausted.
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_last(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries including the first; 0 is treated as 1.
    pub max_attempts: u32,
    /// Pause between tries. Zero retries immediately.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::ZERO }
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` tries have failed.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => {
                if attempt > 1 {
                    debug!(op = label, attempt, attempts, "succeeded after retries");
                }
                return Ok(v);
            }
            Err(e) if attempt < attempts => {
                warn!(op = label, attempt, attempts, "attempt failed: {e}");
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
            Err(e) => {
                warn!(op = label, attempts, "retries exhausted: {e}");
                return Err(RetryError::Exhausted { attempts, last: e });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn succeeds_after_failures() {
        let calls = Cell::new(0);
        let policy = RetryPolicy { max_attempts: 3, delay: Duration::ZERO };
        let out = with_retry(&policy, "test", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { if n < 3 { Err("boom") } else { Ok(n) } }
        })
        .await;
        assert_eq!(out.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn reports_exhaustion_with_last_error() {
        let calls = Cell::new(0);
        let policy = RetryPolicy { max_attempts: 2, delay: Duration::ZERO };
        let out: Result<(), _> = with_retry(&policy, "test", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { Err(format!("fail {n}")) }
        })
        .await;
        let err = out.unwrap_err();
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.into_last(), "fail 2");
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let calls = Cell::new(0);
        let policy = RetryPolicy { max_attempts: 0, delay: Duration::ZERO };
        let _ = with_retry(&policy, "test", || {
            calls.set(calls.get() + 1);
            async { Err::<(), _>("no") }
        })
        .await;
        assert_eq!(calls.get(), 1);
    }
}
