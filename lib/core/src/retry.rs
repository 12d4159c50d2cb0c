//! Explicit retry policy for collaborator calls.
//!
//! Callers pass the policy and a [`Sleeper`] at the call site. The sleeper
//! also supplies the jitter sample, so tests inject a [`RecordingSleeper`]
//! and get neither real waits nor random delays.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);

    /// Uniform sample in [0, 1) scaling the jitter of the next delay
    fn jitter_sample(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and remembers every requested delay. Jitter uses a
/// fixed sample, 0.5 (no scaling) unless set.
#[derive(Debug)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
    jitter_sample: f64,
}

impl Default for RecordingSleeper {
    fn default() -> Self {
        Self {
            delays: Mutex::new(Vec::new()),
            jitter_sample: 0.5,
        }
    }
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_jitter_sample(mut self, sample: f64) -> Self {
        self.jitter_sample = sample;
        self
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }

    fn jitter_sample(&self) -> f64 {
        self.jitter_sample
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Scale each delay by a random factor in [0.5, 1.5)
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 2_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: delay.as_millis() as u64,
            multiplier: 1.0,
            max_delay_ms: delay.as_millis() as u64,
            jitter: false,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retrying after the `failed_attempt`-th failure (1-based).
    /// `jitter_sample` is expected in [0, 1) and only used when jitter is on.
    pub fn delay_for(&self, failed_attempt: u32, jitter_sample: f64) -> Duration {
        let exponent = failed_attempt.saturating_sub(1) as i32;
        let base = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.max_delay_ms as f64);
        let scaled = if self.jitter {
            capped * (0.5 + jitter_sample.clamp(0.0, 1.0))
        } else {
            capped
        };
        Duration::from_millis(scaled.round() as u64)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are exhausted. The last error is returned.
    pub async fn run<T, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        operation: &str,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.delay_for(attempt, sleeper.jitter_sample());
                    warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "call failed, retrying"
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 300,
            jitter: false,
        }
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(1, 0.0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2, 0.0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3, 0.0), Duration::from_millis(300));
        assert_eq!(policy.delay_for(9, 0.0), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_range() {
        let policy = RetryPolicy { jitter: true, ..no_jitter() };
        assert_eq!(policy.delay_for(1, 0.0), Duration::from_millis(50));
        assert_eq!(policy.delay_for(1, 0.5), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_retries_transient_errors_then_succeeds() {
        let policy = no_jitter();
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = policy
            .run(&sleeper, "embed", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(Error::EmbeddingUnavailable("connection refused".into()))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn test_jitter_sample_comes_from_the_sleeper() {
        let policy = RetryPolicy { jitter: true, ..no_jitter() };
        let sleeper = RecordingSleeper::new().with_jitter_sample(0.0);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let _: Result<()> = policy
            .run(&sleeper, "embed", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Transport("reset".into()))
            })
            .await;

        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_millis(50),
                Duration::from_millis(100),
                Duration::from_millis(150)
            ]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = no_jitter();
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<()> = policy
            .run(&sleeper, "embed", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::EmbeddingUnavailable("down".into()))
            })
            .await;

        assert!(matches!(result, Err(Error::EmbeddingUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(sleeper.delays().len(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<()> = no_jitter()
            .run(&sleeper, "propose", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::ProposalFailure("missing categories".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_none_policy_is_single_attempt() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let _: Result<()> = RetryPolicy::none()
            .run(&sleeper, "x", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Store("down".into()))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
