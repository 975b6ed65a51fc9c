//! Bounded retry for transient storage conflicts.
//!
//! Only [`AppError::TransientConflict`] is retried by [`RetryPolicy::run`];
//! every business-rule error is returned to the caller on the first attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::utils::error::AppError;

/// Exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_coefficient: f64,
    /// Jitter factor in `0.0..=1.0`; 0.2 means ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transient()
    }
}

impl RetryPolicy {
    /// Short backoff suited to row-lock and serialization conflicts.
    pub fn transient() -> Self {
        Self {
            max_attempts: 4,
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(200),
            backoff_coefficient: 2.0,
            jitter: 0.2,
        }
    }

    /// Slower backoff for calls to outside services.
    pub fn external() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            backoff_coefficient: 2.0,
            jitter: 0.2,
        }
    }

    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay to wait before `attempt` (1-based). The first attempt never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let retry_num = attempt - 1;
        let base = self.initial_interval.as_secs_f64()
            * self.backoff_coefficient.powi(retry_num as i32 - 1);
        let capped = base.min(self.max_interval.as_secs_f64());

        let jitter_range = capped * self.jitter;
        let jittered = if jitter_range > 0.0 {
            let offset = rand::thread_rng().gen_range(-jitter_range..jitter_range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }

    /// Runs `op`, retrying transient conflicts. Exhaustion surfaces as a
    /// generic internal failure.
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        self.run_while(operation, AppError::is_transient, op).await
    }

    /// Like [`run`](Self::run) with a caller-chosen retry predicate.
    pub async fn run_while<T, F, Fut, P>(
        &self,
        operation: &str,
        retryable: P,
        mut op: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
        P: Fn(&AppError) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(err) if retryable(&err) => {
                    if attempt >= self.max_attempts {
                        warn!(operation, attempts = attempt, error = %err, "Giving up after retries");
                        return Err(AppError::InternalServerError(format!(
                            "{} failed after {} attempts: {}",
                            operation, attempt, err
                        )));
                    }
                    attempt += 1;
                    let delay = self.delay_for_attempt(attempt);
                    debug!(operation, attempt, ?delay, error = %err, "Retrying");
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}
