//! Bounded exponential backoff shared by every "poll until done" call.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

pub use backoff::Error as RetryError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub randomization_factor: f64,
    /// Total time budget. Retrying stops once this much time has elapsed.
    pub max_elapsed: Duration,
}

impl RetryPolicy {
    pub fn with_timeout(max_elapsed: Duration) -> Self {
        Self {
            max_elapsed,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_interval)
            .with_randomization_factor(self.randomization_factor)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }

    /// Runs `operation` until it succeeds, fails permanently, or the time
    /// budget is spent. Returns the last error in the latter two cases.
    pub async fn retry<T, E, F, Fut>(&self, what: &str, operation: F) -> Result<T, E>
    where
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RetryError<E>>>,
    {
        let notify = |err: E, next: Duration| {
            tracing::info!(error = %err, retry_in = ?next, "{what}: retrying");
        };
        backoff::future::retry_notify(self.backoff(), operation, notify).await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            randomization_factor: 0.5,
            max_elapsed: Duration::from_secs(30),
        }
    }
}
