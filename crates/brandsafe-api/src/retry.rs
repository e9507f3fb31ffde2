//! Per-batch retry with fixed or exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use brandsafe_core::config::{BackoffStrategy, FetchConfig};
use tokio_util::sync::CancellationToken;

use crate::traits::Retryable;

/// Delay before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^(retry - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before the given retry (1 for the first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// How often and how patiently a failing batch is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

/// Terminal result of running an operation under a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome<T> {
    Success { value: T, attempts: u32 },
    /// Transient failures persisted past the retry budget, or cancellation
    /// interrupted a backoff.
    Exhausted { attempts: u32, reason: String },
    /// A non-transient failure; not retried.
    Rejected { attempts: u32, reason: String },
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        let backoff = match config.backoff_strategy {
            BackoffStrategy::Fixed => Backoff::Fixed(config.backoff()),
            BackoffStrategy::Exponential => Backoff::Exponential {
                base: config.backoff(),
                max: config.max_backoff(),
            },
        };
        Self {
            max_retries: config.max_retries,
            backoff,
        }
    }

    /// Run `op` until it succeeds, fails permanently or runs out of retries.
    ///
    /// `op` receives the 1-based attempt number. Backoff sleeps end early when
    /// `cancel` fires, which exhausts the operation.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> BatchOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(op = label, attempt, "Succeeded after retry");
                    }
                    return BatchOutcome::Success {
                        value,
                        attempts: attempt,
                    };
                }
                Err(err) => err,
            };

            if !err.is_transient() {
                return BatchOutcome::Rejected {
                    attempts: attempt,
                    reason: err.to_string(),
                };
            }

            if attempt > self.max_retries {
                return BatchOutcome::Exhausted {
                    attempts: attempt,
                    reason: err.to_string(),
                };
            }

            let delay = self.backoff.delay(attempt);
            tracing::warn!(
                op = label,
                attempt,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, will retry after backoff"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return BatchOutcome::Exhausted {
                        attempts: attempt,
                        reason: format!("cancelled during backoff after: {err}"),
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
