//! Per-call retry with exponential backoff, per-call timeouts, and a
//! retry budget shared by every call of one job.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_retry2::strategy::{jitter, ExponentialFactorBackoff};
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::services::ServiceError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: bool,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig, call_timeout: Duration) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            jitter: config.jitter,
            call_timeout,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delays before each retry: doubling from `initial_backoff`, capped at
    /// `max_backoff`, optionally jittered.
    pub fn delays(&self) -> Vec<Duration> {
        let initial_ms = u64::try_from(self.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let backoff = ExponentialFactorBackoff::from_millis(initial_ms, 2.0)
            .max_delay(self.max_backoff)
            .take(self.max_retries as usize);

        if self.jitter {
            backoff.map(jitter).collect()
        } else {
            backoff.collect()
        }
    }
}

/// Retries left for one job. Shared by every concurrent scene task.
#[derive(Debug)]
pub struct RetryBudget {
    remaining: AtomicU32,
}

impl RetryBudget {
    pub fn new(total: u32) -> Self {
        Self {
            remaining: AtomicU32::new(total),
        }
    }

    /// Takes one retry from the budget. Returns `false` once it is spent.
    pub fn try_consume(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }
}

/// Notified as attempts are made, so stage state can track retries.
pub trait RetryObserver: Send + Sync {
    /// A failed attempt will be retried.
    fn retry_scheduled(&self, label: &str, attempt: u32, error: &ServiceError);

    /// An attempt after the first is starting.
    fn retry_started(&self, label: &str, attempt: u32);
}

pub struct NoRetryObserver;

impl RetryObserver for NoRetryObserver {
    fn retry_scheduled(&self, _label: &str, _attempt: u32, _error: &ServiceError) {}

    fn retry_started(&self, _label: &str, _attempt: u32) {}
}

/// Runs collaborator calls under a [`RetryPolicy`].
pub struct Retrier<'a> {
    policy: &'a RetryPolicy,
    budget: &'a RetryBudget,
    observer: &'a dyn RetryObserver,
}

impl<'a> Retrier<'a> {
    pub fn new(
        policy: &'a RetryPolicy,
        budget: &'a RetryBudget,
        observer: &'a dyn RetryObserver,
    ) -> Self {
        Self {
            policy,
            budget,
            observer,
        }
    }

    /// Calls `operation` until it succeeds, fails permanently, runs out of
    /// attempts, or the job's budget is spent. Each attempt is bounded by
    /// the policy's call timeout; a timeout counts as a retryable failure.
    pub async fn run<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, ServiceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let attempts = AtomicU32::new(0);
        let operation = &operation;
        let attempts = &attempts;
        let max_retries = self.policy.max_retries;
        let call_timeout = self.policy.call_timeout;
        let budget = self.budget;
        let observer = self.observer;

        Retry::spawn(self.policy.delays(), move || async move {
            let attempt = attempts.fetch_add(1, Ordering::AcqRel) + 1;
            if attempt > 1 {
                observer.retry_started(label, attempt);
            }

            let result = match tokio::time::timeout(call_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::timeout(call_timeout)),
            };

            match result {
                Ok(value) => Ok(value),
                Err(err) if !err.is_retryable() => {
                    warn!(call = label, attempt, error = %err, "Permanent failure, not retrying");
                    Err(RetryError::Permanent(err))
                }
                Err(err) if attempt > max_retries => {
                    warn!(call = label, attempt, error = %err, "Retries exhausted");
                    Err(RetryError::Permanent(err))
                }
                Err(err) if !budget.try_consume() => {
                    warn!(call = label, attempt, error = %err, "Job retry budget spent");
                    Err(RetryError::Permanent(err))
                }
                Err(err) => {
                    debug!(
                        call = label,
                        attempt,
                        budget_left = budget.remaining(),
                        error = %err,
                        "Transient failure, will retry"
                    );
                    observer.retry_scheduled(label, attempt, &err);
                    Err(RetryError::Transient {
                        err,
                        retry_after: None,
                    })
                }
            }
        })
        .await
    }
}
