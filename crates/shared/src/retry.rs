//! Retry helpers with exponential backoff.
//!
//! Two flavours exist: [`RetryPolicy`] bounds the number of attempts only,
//! [`RetryBudget`] additionally bounds the total wall-clock time spent.
//! Only errors classified as retriable are retried; cancellation always
//! stops the loop.

use crate::context::cancelled_error;
use crate::timeout::sleep_with_context;
use crate::{ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Attempt-bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first try.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Delay slept after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`, capped.
    #[must_use]
    pub fn delay_after(self, attempt: u32) -> Duration {
        Duration::from_millis(exponential(
            self.base_delay_ms,
            attempt.saturating_sub(1),
            self.max_delay_ms,
        ))
    }
}

/// Retry bounded by a retry count and an overall time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Total wall-clock budget in milliseconds, measured from the first attempt.
    pub budget_ms: u64,
}

impl RetryBudget {
    /// Delay before retry number `retry` (0-based): `min(base * 2^retry, max)`.
    #[must_use]
    pub fn delay_for(self, retry: u32) -> Duration {
        Duration::from_millis(exponential(self.base_delay_ms, retry, self.max_delay_ms))
    }
}

fn exponential(base_ms: u64, exponent: u32, cap_ms: u64) -> u64 {
    base_ms
        .saturating_mul(1u64 << exponent.min(32))
        .min(cap_ms)
}

/// Result of a budgeted retry loop.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Final value or last error.
    pub result: Result<T>,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// True when the loop stopped because the count or time budget ran out.
    pub exhausted: bool,
}

/// Retry a fallible async operation under `policy`.
pub async fn retry_async<T, F, Fut>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_async_with_observer(ctx, policy, operation, &mut op, |_, _| {}).await
}

/// Like [`retry_async`], invoking `on_retry(attempt, error)` before each backoff.
pub async fn retry_async_with_observer<T, F, Fut, Obs>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    op: &mut F,
    mut on_retry: Obs,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    Obs: FnMut(u32, &ErrorEnvelope),
{
    let mut attempt = 0u32;
    loop {
        attempt = attempt.saturating_add(1);
        ctx.ensure_not_cancelled(operation)?;

        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if error.is_cancelled() || !error.is_retriable() || attempt >= policy.max_attempts {
            return Err(error);
        }

        on_retry(attempt, &error);
        sleep_with_context(ctx, policy.delay_after(attempt), operation).await?;
    }
}

/// Retry under a [`RetryBudget`]; never sleeps past the budget.
///
/// A retry is skipped, and the loop reports `exhausted`, when the elapsed
/// time plus the next delay would exceed `budget_ms`.
pub async fn retry_within_budget<T, F, Fut, Obs>(
    ctx: &RequestContext,
    budget: RetryBudget,
    operation: &'static str,
    mut op: F,
    mut on_retry: Obs,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    Obs: FnMut(u32, &ErrorEnvelope, Duration),
{
    let started = Instant::now();
    let limit = Duration::from_millis(budget.budget_ms);
    let mut attempts = 0u32;

    loop {
        if ctx.is_cancelled() {
            return RetryOutcome {
                result: Err(cancelled_error(operation)),
                attempts,
                exhausted: false,
            };
        }

        attempts = attempts.saturating_add(1);
        let error = match op().await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                    exhausted: false,
                };
            },
            Err(error) => error,
        };

        if error.is_cancelled() || !error.is_retriable() {
            return RetryOutcome {
                result: Err(error),
                attempts,
                exhausted: false,
            };
        }

        let retry = attempts - 1;
        let delay = budget.delay_for(retry);
        if retry >= budget.max_retries || started.elapsed() + delay > limit {
            return RetryOutcome {
                result: Err(error),
                attempts,
                exhausted: true,
            };
        }

        on_retry(attempts, &error, delay);
        if let Err(cancelled) = sleep_with_context(ctx, delay, operation).await {
            return RetryOutcome {
                result: Err(cancelled),
                attempts,
                exhausted: false,
            };
        }
    }
}
