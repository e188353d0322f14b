//! Cancellation-aware timeouts and sleeps.

use crate::context::cancelled_error;
use crate::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::Duration;

/// Run `fut` with a deadline, failing early if `ctx` is cancelled.
pub async fn timeout_with_context<T, F>(
    ctx: &RequestContext,
    timeout: Duration,
    operation: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    ctx.ensure_not_cancelled(operation)?;

    tokio::select! {
        () = ctx.cancelled() => Err(cancelled_error(operation)),
        res = tokio::time::timeout(timeout, fut) => {
            res.unwrap_or_else(|_| Err(timeout_error(operation, timeout)))
        }
    }
}

/// Sleep for `delay`, returning a cancellation error if `ctx` is cancelled first.
pub async fn sleep_with_context(
    ctx: &RequestContext,
    delay: Duration,
    operation: &'static str,
) -> Result<()> {
    tokio::select! {
        () = ctx.cancelled() => Err(cancelled_error(operation)),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

fn timeout_error(operation: &'static str, timeout: Duration) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::timeout(),
        format!("{operation} timed out after {}ms", timeout.as_millis()),
        ErrorClass::Retriable,
    )
    .with_metadata("operation", operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_produces_retriable_timeout() {
        let ctx = RequestContext::new_request();
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ErrorEnvelope>(())
        };

        let result = timeout_with_context(&ctx, Duration::from_secs(1), "probe", slow).await;
        assert!(matches!(result, Err(ref error) if error.code == ErrorCode::timeout() && error.is_retriable()));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_interrupted_by_cancellation() {
        let ctx = RequestContext::new_request();
        let sleeper = ctx.clone();
        let task = tokio::spawn(async move {
            sleep_with_context(&sleeper, Duration::from_secs(3600), "poll").await
        });

        tokio::task::yield_now().await;
        ctx.cancel();
        let result = match task.await {
            Ok(result) => result,
            Err(error) => panic!("sleeper task failed: {error}"),
        };
        assert!(matches!(result, Err(ref error) if error.is_cancelled()));
    }
}
