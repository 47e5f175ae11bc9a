//! Cancellation helpers shared by providers.
//!
//! Every backend call is raced against the caller's token. A canceled call is
//! abandoned, never retried.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Marker returned when the token fired before the future completed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Canceled;

/// Runs `future` unless `ctx` is, or becomes, canceled first.
pub(crate) async fn until_canceled<F>(
    ctx: &CancellationToken,
    future: F,
) -> Result<F::Output, Canceled>
where
    F: Future,
{
    tokio::select! {
        biased;
        () = ctx.cancelled() => Err(Canceled),
        output = future => Ok(output),
    }
}

/// Sleeps for `interval`, waking early on cancellation.
pub(crate) async fn pause(ctx: &CancellationToken, interval: Duration) -> Result<(), Canceled> {
    until_canceled(ctx, tokio::time::sleep(interval)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completed_future_wins_when_not_canceled() {
        let ctx = CancellationToken::new();
        assert_eq!(until_canceled(&ctx, async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn canceled_token_wins_over_pending_future() {
        let ctx = CancellationToken::new();
        ctx.cancel();
        let result = until_canceled(&ctx, std::future::pending::<()>()).await;
        assert_eq!(result, Err(Canceled));
    }

    #[tokio::test]
    async fn pause_wakes_on_cancellation() {
        let ctx = CancellationToken::new();
        let trigger = ctx.clone();
        tokio::spawn(async move { trigger.cancel() });
        assert_eq!(pause(&ctx, Duration::from_secs(3600)).await, Err(Canceled));
    }
}
