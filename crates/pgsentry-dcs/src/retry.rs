//! Exponential retry helper (spec §5).
//!
//! Polls a predicate with an initial 1s delay, grown by `1.1x + U(0, 0.1)`
//! each attempt, capped to whatever remains of the overall timeout. Returns
//! as soon as the predicate yields `Some`, or `None` once the timeout
//! elapses. `timeout = None` means unbounded: the only way out is a
//! `Some` result or the passed-in [`CancellationToken`] firing (the
//! Controller ties this to SIGTERM).

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const GROWTH_FACTOR: f64 = 1.1;
const JITTER_MAX: f64 = 0.1;

/// Outcome of a bounded retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// The predicate returned `Some(value)` before the deadline.
    Ready(T),
    /// The deadline elapsed without a `Some` result.
    TimedOut,
    /// The cancellation token fired before the deadline.
    Cancelled,
}

impl<T> RetryOutcome<T> {
    #[must_use]
    pub fn ready(self) -> Option<T> {
        match self {
            RetryOutcome::Ready(v) => Some(v),
            RetryOutcome::TimedOut | RetryOutcome::Cancelled => None,
        }
    }
}

/// Polls `predicate` until it returns `Some`, `timeout` elapses, or
/// `cancel` fires. Pass `timeout = None` for an unbounded wait.
pub async fn retry_until<F, Fut, T>(
    mut predicate: F,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
    let mut delay = INITIAL_DELAY;

    loop {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled;
        }

        if let Some(value) = predicate().await {
            return RetryOutcome::Ready(value);
        }

        let remaining = match deadline {
            Some(d) => {
                let now = tokio::time::Instant::now();
                if now >= d {
                    return RetryOutcome::TimedOut;
                }
                Some(d - now)
            }
            None => None,
        };

        let sleep_for = match remaining {
            Some(r) => delay.min(r),
            None => delay,
        };

        tokio::select! {
            () = tokio::time::sleep(sleep_for) => {}
            () = cancel.cancelled() => return RetryOutcome::Cancelled,
        }

        let jitter = rand::thread_rng().gen_range(0.0..JITTER_MAX);
        delay = delay.mul_f64(GROWTH_FACTOR + jitter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn returns_ready_on_first_success() {
        let cancel = CancellationToken::new();
        let outcome = retry_until(|| async { Some(42) }, Some(Duration::from_secs(5)), &cancel).await;
        assert_eq!(outcome.ready(), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_predicate_never_succeeds() {
        let cancel = CancellationToken::new();
        let outcome: RetryOutcome<()> =
            retry_until(|| async { None }, Some(Duration::from_secs(3)), &cancel).await;
        assert_eq!(outcome, RetryOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome: RetryOutcome<()> = retry_until(|| async { None }, None, &cancel).await;
        assert_eq!(outcome, RetryOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_several_attempts() {
        let cancel = CancellationToken::new();
        let attempts = AtomicU32::new(0);
        let outcome = retry_until(
            || async {
                if attempts.fetch_add(1, Ordering::SeqCst) >= 2 {
                    Some(())
                } else {
                    None
                }
            },
            Some(Duration::from_secs(30)),
            &cancel,
        )
        .await;
        assert_eq!(outcome.ready(), Some(()));
        assert!(attempts.load(Ordering::SeqCst) >= 3);
    }
}
