//! Fixed-interval polling.
//!
//! Waiters in this crate never block the transport: they re-check in-memory
//! state (or issue a cheap command) every poll interval until the condition
//! holds or the deadline passes. Expiry yields `None`, not an error.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::error::Result;

/// Polls `check` until it yields `Some`, an error, or `timeout` elapses.
///
/// `check` runs at least once, even with a zero timeout.
pub(crate) async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(value) = check().await? {
            return Ok(Some(value));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;

    #[tokio::test(start_paused = true)]
    async fn test_returns_when_ready() {
        let mut calls = 0;
        let result = poll_until(Duration::from_millis(100), Duration::from_secs(5), || {
            calls += 1;
            let ready = calls == 3;
            async move { Ok(ready.then_some(calls)) }
        })
        .await
        .expect("ok");

        assert_eq!(result, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_none() {
        let result: Option<()> =
            poll_until(Duration::from_millis(100), Duration::from_millis(350), || async {
                Ok(None)
            })
            .await
            .expect("ok");

        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_short_circuits() {
        let result: Result<Option<()>> =
            poll_until(Duration::from_millis(100), Duration::from_secs(1), || async {
                Err(Error::ConnectionClosed)
            })
            .await;

        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }
}
