//! Polling-with-deadline wait primitives
//!
//! Every blocking wait in the crate shares one shape: read the predicate,
//! return on success, otherwise poll at a small interval until the
//! deadline. On timeout the caller either gets `false` back or a
//! `WaitTimeout` error, depending on the resolved raise flag.

use crate::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};

/// Default polling interval for waits
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

/// Poll `predicate` until it returns true or `timeout` elapses.
pub async fn wait_for<F, Fut>(
    mut predicate: F,
    timeout: Duration,
    interval: Duration,
    raise: bool,
    what: &str,
) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate().await {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return if raise {
                Err(Error::wait_timeout(format!("{} within {:?}", what, timeout)))
            } else {
                Ok(false)
            };
        }
        tokio::time::sleep(interval).await;
    }
}

/// Poll `predicate` until it yields a value or `timeout` elapses.
pub async fn wait_for_value<T, F, Fut>(
    mut predicate: F,
    timeout: Duration,
    interval: Duration,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = predicate().await {
            return Some(value);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Sample until two consecutive samples are equal, `gap` apart.
/// Used by `stop_moving`: the sample is an element's size and location.
pub async fn wait_until_stable<T, F, Fut>(
    mut sample: F,
    gap: Duration,
    timeout: Duration,
) -> Result<T>
where
    T: PartialEq,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut previous = sample().await?;
    loop {
        tokio::time::sleep(gap).await;
        let current = sample().await?;
        if current == previous {
            return Ok(current);
        }
        if Instant::now() >= deadline {
            return Err(Error::wait_timeout(format!(
                "samples never stabilised within {:?}",
                timeout
            )));
        }
        previous = current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_for_immediate_success() {
        let ok = wait_for(
            || async { true },
            Duration::from_millis(100),
            DEFAULT_INTERVAL,
            false,
            "noop",
        )
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_wait_for_eventual_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&counter);
        let started = Instant::now();
        let ok = wait_for(
            move || {
                let c = Arc::clone(&c);
                async move { c.fetch_add(1, Ordering::SeqCst) >= 3 }
            },
            Duration::from_secs(2),
            Duration::from_millis(20),
            false,
            "counter",
        )
        .await
        .unwrap();
        assert!(ok);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_wait_for_timeout_returns_false() {
        let ok = wait_for(
            || async { false },
            Duration::from_millis(80),
            Duration::from_millis(20),
            false,
            "never",
        )
        .await
        .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_wait_for_timeout_raises() {
        let err = wait_for(
            || async { false },
            Duration::from_millis(80),
            Duration::from_millis(20),
            true,
            "never",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::WaitTimeout(_)));
    }

    #[tokio::test]
    async fn test_wait_until_stable() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&counter);
        // Moves for the first three samples, then settles at 3.
        let value = wait_until_stable(
            move || {
                let c = Arc::clone(&c);
                async move { Ok(c.fetch_add(1, Ordering::SeqCst).min(3)) }
            },
            Duration::from_millis(10),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(value, 3);
    }
}
