//! Runtime-agnostic utility functions
//!
//! These wrap the timer primitives of the enabled runtime so callers do not
//! repeat cfg-flag patterns. When both runtime features are enabled, smol
//! takes precedence.

use crate::Elapsed;
use std::future::Future;
use std::time::Duration;

/// Sleep for the specified duration using the current runtime
pub async fn sleep(duration: Duration) {
    #[cfg(feature = "smol")]
    {
        smol::Timer::after(duration).await;
    }

    #[cfg(all(feature = "tokio", not(feature = "smol")))]
    {
        tokio::time::sleep(duration).await;
    }

    #[cfg(not(any(feature = "smol", feature = "tokio")))]
    {
        compile_error!("One of the runtime features must be enabled: smol or tokio");
    }
}

/// Run `future` to completion unless `duration` elapses first
///
/// The future is dropped when the deadline wins, which cancels any work it
/// owns (child processes spawned with kill-on-drop, pending I/O).
pub async fn timeout<F>(duration: Duration, future: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    #[cfg(feature = "smol")]
    {
        smol::future::or(async { Ok(future.await) }, async {
            smol::Timer::after(duration).await;
            Err(Elapsed::new(duration))
        })
        .await
    }

    #[cfg(all(feature = "tokio", not(feature = "smol")))]
    {
        tokio::time::timeout(duration, future)
            .await
            .map_err(|_| Elapsed::new(duration))
    }

    #[cfg(not(any(feature = "smol", feature = "tokio")))]
    {
        compile_error!("One of the runtime features must be enabled: smol or tokio");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[cfg(feature = "smol")]
    #[test]
    fn test_sleep() {
        smol::block_on(async {
            let start = Instant::now();
            sleep(Duration::from_millis(100)).await;
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(100));
            assert!(elapsed < Duration::from_millis(1000));
        });
    }

    #[cfg(feature = "smol")]
    #[smol_potat::test]
    async fn test_timeout_completes() {
        let value = timeout(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(value, Ok(7));
    }

    #[cfg(feature = "smol")]
    #[smol_potat::test]
    async fn test_timeout_elapses_on_pending_future() {
        let start = Instant::now();
        let result = timeout(
            Duration::from_millis(50),
            std::future::pending::<()>(),
        )
        .await;
        assert_eq!(result, Err(Elapsed::new(Duration::from_millis(50))));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
