//! Bounded waits on an asynchronous control plane.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::error::{AdminError, AdminResult};

/// Poll-with-timeout budget for readiness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            interval: Duration::from_secs(2),
        }
    }
}

/// Bounded retry for transient control-plane errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first included.
    pub attempts: u32,
    /// Backoff before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Call `check` until it reports ready, sleeping `interval` between calls.
///
/// Transient check errors count as "not ready yet". Once `timeout` has
/// elapsed the wait fails with [`AdminError::Timeout`].
pub async fn poll_until<F, Fut>(op: &'static str, what: &str, policy: &WaitPolicy, mut check: F) -> AdminResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AdminResult<bool>>,
{
    let started = Instant::now();
    let mut polls = 0u32;
    loop {
        polls += 1;
        match check().await {
            Ok(true) => {
                debug!(%what, polls, "ready");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) if e.is_transient() => debug!(%what, error = %e, "not ready yet"),
            Err(e) => return Err(e),
        }

        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Err(AdminError::Timeout {
                op,
                waited,
                message: format!("{what} not ready after {polls} checks"),
            });
        }
        sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(timeout_ms: u64) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_check_is_ready() {
        let calls = &AtomicU32::new(0);
        poll_until("wait", "thing", &policy(1_000), || async move {
            Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2)
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_ready() {
        let err = poll_until("wait", "thing", &policy(50), || async { Ok(false) })
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Timeout { op: "wait", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_keep_polling() {
        let calls = &AtomicU32::new(0);
        poll_until("wait", "thing", &policy(1_000), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AdminError::not_ready("status", "converging"))
            } else {
                Ok(true)
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_stop_immediately() {
        let err = poll_until("wait", "thing", &policy(1_000), || async {
            Err::<bool, _>(AdminError::not_found("status", "gone"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AdminError::NotFound { .. }));
    }
}
