//! Bounded waits.
//!
//! Every UI assertion is a poll of a predicate with an interval and a
//! deadline. A predicate error propagates at once; only a `false` answer is
//! polled again.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::error::{DriverError, E2eError, E2eResult};

/// Deadline and interval of one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollPolicy {
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Default wait for clicks, overlay opening and assignee echo.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for saves to settle: overlays closing, rows (dis)appearing.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for elements to attach: the app shell, the assignee select.
pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for the initial navigation.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(45);

/// Default interval between predicate evaluations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default pause after a pagination click before reading the page.
pub const DEFAULT_PAGE_SETTLE: Duration = Duration::from_millis(150);

/// Timeouts used across a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Clicks, overlay opening, assignee echo.
    pub action: Duration,
    /// Overlays closing, rows appearing or disappearing, app shell attaching.
    pub settle: Duration,
    /// Initial navigation to the base URL.
    pub navigation: Duration,
    /// App shell and assignee select attaching.
    pub attach: Duration,
    pub poll_interval: Duration,
    /// Pause after each pagination click.
    pub page_settle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            action: DEFAULT_ACTION_TIMEOUT,
            settle: DEFAULT_SETTLE_TIMEOUT,
            navigation: DEFAULT_NAVIGATION_TIMEOUT,
            attach: DEFAULT_ATTACH_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            page_settle: DEFAULT_PAGE_SETTLE,
        }
    }
}

impl Timeouts {
    /// Timeouts small enough for in-memory test doubles.
    pub fn fast() -> Self {
        Self {
            action: Duration::from_millis(200),
            settle: Duration::from_millis(300),
            navigation: Duration::from_millis(300),
            attach: Duration::from_millis(300),
            poll_interval: Duration::from_millis(5),
            page_settle: Duration::ZERO,
        }
    }

    pub fn action(&self) -> PollPolicy {
        PollPolicy::new(self.action, self.poll_interval)
    }

    pub fn settle(&self) -> PollPolicy {
        PollPolicy::new(self.settle, self.poll_interval)
    }

    pub fn attach(&self) -> PollPolicy {
        PollPolicy::new(self.attach, self.poll_interval)
    }
}

/// Poll `predicate` until it reports `true` or the policy's deadline passes.
pub async fn wait_until<F, Fut>(
    what: &str,
    policy: PollPolicy,
    mut predicate: F,
) -> E2eResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, DriverError>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        if predicate().await? {
            trace!(what, attempts, "Condition satisfied");
            return Ok(());
        }
        if Instant::now() >= deadline {
            debug!(what, attempts, timeout_ms = policy.timeout.as_millis() as u64, "Wait timed out");
            return Err(E2eError::Timeout {
                what: what.to_string(),
                after: policy.timeout,
            });
        }
        sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(50), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_wait_until_succeeds_after_some_polls() {
        let calls = Cell::new(0u32);
        let result = wait_until("counter", quick(), || {
            calls.set(calls.get() + 1);
            let done = calls.get() >= 3;
            async move { Ok(done) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        let result = wait_until("never", quick(), || async { Ok(false) }).await;

        match result {
            Err(E2eError::Timeout { what, after }) => {
                assert_eq!(what, "never");
                assert_eq!(after, Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_until_propagates_driver_error_without_retry() {
        let calls = Cell::new(0u32);
        let result = wait_until("broken", quick(), || {
            calls.set(calls.get() + 1);
            async { Err(DriverError::Protocol("socket closed".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(E2eError::Driver(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.action, Duration::from_secs(10));
        assert_eq!(timeouts.settle, Duration::from_secs(30));
        assert_eq!(timeouts.navigation, Duration::from_secs(45));
        assert_eq!(timeouts.attach, Duration::from_secs(30));
        assert_eq!(timeouts.attach().timeout, DEFAULT_ATTACH_TIMEOUT);
        assert_eq!(timeouts.page_settle, Duration::from_millis(150));
    }
}
