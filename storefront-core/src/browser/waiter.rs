use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, trace};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Result of a bounded wait, including how many checks were made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitReport {
    pub satisfied: bool,
    pub polls: u32,
    pub elapsed: Duration,
}

/// Repeatedly checks slow-changing external state until it holds or the timeout elapses.
///
/// The predicate runs once immediately and then after every `poll_interval`. Each call is
/// cut off at the time remaining, and so is the last sleep, so an unsatisfied wait returns
/// after at least `timeout` and before `timeout + poll_interval`. Predicate errors count
/// as "not yet".
#[derive(Debug, Clone, Copy)]
pub struct PollingWaiter {
    timeout: Duration,
    poll_interval: Duration,
}

impl PollingWaiter {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub async fn wait_until<F, Fut, E>(&self, predicate: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
        E: fmt::Display,
    {
        self.wait_until_detailed(predicate).await.satisfied
    }

    pub async fn wait_until_detailed<F, Fut, E>(&self, mut predicate: F) -> WaitReport
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
        E: fmt::Display,
    {
        let start = Instant::now();
        let mut polls = 0u32;
        loop {
            polls = polls.saturating_add(1);
            let remaining = self.timeout.saturating_sub(start.elapsed());
            match timeout(remaining.max(MIN_POLL_INTERVAL), predicate()).await {
                Ok(Ok(true)) => {
                    return WaitReport {
                        satisfied: true,
                        polls,
                        elapsed: start.elapsed(),
                    };
                }
                Ok(Ok(false)) => trace!(polls, "condition not yet satisfied"),
                Ok(Err(err)) => debug!(polls, error = %err, "check failed, treating as unsatisfied"),
                Err(_) => debug!(polls, "check outlasted the remaining wait"),
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return WaitReport {
                    satisfied: false,
                    polls,
                    elapsed,
                };
            }
            sleep(self.poll_interval.min(self.timeout - elapsed)).await;
        }
    }
}

/// Free-function form of [`PollingWaiter::wait_until`].
pub async fn wait_until<F, Fut, E>(predicate: F, timeout: Duration, poll_interval: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: fmt::Display,
{
    PollingWaiter::new(timeout, poll_interval)
        .wait_until(predicate)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::browser::error::BrowserError;

    #[tokio::test(start_paused = true)]
    async fn never_true_times_out_within_one_interval() {
        let calls = Cell::new(0u32);
        let start = Instant::now();
        let report = PollingWaiter::new(Duration::from_secs(5), Duration::from_secs(1))
            .wait_until_detailed(|| {
                calls.set(calls.get() + 1);
                async { Ok::<_, BrowserError>(false) }
            })
            .await;
        let elapsed = start.elapsed();
        assert!(!report.satisfied);
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6));
        assert!((5..=6).contains(&calls.get()));
        assert_eq!(report.polls, calls.get());
    }

    #[tokio::test(start_paused = true)]
    async fn returns_within_one_interval_of_transition() {
        let start = Instant::now();
        let flip_at = Duration::from_millis(3_500);
        let satisfied = wait_until(
            || async move { Ok::<_, BrowserError>(start.elapsed() >= flip_at) },
            Duration::from_secs(10),
            Duration::from_secs(1),
        )
        .await;
        let elapsed = start.elapsed();
        assert!(satisfied);
        assert!(elapsed >= flip_at);
        assert!(elapsed < flip_at + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn predicate_errors_are_swallowed() {
        let calls = Cell::new(0u32);
        let satisfied = wait_until(
            || {
                let attempt = calls.get() + 1;
                calls.set(attempt);
                async move {
                    if attempt < 3 {
                        Err(BrowserError::Unexpected("page not ready".into()))
                    } else {
                        Ok(true)
                    }
                }
            },
            Duration::from_secs(30),
            Duration::from_secs(2),
        )
        .await;
        assert!(satisfied);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_does_not_sleep() {
        let start = Instant::now();
        let report = PollingWaiter::new(Duration::from_secs(300), Duration::from_secs(2))
            .wait_until_detailed(|| async { Ok::<_, BrowserError>(true) })
            .await;
        assert!(report.satisfied);
        assert_eq!(report.polls, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_check_is_cut_off_at_deadline() {
        let start = Instant::now();
        let report = PollingWaiter::new(Duration::from_secs(5), Duration::from_secs(1))
            .wait_until_detailed(|| async {
                sleep(Duration::from_secs(60)).await;
                Ok::<_, BrowserError>(true)
            })
            .await;
        let elapsed = start.elapsed();
        assert!(!report.satisfied);
        assert_eq!(report.polls, 1);
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_checks_still_honour_deadline() {
        let start = Instant::now();
        let satisfied = wait_until(
            || async {
                sleep(Duration::from_millis(1_500)).await;
                Ok::<_, BrowserError>(false)
            },
            Duration::from_secs(5),
            Duration::from_secs(1),
        )
        .await;
        let elapsed = start.elapsed();
        assert!(!satisfied);
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_checks_once() {
        let report = PollingWaiter::new(Duration::ZERO, Duration::ZERO)
            .wait_until_detailed(|| async { Ok::<_, BrowserError>(false) })
            .await;
        assert!(!report.satisfied);
        assert_eq!(report.polls, 1);
    }
}
