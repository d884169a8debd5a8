use std::cell::RefCell;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::browser::{BrowserError, BrowserResult, Locator, MarketplaceSession, PollingWaiter};
use crate::config::StorefrontConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "marker", rename_all = "snake_case")]
pub enum LoginMarker {
    Url(String),
    Text(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginDetection {
    pub marker: LoginMarker,
    pub polls: u32,
    pub waited_ms: u64,
}

/// Waits for the operator to finish logging in by hand.
#[derive(Debug, Clone)]
pub struct SessionBootstrapper {
    entry_url: String,
    url_markers: Vec<String>,
    text_markers: Vec<String>,
    waiter: PollingWaiter,
    settle: Duration,
}

impl SessionBootstrapper {
    pub fn new(
        entry_url: impl Into<String>,
        url_markers: Vec<String>,
        text_markers: Vec<String>,
        waiter: PollingWaiter,
        settle: Duration,
    ) -> Self {
        Self {
            entry_url: entry_url.into(),
            url_markers,
            text_markers,
            waiter,
            settle,
        }
    }

    pub fn from_config(config: &StorefrontConfig) -> Self {
        Self::new(
            config.marketplace.entry_url.clone(),
            config.marketplace.auth_url_markers.clone(),
            config.marketplace.auth_text_markers.clone(),
            PollingWaiter::new(config.login_timeout(), config.login_poll_interval()),
            config.timing.login_settle(),
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.waiter = PollingWaiter::new(timeout, self.waiter.poll_interval());
        self
    }

    pub fn entry_url(&self) -> &str {
        &self.entry_url
    }

    /// Navigates to the entry page and blocks until an authenticated marker shows up.
    /// Navigation failure and login timeout both end the run.
    pub async fn bootstrap<S>(&self, session: &S) -> BrowserResult<LoginDetection>
    where
        S: MarketplaceSession + ?Sized,
    {
        session.goto(&self.entry_url).await?;
        info!(
            url = %self.entry_url,
            timeout_secs = self.waiter.timeout().as_secs(),
            "Please log into the marketplace in the browser window; login is detected automatically"
        );

        let matched: RefCell<Option<LoginMarker>> = RefCell::new(None);
        let report = self
            .waiter
            .wait_until_detailed(|| {
                let matched = &matched;
                async move {
                    let marker = self.detect_marker(session).await?;
                    let found = marker.is_some();
                    *matched.borrow_mut() = marker;
                    Ok::<_, BrowserError>(found)
                }
            })
            .await;

        let marker = match (report.satisfied, matched.into_inner()) {
            (true, Some(marker)) => marker,
            _ => {
                warn!(
                    polls = report.polls,
                    waited_secs = report.elapsed.as_secs(),
                    "Timed out waiting for login"
                );
                return Err(BrowserError::AuthTimeout {
                    waited_secs: report.elapsed.as_secs(),
                });
            }
        };

        info!(?marker, polls = report.polls, "Login detected, continuing");
        if !self.settle.is_zero() {
            sleep(self.settle).await;
        }
        Ok(LoginDetection {
            marker,
            polls: report.polls,
            waited_ms: report.elapsed.as_millis() as u64,
        })
    }

    async fn detect_marker<S>(&self, session: &S) -> BrowserResult<Option<LoginMarker>>
    where
        S: MarketplaceSession + ?Sized,
    {
        let url = session.current_url().await?;
        if let Some(marker) = self.url_markers.iter().find(|marker| url.contains(marker.as_str())) {
            return Ok(Some(LoginMarker::Url(marker.clone())));
        }
        for marker in &self.text_markers {
            if session.is_present(&Locator::text(marker.as_str())).await? {
                return Ok(Some(LoginMarker::Text(marker.clone())));
            }
        }
        Ok(None)
    }
}
