use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, warn};

use super::metrics::BrowserMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Skipped,
    Failed,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutcomeKind::Success => "ok",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub description: String,
    pub kind: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionOutcome {
    pub fn success(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            kind: OutcomeKind::Success,
            message: None,
        }
    }

    pub fn skipped(description: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            kind: OutcomeKind::Skipped,
            message: Some(reason.into()),
        }
    }

    pub fn failed(description: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            kind: OutcomeKind::Failed,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    pub fn is_failed(&self) -> bool {
        self.kind == OutcomeKind::Failed
    }
}

/// Primary action plus the fallback that ran only if the primary failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackOutcome {
    pub primary: ActionOutcome,
    pub fallback: Option<ActionOutcome>,
}

impl FallbackOutcome {
    pub fn succeeded(&self) -> bool {
        self.primary.is_success()
            || self
                .fallback
                .as_ref()
                .map(ActionOutcome::is_success)
                .unwrap_or(false)
    }

    pub fn used_fallback(&self) -> bool {
        !self.primary.is_success()
            && self
                .fallback
                .as_ref()
                .map(ActionOutcome::is_success)
                .unwrap_or(false)
    }
}

/// Runs single UI interactions so that a failure becomes a recorded outcome.
///
/// Every call awaits its action at most once. Retrying is left to the caller.
#[derive(Debug, Clone, Default)]
pub struct ActionExecutor {
    metrics: Arc<Mutex<BrowserMetrics>>,
}

impl ActionExecutor {
    pub fn new(metrics: Arc<Mutex<BrowserMetrics>>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> BrowserMetrics {
        self.metrics
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn with_metrics<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut BrowserMetrics) -> R,
    {
        self.metrics.lock().ok().map(|mut guard| f(&mut guard))
    }

    pub async fn attempt<Fut, T, E>(&self, description: impl Into<String>, action: Fut) -> ActionOutcome
    where
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let description = description.into();
        let outcome = match action.await {
            Ok(_) => {
                debug!(action = %description, "action succeeded");
                ActionOutcome::success(description)
            }
            Err(err) => {
                warn!(action = %description, error = %err, "action failed");
                ActionOutcome::failed(description, err.to_string())
            }
        };
        self.record(&outcome);
        outcome
    }

    pub fn skip(&self, description: impl Into<String>, reason: impl Into<String>) -> ActionOutcome {
        let outcome = ActionOutcome::skipped(description, reason);
        debug!(
            action = %outcome.description,
            reason = outcome.message.as_deref().unwrap_or_default(),
            "action skipped"
        );
        self.record(&outcome);
        outcome
    }

    /// Runs `fallback` only when `primary` failed. The fallback future is never polled otherwise.
    pub async fn attempt_with_fallback<P, F, T, U, E1, E2>(
        &self,
        primary_description: impl Into<String>,
        primary: P,
        fallback_description: impl Into<String>,
        fallback: F,
    ) -> FallbackOutcome
    where
        P: Future<Output = Result<T, E1>>,
        F: Future<Output = Result<U, E2>>,
        E1: fmt::Display,
        E2: fmt::Display,
    {
        let primary = self.attempt(primary_description, primary).await;
        if primary.is_success() {
            return FallbackOutcome {
                primary,
                fallback: None,
            };
        }
        let fallback = self.attempt(fallback_description, fallback).await;
        FallbackOutcome {
            primary,
            fallback: Some(fallback),
        }
    }

    fn record(&self, outcome: &ActionOutcome) {
        self.with_metrics(|metrics| metrics.record_outcome(outcome.kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::error::BrowserError;
    use std::cell::Cell;

    #[tokio::test]
    async fn failure_is_captured_not_propagated() {
        let executor = ActionExecutor::default();
        let outcome = executor
            .attempt("click publish", async {
                Err::<(), _>(BrowserError::ElementNotFound {
                    locator: "button:Publish".into(),
                })
            })
            .await;
        assert_eq!(outcome.kind, OutcomeKind::Failed);
        assert_eq!(
            outcome.message.as_deref(),
            Some("element not found: button:Publish")
        );
        assert_eq!(executor.metrics().steps_failed, 1);
    }

    #[tokio::test]
    async fn success_and_skip_are_tallied() {
        let executor = ActionExecutor::default();
        let ok = executor
            .attempt("fill title", async { Ok::<_, BrowserError>(()) })
            .await;
        assert!(ok.is_success());
        assert!(ok.message.is_none());
        let skipped = executor.skip("upload previews", "no preview images");
        assert_eq!(skipped.kind, OutcomeKind::Skipped);
        let metrics = executor.metrics();
        assert_eq!(metrics.steps_succeeded, 1);
        assert_eq!(metrics.steps_skipped, 1);
        assert_eq!(metrics.total_steps(), 2);
    }

    #[tokio::test]
    async fn fallback_runs_only_after_primary_failure() {
        let executor = ActionExecutor::default();
        let fallback_runs = Cell::new(0);

        let outcome = executor
            .attempt_with_fallback(
                "publish",
                async { Ok::<_, BrowserError>(()) },
                "save draft",
                async {
                    fallback_runs.set(fallback_runs.get() + 1);
                    Ok::<_, BrowserError>(())
                },
            )
            .await;
        assert!(outcome.succeeded());
        assert!(!outcome.used_fallback());
        assert_eq!(fallback_runs.get(), 0);

        let outcome = executor
            .attempt_with_fallback(
                "publish",
                async { Err::<(), _>(BrowserError::Timeout("publish".into())) },
                "save draft",
                async {
                    fallback_runs.set(fallback_runs.get() + 1);
                    Ok::<_, BrowserError>(())
                },
            )
            .await;
        assert!(outcome.succeeded());
        assert!(outcome.used_fallback());
        assert_eq!(fallback_runs.get(), 1);
    }

    #[tokio::test]
    async fn both_failing_is_reported() {
        let executor = ActionExecutor::default();
        let outcome = executor
            .attempt_with_fallback(
                "publish",
                async { Err::<(), _>(BrowserError::Timeout("publish".into())) },
                "save draft",
                async { Err::<(), _>(BrowserError::Timeout("save".into())) },
            )
            .await;
        assert!(!outcome.succeeded());
        assert_eq!(outcome.fallback.map(|f| f.kind), Some(OutcomeKind::Failed));
    }
}
