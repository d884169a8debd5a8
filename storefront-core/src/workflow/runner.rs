use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::{
    ActionExecutor, ActionOutcome, BrowserAutomation, BrowserError, BrowserLauncher,
    BrowserMarketplaceSession, BrowserMetrics, LaunchOverrides, MarketplaceSession,
};
use crate::catalog::Catalog;
use crate::config::StorefrontConfig;

use super::bootstrap::{LoginDetection, SessionBootstrapper};
use super::listing::{ListingPipeline, ListingResult};
use super::report::{summarize, RunSummary};
use super::shop::{ShopInitializer, ShopSetupReport};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("run interrupted before completion")]
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub limit: Option<usize>,
    pub only: Vec<u32>,
    pub skip_shop_setup: bool,
    pub review_settings: bool,
    pub hold_for_review: bool,
    pub headless: Option<bool>,
    pub login_timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            limit: None,
            only: Vec::new(),
            skip_shop_setup: false,
            review_settings: true,
            hold_for_review: true,
            headless: None,
            login_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub login: LoginDetection,
    pub shop: Option<ShopSetupReport>,
    pub settings_review: Option<ActionOutcome>,
    pub results: Vec<ListingResult>,
    pub summary: RunSummary,
    pub metrics: BrowserMetrics,
}

/// End-to-end run: login, shop setup, listings, settings review.
pub struct Runner {
    config: Arc<StorefrontConfig>,
    catalog: Catalog,
    options: RunOptions,
}

impl Runner {
    pub fn new(config: Arc<StorefrontConfig>, catalog: Catalog, options: RunOptions) -> Self {
        Self {
            config,
            catalog,
            options,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Launches Chromium, drives the run and always shuts the browser down afterwards.
    pub async fn execute(&self, launcher: &BrowserLauncher) -> Result<RunReport, RunError> {
        let automation = launcher
            .launch_with_overrides(LaunchOverrides {
                headless: self.options.headless,
            })
            .await?;
        let outcome = race_interrupt(self.drive_browser(&automation), tokio::signal::ctrl_c()).await;
        if outcome.is_ok() && self.options.hold_for_review {
            hold_open().await;
        }
        if let Err(err) = automation.shutdown().await {
            warn!(error = %err, "Browser shutdown failed");
        }
        outcome
    }

    async fn drive_browser(&self, automation: &BrowserAutomation) -> Result<RunReport, RunError> {
        let context = automation.new_context().await?;
        let session = BrowserMarketplaceSession::new(context);
        let executor = ActionExecutor::new(automation.metrics_handle());
        self.drive(&session, &executor).await
    }

    /// Runs the workflow against an already established session.
    pub async fn drive<S>(&self, session: &S, executor: &ActionExecutor) -> Result<RunReport, RunError>
    where
        S: MarketplaceSession + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let products = self
            .catalog
            .select(&self.options.only, self.options.limit);
        info!(%run_id, products = products.len(), "Starting listing run");

        let mut bootstrapper = SessionBootstrapper::from_config(&self.config);
        if let Some(timeout) = self.options.login_timeout {
            bootstrapper = bootstrapper.with_timeout(timeout);
        }
        let login = bootstrapper.bootstrap(session).await?;
        executor.with_metrics(|metrics| metrics.record_login_polls(u64::from(login.polls)));

        let shop = if self.options.skip_shop_setup {
            info!("Shop setup skipped");
            None
        } else {
            Some(
                ShopInitializer::from_config(&self.config)
                    .initialize(session, executor)
                    .await,
            )
        };

        let pipeline = ListingPipeline::from_config(&self.config);
        let results = pipeline.run(session, executor, &products).await;

        let settings_review = if self.options.review_settings {
            Some(
                executor
                    .attempt(
                        "review shop settings",
                        session.goto(&self.config.marketplace.settings_url),
                    )
                    .await,
            )
        } else {
            None
        };

        let summary = summarize(&results);
        info!(
            %run_id,
            attempted = summary.attempted,
            published = summary.published,
            failed = summary.failed,
            "Listing run finished"
        );
        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            login,
            shop,
            settings_review,
            results,
            summary,
            metrics: executor.metrics(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    pub headless: Option<bool>,
    pub login_timeout: Option<Duration>,
    pub hold_open: bool,
}

/// Login-only session: signs the persistent profile in and optionally keeps the window open.
pub async fn login(
    launcher: &BrowserLauncher,
    options: LoginOptions,
) -> Result<LoginDetection, RunError> {
    let automation = launcher
        .launch_with_overrides(LaunchOverrides {
            headless: options.headless,
        })
        .await?;
    let mut bootstrapper = SessionBootstrapper::from_config(launcher.config());
    if let Some(timeout) = options.login_timeout {
        bootstrapper = bootstrapper.with_timeout(timeout);
    }

    let work = async {
        let context = automation.new_context().await?;
        let session = BrowserMarketplaceSession::new(context);
        let detection = bootstrapper.bootstrap(&session).await?;
        Ok::<_, RunError>(detection)
    };
    let outcome = race_interrupt(work, tokio::signal::ctrl_c()).await;
    if let Ok(detection) = &outcome {
        info!(profile = %automation.profile().name(), marker = ?detection.marker, "Profile signed in");
        if options.hold_open {
            hold_open().await;
        }
    }
    if let Err(err) = automation.shutdown().await {
        warn!(error = %err, "Browser shutdown failed");
    }
    outcome
}

/// Resolves with the work's result, or `Interrupted` if the interrupt fires first.
/// A failing interrupt listener never ends the work.
pub async fn race_interrupt<T, W, I>(work: W, interrupt: I) -> Result<T, RunError>
where
    W: Future<Output = Result<T, RunError>>,
    I: Future<Output = io::Result<()>>,
{
    let interrupt = async {
        if let Err(err) = interrupt.await {
            warn!(error = %err, "Interrupt listener failed");
            futures::future::pending::<()>().await;
        }
    };
    tokio::select! {
        result = work => result,
        () = interrupt => {
            warn!("Interrupt received, stopping run");
            Err(RunError::Interrupted)
        }
    }
}

async fn hold_open() {
    info!("Browser left open for review, press Ctrl+C to close");
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Interrupt listener failed, closing browser");
    }
}
