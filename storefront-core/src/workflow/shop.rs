use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::browser::{ActionExecutor, ActionOutcome, BrowserResult, Locator, MarketplaceSession};
use crate::config::{SelectorSection, ShopSection, StorefrontConfig};

use super::pause;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShopSetupReport {
    pub already_exists: bool,
    pub shop_name: Option<String>,
    pub continue_steps: usize,
    pub outcomes: Vec<ActionOutcome>,
}

impl ShopSetupReport {
    /// A pre-existing shop is a normal outcome, so setup never blocks the run.
    pub fn ready(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct ShopInitializer {
    sell_url: String,
    management_marker: String,
    shop: ShopSection,
    selectors: SelectorSection,
    navigation_settle: Duration,
    step_settle: Duration,
    name_check: Duration,
}

impl ShopInitializer {
    pub fn from_config(config: &StorefrontConfig) -> Self {
        Self {
            sell_url: config.marketplace.sell_url.clone(),
            management_marker: config.marketplace.management_url_marker.clone(),
            shop: config.shop.clone(),
            selectors: config.selectors.clone(),
            navigation_settle: config.timing.navigation_settle(),
            step_settle: config.timing.step_settle(),
            name_check: config.timing.name_check(),
        }
    }

    pub async fn ensure_shop_exists<S>(&self, session: &S, executor: &ActionExecutor) -> bool
    where
        S: MarketplaceSession + ?Sized,
    {
        self.initialize(session, executor).await.ready()
    }

    pub async fn initialize<S>(&self, session: &S, executor: &ActionExecutor) -> ShopSetupReport
    where
        S: MarketplaceSession + ?Sized,
    {
        let mut report = ShopSetupReport::default();
        info!(url = %self.sell_url, "Setting up shop");

        report.outcomes.push(
            executor
                .attempt("open shop creation page", session.goto(&self.sell_url))
                .await,
        );
        pause(self.navigation_settle).await;

        if let Ok(url) = session.current_url().await {
            if url.contains(self.management_marker.as_str()) {
                info!(url = %url, "Shop already exists, skipping setup");
                report.already_exists = true;
                return report;
            }
        }

        let get_started = Locator::text(self.shop.get_started_label.as_str());
        let outcome = self
            .when_present(
                session,
                executor,
                &get_started,
                "click get started",
                session.click(&get_started),
            )
            .await;
        if outcome.is_success() {
            pause(self.step_settle).await;
        }
        report.outcomes.push(outcome);

        let preferences = [
            ("select shop language", &self.selectors.language_select, &self.shop.language),
            ("select shop currency", &self.selectors.currency_select, &self.shop.currency),
            ("select shop country", &self.selectors.country_select, &self.shop.country),
        ];
        for (description, selector, value) in preferences {
            let locator = Locator::css(selector.as_str());
            report.outcomes.push(
                self.when_present(
                    session,
                    executor,
                    &locator,
                    description,
                    session.select_option(&locator, value),
                )
                .await,
            );
        }

        let submit = Locator::button(self.shop.submit_label.as_str());
        let outcome = self
            .when_present(
                session,
                executor,
                &submit,
                "submit shop preferences",
                session.click(&submit),
            )
            .await;
        if outcome.is_success() {
            pause(self.step_settle).await;
        }
        report.outcomes.push(outcome);

        report.shop_name = self.choose_name(session, executor, &mut report.outcomes).await;
        report.continue_steps = self
            .click_through(session, executor, &mut report.outcomes)
            .await;

        info!(
            shop_name = report.shop_name.as_deref().unwrap_or("-"),
            continue_steps = report.continue_steps,
            "Shop setup complete"
        );
        report
    }

    /// Tries candidate names in order and keeps the first the marketplace reports as available.
    async fn choose_name<S>(
        &self,
        session: &S,
        executor: &ActionExecutor,
        outcomes: &mut Vec<ActionOutcome>,
    ) -> Option<String>
    where
        S: MarketplaceSession + ?Sized,
    {
        let input = Locator::css(self.selectors.shop_name_input.as_str());
        if !session.is_present(&input).await.unwrap_or(false) {
            outcomes.push(executor.skip("choose shop name", "shop name input not shown"));
            return None;
        }

        for name in &self.shop.candidate_names {
            let outcome = executor
                .attempt(format!("fill shop name {name}"), session.fill(&input, name))
                .await;
            let filled = outcome.is_success();
            outcomes.push(outcome);
            if !filled {
                continue;
            }
            pause(self.name_check).await;
            if self.name_accepted(session).await {
                info!(shop_name = %name, "Shop name accepted");
                return Some(name.clone());
            }
        }

        warn!(
            candidates = self.shop.candidate_names.len(),
            "No candidate shop name was accepted, continuing"
        );
        None
    }

    async fn name_accepted<S>(&self, session: &S) -> bool
    where
        S: MarketplaceSession + ?Sized,
    {
        for marker in &self.shop.availability_markers {
            if session
                .is_present(&Locator::text(marker.as_str()))
                .await
                .unwrap_or(false)
            {
                return true;
            }
        }
        false
    }

    /// Clicks the first shown continue-style button, at most `max_continue_steps` times.
    async fn click_through<S>(
        &self,
        session: &S,
        executor: &ActionExecutor,
        outcomes: &mut Vec<ActionOutcome>,
    ) -> usize
    where
        S: MarketplaceSession + ?Sized,
    {
        let mut steps = 0;
        while steps < self.shop.max_continue_steps {
            let Some(button) = self.first_present_button(session).await else {
                break;
            };
            let outcome = executor
                .attempt(format!("setup step {} ({button})", steps + 1), session.click(&button))
                .await;
            let clicked = outcome.is_success();
            outcomes.push(outcome);
            if !clicked {
                break;
            }
            steps += 1;
            pause(self.step_settle).await;
        }
        steps
    }

    async fn first_present_button<S>(&self, session: &S) -> Option<Locator>
    where
        S: MarketplaceSession + ?Sized,
    {
        for label in &self.shop.continue_labels {
            let locator = Locator::button(label.as_str());
            if session.is_present(&locator).await.unwrap_or(false) {
                return Some(locator);
            }
        }
        None
    }

    /// An absent control means the step does not apply to this account.
    async fn when_present<S, Fut>(
        &self,
        session: &S,
        executor: &ActionExecutor,
        locator: &Locator,
        description: &str,
        action: Fut,
    ) -> ActionOutcome
    where
        S: MarketplaceSession + ?Sized,
        Fut: Future<Output = BrowserResult<()>>,
    {
        match session.is_present(locator).await {
            Ok(true) => executor.attempt(description, action).await,
            Ok(false) => executor.skip(description, format!("{locator} not shown")),
            Err(err) => executor.skip(description, format!("{locator} could not be inspected: {err}")),
        }
    }
}
