use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use futures::FutureExt;
use rand::Rng;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::browser::{
    ActionExecutor, ActionOutcome, BrowserError, BrowserResult, Locator, MarketplaceSession,
};
use crate::catalog::{ArtifactLayout, ProductDescriptor};
use crate::config::{ListingSection, SelectorSection, StorefrontConfig};

use super::pause;

/// Progress of one listing. Ordered so that later stages compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStage {
    NotStarted,
    FileUploaded,
    MetadataFilled,
    TagsAdded,
    Published,
    PublishFailed,
}

impl fmt::Display for ListingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ListingStage::NotStarted => "not_started",
            ListingStage::FileUploaded => "file_uploaded",
            ListingStage::MetadataFilled => "metadata_filled",
            ListingStage::TagsAdded => "tags_added",
            ListingStage::Published => "published",
            ListingStage::PublishFailed => "publish_failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ListingStep {
    Navigate,
    UploadArtifact,
    UploadPreviews,
    Title,
    Description,
    Price,
    Tag { index: usize, value: String },
    Quantity,
    DigitalFlag,
    Publish,
    SaveDraft,
    Fault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMethod {
    Publish,
    SaveDraft,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    #[serde(flatten)]
    pub step: ListingStep,
    pub outcome: ActionOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingResult {
    pub product_id: u32,
    pub name: String,
    pub steps: Vec<StepRecord>,
    pub stages: Vec<ListingStage>,
    pub stage: ListingStage,
    pub published: bool,
    pub published_via: Option<PublishMethod>,
}

impl ListingResult {
    fn new(product: &ProductDescriptor) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            steps: Vec::new(),
            stages: vec![ListingStage::NotStarted],
            stage: ListingStage::NotStarted,
            published: false,
            published_via: None,
        }
    }

    pub fn outcome(&self, step: &ListingStep) -> Option<&ActionOutcome> {
        self.steps
            .iter()
            .find(|record| &record.step == step)
            .map(|record| &record.outcome)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|record| record.outcome.is_failed())
    }

    pub fn tags_added(&self) -> usize {
        self.steps
            .iter()
            .filter(|record| matches!(record.step, ListingStep::Tag { .. }))
            .filter(|record| record.outcome.is_success())
            .count()
    }

    fn record(&mut self, step: ListingStep, outcome: ActionOutcome) -> bool {
        let success = outcome.is_success();
        self.steps.push(StepRecord { step, outcome });
        success
    }

    fn advance(&mut self, stage: ListingStage) {
        if stage > self.stage {
            info!(product_id = self.product_id, from = %self.stage, to = %stage, "listing stage advanced");
            self.stage = stage;
            self.stages.push(stage);
        }
    }

    fn finish(&mut self, published_via: Option<PublishMethod>) {
        self.published = published_via.is_some();
        self.published_via = published_via;
        let terminal = if self.published {
            ListingStage::Published
        } else {
            ListingStage::PublishFailed
        };
        self.stage = terminal;
        self.stages.push(terminal);
    }

    fn faulted(product: &ProductDescriptor, message: String) -> Self {
        let mut result = Self::new(product);
        result.record(
            ListingStep::Fault,
            ActionOutcome::failed("process listing", message),
        );
        result.finish(None);
        result
    }
}

#[derive(Debug, Clone)]
pub struct ListingSettings {
    pub create_url: String,
    pub listing: ListingSection,
    pub selectors: SelectorSection,
    pub navigation_settle: Duration,
    pub step_settle: Duration,
    pub tag_delay: Duration,
    pub inter_item_delay_ms: [u64; 2],
}

impl ListingSettings {
    pub fn from_config(config: &StorefrontConfig) -> Self {
        Self {
            create_url: config.marketplace.listing_create_url.clone(),
            listing: config.listing.clone(),
            selectors: config.selectors.clone(),
            navigation_settle: config.timing.navigation_settle(),
            step_settle: config.timing.step_settle(),
            tag_delay: config.timing.tag_delay(),
            inter_item_delay_ms: config.timing.inter_item_delay_ms,
        }
    }
}

/// Politeness throttle between listings.
#[derive(Debug, Clone, Copy)]
struct RateLimiter {
    range: (u64, u64),
}

impl RateLimiter {
    fn new(range: [u64; 2]) -> Self {
        Self {
            range: (range[0], range[1]),
        }
    }

    async fn wait(&self) -> u64 {
        if self.range.0 == 0 && self.range.1 == 0 {
            return 0;
        }
        let lower = self.range.0.min(self.range.1);
        let upper = self.range.0.max(self.range.1);
        let delay = rand::thread_rng().gen_range(lower..=upper);
        sleep(Duration::from_millis(delay)).await;
        delay
    }
}

/// Creates one listing per descriptor, strictly in order on the shared session.
///
/// Steps never short-circuit: a failed upload still leaves title, price and tags to be
/// attempted, and a faulted item still leaves the next item to be processed.
pub struct ListingPipeline {
    settings: ListingSettings,
    layout: ArtifactLayout,
    limiter: RateLimiter,
}

impl ListingPipeline {
    pub fn new(settings: ListingSettings, layout: ArtifactLayout) -> Self {
        let limiter = RateLimiter::new(settings.inter_item_delay_ms);
        Self {
            settings,
            layout,
            limiter,
        }
    }

    pub fn from_config(config: &StorefrontConfig) -> Self {
        Self::new(
            ListingSettings::from_config(config),
            ArtifactLayout::from_config(config),
        )
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub async fn run<S>(
        &self,
        session: &S,
        executor: &ActionExecutor,
        products: &[ProductDescriptor],
    ) -> Vec<ListingResult>
    where
        S: MarketplaceSession + ?Sized,
    {
        let mut results = Vec::with_capacity(products.len());
        for (position, product) in products.iter().enumerate() {
            info!(
                product_id = product.id,
                name = %product.name,
                position = position + 1,
                total = products.len(),
                "Creating listing"
            );
            let result = self.process(session, executor, product).await;
            if result.published {
                info!(product_id = product.id, price = product.price, via = ?result.published_via, "Listed");
            } else {
                warn!(product_id = product.id, "Could not complete listing");
            }
            results.push(result);
            self.limiter.wait().await;
        }
        results
    }

    /// Item boundary: a panic while driving one listing becomes that listing's failure.
    pub async fn process<S>(
        &self,
        session: &S,
        executor: &ActionExecutor,
        product: &ProductDescriptor,
    ) -> ListingResult
    where
        S: MarketplaceSession + ?Sized,
    {
        match AssertUnwindSafe(self.create_listing(session, executor, product))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(product_id = product.id, error = %message, "Unexpected fault while listing");
                ListingResult::faulted(product, message)
            }
        }
    }

    pub async fn create_listing<S>(
        &self,
        session: &S,
        executor: &ActionExecutor,
        product: &ProductDescriptor,
    ) -> ListingResult
    where
        S: MarketplaceSession + ?Sized,
    {
        let selectors = &self.settings.selectors;
        let listing = &self.settings.listing;
        let mut result = ListingResult::new(product);

        let navigated = result.record(
            ListingStep::Navigate,
            executor
                .attempt(
                    "open listing form",
                    session.goto(&self.settings.create_url),
                )
                .await,
        );
        if navigated {
            pause(self.settings.navigation_settle).await;
        }

        let artifact = self.layout.artifact_path(product);
        let file_input = Locator::css(selectors.file_input.as_str());
        let uploaded = result.record(
            ListingStep::UploadArtifact,
            executor
                .attempt(
                    "upload product file",
                    upload_artifact(session, &file_input, artifact),
                )
                .await,
        );
        if uploaded {
            executor.with_metrics(|metrics| metrics.record_uploads(1));
            result.advance(ListingStage::FileUploaded);
            pause(self.settings.step_settle).await;
        }

        let previews = self.layout.discover_previews(product);
        let preview_outcome = if previews.is_empty() {
            executor.skip("upload preview images", "no preview images found")
        } else {
            let image_input = Locator::css(selectors.image_input.as_str());
            let outcome = executor
                .attempt(
                    format!("upload {} preview images", previews.len()),
                    session.upload(&image_input, &previews),
                )
                .await;
            if outcome.is_success() {
                executor.with_metrics(|metrics| metrics.record_uploads(previews.len() as u64));
                pause(self.settings.navigation_settle).await;
            }
            outcome
        };
        result.record(ListingStep::UploadPreviews, preview_outcome);

        let price = format_price(product.price);
        let fields = [
            (ListingStep::Title, "set title", &selectors.title_input, product.title.as_str()),
            (
                ListingStep::Description,
                "set description",
                &selectors.description_input,
                product.description.as_str(),
            ),
            (ListingStep::Price, "set price", &selectors.price_input, price.as_str()),
        ];
        let mut metadata_complete = true;
        for (step, description, selector, value) in fields {
            let locator = Locator::css(selector.as_str());
            let outcome = executor
                .attempt(description, session.fill(&locator, value))
                .await;
            metadata_complete &= result.record(step, outcome);
        }
        if metadata_complete {
            result.advance(ListingStage::MetadataFilled);
        }

        let tags_input = Locator::css(selectors.tags_input.as_str());
        for (index, tag) in product.tags.iter().enumerate() {
            let outcome = executor
                .attempt(
                    format!("add tag {tag}"),
                    add_tag(session, &tags_input, tag, &listing.confirm_key),
                )
                .await;
            result.record(
                ListingStep::Tag {
                    index,
                    value: tag.clone(),
                },
                outcome,
            );
            pause(self.settings.tag_delay).await;
        }
        let tags_added = result.tags_added();
        info!(
            product_id = product.id,
            added = tags_added,
            total = product.tags.len(),
            "Tags added"
        );
        if tags_added > 0 || product.tags.is_empty() {
            result.advance(ListingStage::TagsAdded);
        }

        let quantity = Locator::css(selectors.quantity_input.as_str());
        let quantity_value = listing.quantity.to_string();
        let outcome = executor
            .attempt("set quantity", session.fill(&quantity, &quantity_value))
            .await;
        result.record(ListingStep::Quantity, outcome);

        let digital = Locator::css(selectors.digital_checkbox.as_str());
        let outcome = executor
            .attempt("mark as digital", session.check(&digital))
            .await;
        result.record(ListingStep::DigitalFlag, outcome);

        let publish = Locator::button(listing.publish_label.as_str());
        let draft = Locator::button(listing.draft_label.as_str());
        let attempt = executor
            .attempt_with_fallback(
                "publish listing",
                session.click(&publish),
                "save listing as draft",
                session.click(&draft),
            )
            .await;
        let method = if attempt.primary.is_success() {
            Some(PublishMethod::Publish)
        } else if attempt.used_fallback() {
            Some(PublishMethod::SaveDraft)
        } else {
            None
        };
        result.record(ListingStep::Publish, attempt.primary);
        if let Some(fallback) = attempt.fallback {
            result.record(ListingStep::SaveDraft, fallback);
        }
        if method.is_some() {
            pause(self.settings.navigation_settle).await;
        }
        result.finish(method);
        result
    }
}

async fn upload_artifact<S>(session: &S, input: &Locator, path: PathBuf) -> BrowserResult<()>
where
    S: MarketplaceSession + ?Sized,
{
    let absolute = tokio::fs::canonicalize(&path)
        .await
        .map_err(|_| BrowserError::ArtifactMissing { path: path.clone() })?;
    if !absolute.is_file() {
        return Err(BrowserError::ArtifactMissing { path });
    }
    session.upload(input, &[absolute]).await
}

async fn add_tag<S>(session: &S, input: &Locator, tag: &str, key: &str) -> BrowserResult<()>
where
    S: MarketplaceSession + ?Sized,
{
    session.fill(input, tag).await?;
    session.press(input, key).await
}

fn format_price(price: f64) -> String {
    format!("{price:.2}")
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown fault".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(ListingStage::NotStarted < ListingStage::FileUploaded);
        assert!(ListingStage::FileUploaded < ListingStage::MetadataFilled);
        assert!(ListingStage::MetadataFilled < ListingStage::TagsAdded);
        assert!(ListingStage::TagsAdded < ListingStage::Published);
    }

    #[test]
    fn price_uses_two_decimals() {
        assert_eq!(format_price(4.99), "4.99");
        assert_eq!(format_price(5.0), "5.00");
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(boxed.as_ref()), "kaboom");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown fault");
    }
}
