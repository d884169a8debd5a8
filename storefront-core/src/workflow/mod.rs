mod bootstrap;
mod listing;
mod report;
mod runner;
mod shop;

use std::time::Duration;

pub use bootstrap::{LoginDetection, LoginMarker, SessionBootstrapper};
pub use listing::{
    ListingPipeline, ListingResult, ListingSettings, ListingStage, ListingStep, PublishMethod,
    StepRecord,
};
pub use report::{summarize, FailedItem, RunSummary};
pub use runner::{
    login, race_interrupt, LoginOptions, RunError, RunOptions, RunReport, Runner,
};
pub use shop::{ShopInitializer, ShopSetupReport};

pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
