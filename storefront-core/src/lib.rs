pub mod browser;
pub mod catalog;
pub mod config;
pub mod error;
pub mod workflow;

pub use catalog::{
    inspect_descriptor, ArtifactLayout, Catalog, CatalogFinding, FindingLevel, ProductDescriptor,
    MAX_TAGS, MAX_TITLE_CHARS,
};
pub use config::{
    load_catalog, load_storefront_config, ConfigBundle, ListingSection, MarketplaceSection,
    SelectorSection, ShopSection, StorefrontConfig, TimingSection,
};
pub use error::{ConfigError, Result};
pub use workflow::{
    login, summarize, ListingPipeline, ListingResult, ListingStage, LoginOptions, RunError,
    RunOptions, RunReport, RunSummary, Runner, SessionBootstrapper, ShopInitializer,
};
