use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::catalog::Catalog;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct StorefrontConfig {
    pub chromium: ChromiumSection,
    pub viewport: ViewportSection,
    pub profile: ProfileSection,
    pub marketplace: MarketplaceSection,
    pub timing: TimingSection,
    pub shop: ShopSection,
    pub listing: ListingSection,
    pub selectors: SelectorSection,
    /// Directory relative paths are resolved against; set by the loader.
    #[serde(skip)]
    pub root: PathBuf,
}

impl StorefrontConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.login_timeout_seconds)
    }

    pub fn login_poll_interval(&self) -> Duration {
        Duration::from_secs(self.timing.login_poll_seconds)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let urls = [
            ("marketplace.entry_url", &self.marketplace.entry_url),
            ("marketplace.sell_url", &self.marketplace.sell_url),
            (
                "marketplace.listing_create_url",
                &self.marketplace.listing_create_url,
            ),
            ("marketplace.settings_url", &self.marketplace.settings_url),
        ];
        for (field, value) in urls {
            url::Url::parse(value).map_err(|err| ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: format!("{field} is not a valid url ({value}): {err}"),
            })?;
        }
        if self.marketplace.auth_url_markers.is_empty()
            && self.marketplace.auth_text_markers.is_empty()
        {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: "at least one login marker is required".to_string(),
            });
        }
        if self.timing.inter_item_delay_ms[0] > self.timing.inter_item_delay_ms[1] {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: "timing.inter_item_delay_ms must be [min, max]".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChromiumSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub request_timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
    pub lang: Option<String>,
}

impl Default for ChromiumSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            // The operator logs in by hand, so a visible window is the norm.
            headless: false,
            sandbox: true,
            disable_gpu: false,
            request_timeout_seconds: Some(30),
            user_agent: None,
            lang: Some("en-US".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewportSection {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProfileSection {
    pub base_dir: String,
    pub name: String,
}

impl Default for ProfileSection {
    fn default() -> Self {
        Self {
            base_dir: "profiles".to_string(),
            name: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketplaceSection {
    pub entry_url: String,
    pub sell_url: String,
    pub listing_create_url: String,
    pub settings_url: String,
    pub auth_url_markers: Vec<String>,
    pub auth_text_markers: Vec<String>,
    pub management_url_marker: String,
}

impl Default for MarketplaceSection {
    fn default() -> Self {
        Self {
            entry_url: "https://www.etsy.com/sell".to_string(),
            sell_url: "https://www.etsy.com/sell".to_string(),
            listing_create_url: "https://www.etsy.com/your/shops/me/tools/listings/create"
                .to_string(),
            settings_url: "https://www.etsy.com/your/shops/me/settings".to_string(),
            auth_url_markers: vec![
                "etsy.com/your/shops".to_string(),
                "etsy.com/shop-manager".to_string(),
            ],
            auth_text_markers: vec!["Shop Manager".to_string(), "Your Shop".to_string()],
            management_url_marker: "shop-manager".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub login_timeout_seconds: u64,
    pub login_poll_seconds: u64,
    pub login_settle_ms: u64,
    pub navigation_settle_ms: u64,
    pub step_settle_ms: u64,
    pub name_check_ms: u64,
    pub tag_delay_ms: u64,
    pub inter_item_delay_ms: [u64; 2],
}

impl TimingSection {
    pub fn login_settle(&self) -> Duration {
        Duration::from_millis(self.login_settle_ms)
    }

    pub fn navigation_settle(&self) -> Duration {
        Duration::from_millis(self.navigation_settle_ms)
    }

    pub fn step_settle(&self) -> Duration {
        Duration::from_millis(self.step_settle_ms)
    }

    pub fn name_check(&self) -> Duration {
        Duration::from_millis(self.name_check_ms)
    }

    pub fn tag_delay(&self) -> Duration {
        Duration::from_millis(self.tag_delay_ms)
    }

    /// Timing profile with every delay set to zero, for tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            login_timeout_seconds: 0,
            login_poll_seconds: 0,
            login_settle_ms: 0,
            navigation_settle_ms: 0,
            step_settle_ms: 0,
            name_check_ms: 0,
            tag_delay_ms: 0,
            inter_item_delay_ms: [0, 0],
        }
    }
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            login_timeout_seconds: 300,
            login_poll_seconds: 2,
            login_settle_ms: 2_000,
            navigation_settle_ms: 3_000,
            step_settle_ms: 2_000,
            name_check_ms: 1_000,
            tag_delay_ms: 500,
            inter_item_delay_ms: [3_000, 3_000],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShopSection {
    pub language: String,
    pub currency: String,
    pub country: String,
    pub candidate_names: Vec<String>,
    pub availability_markers: Vec<String>,
    pub get_started_label: String,
    pub submit_label: String,
    pub continue_labels: Vec<String>,
    pub max_continue_steps: usize,
}

impl Default for ShopSection {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            currency: "USD".to_string(),
            country: "US".to_string(),
            candidate_names: vec![
                "BudgetPlanningStudio".to_string(),
                "BudgetPlanStudio".to_string(),
                "PlanningStudioShop".to_string(),
                "DigitalBudgetStudio".to_string(),
                "SmartBudgetShop".to_string(),
                "PlanItBudgetShop".to_string(),
            ],
            availability_markers: vec!["available".to_string(), "looks good".to_string()],
            get_started_label: "Get started".to_string(),
            submit_label: "Save and continue".to_string(),
            continue_labels: vec![
                "Continue".to_string(),
                "Save and continue".to_string(),
                "Next".to_string(),
            ],
            max_continue_steps: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingSection {
    pub products_dir: String,
    pub previews_dir: String,
    pub preview_infix: String,
    pub preview_extension: String,
    pub max_preview_images: usize,
    pub quantity: u32,
    pub publish_label: String,
    pub draft_label: String,
    pub confirm_key: String,
}

impl Default for ListingSection {
    fn default() -> Self {
        Self {
            products_dir: "products".to_string(),
            previews_dir: "mockups".to_string(),
            preview_infix: "_mockup_".to_string(),
            preview_extension: "png".to_string(),
            max_preview_images: 5,
            quantity: 999,
            publish_label: "Publish".to_string(),
            draft_label: "Save".to_string(),
            confirm_key: "Enter".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSection {
    pub file_input: String,
    pub image_input: String,
    pub title_input: String,
    pub description_input: String,
    pub price_input: String,
    pub tags_input: String,
    pub quantity_input: String,
    pub digital_checkbox: String,
    pub shop_name_input: String,
    pub language_select: String,
    pub currency_select: String,
    pub country_select: String,
}

impl Default for SelectorSection {
    fn default() -> Self {
        Self {
            file_input: r#"input[type="file"]"#.to_string(),
            image_input: r#"input[type="file"][accept*="image"]"#.to_string(),
            title_input: r#"input[name="title"]"#.to_string(),
            description_input: r#"textarea[name="description"]"#.to_string(),
            price_input: r#"input[name="price"]"#.to_string(),
            tags_input: r#"input[name="tags"]"#.to_string(),
            quantity_input: r#"input[name="quantity"]"#.to_string(),
            digital_checkbox: r#"input[name="is_digital"]"#.to_string(),
            shop_name_input: r#"input[name="name"]"#.to_string(),
            language_select: r#"select[name="language"]"#.to_string(),
            currency_select: r#"select[name="currency"]"#.to_string(),
            country_select: r#"select[name="country"]"#.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigBundle {
    pub storefront: StorefrontConfig,
    pub catalog: Catalog,
}

impl ConfigBundle {
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let storefront = load_storefront_config(dir.join("storefront.toml"))?;
        let catalog = load_catalog(dir.join("catalog.toml"))?;
        Ok(Self {
            storefront,
            catalog,
        })
    }
}

pub fn load_storefront_config<P: AsRef<Path>>(path: P) -> Result<StorefrontConfig> {
    let path = path.as_ref();
    let mut config: StorefrontConfig = load_toml(path)?;
    config.root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    config.validate(path)?;
    Ok(config)
}

pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog> {
    let path = path.as_ref();
    let catalog: Catalog = load_toml(path)?;
    catalog
        .validate()
        .map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
    Ok(catalog)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_configs() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs");
        let bundle = ConfigBundle::from_directory(dir).expect("configs should parse");
        assert_eq!(bundle.storefront.timing.login_timeout_seconds, 300);
        assert_eq!(bundle.storefront.shop.max_continue_steps, 5);
        assert!(bundle.storefront.shop.candidate_names.len() >= 2);
        assert!(!bundle.catalog.products.is_empty());
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storefront.toml");
        std::fs::write(&path, "[timing]\nlogin_timeout_seconds = 60\n").unwrap();
        let config = load_storefront_config(&path).unwrap();
        assert_eq!(config.login_timeout(), Duration::from_secs(60));
        assert_eq!(config.timing.login_poll_seconds, 2);
        assert_eq!(config.listing.quantity, 999);
        assert_eq!(config.root, dir.path());
        assert_eq!(config.resolve_path("mockups"), dir.path().join("mockups"));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storefront.toml");
        std::fs::write(&path, "[marketplace]\nsell_url = \"not a url\"\n").unwrap();
        let err = load_storefront_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("marketplace.sell_url"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_storefront_config("/nonexistent/storefront.toml").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/storefront.toml"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
