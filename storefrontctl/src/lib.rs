pub mod commands;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::{fmt as subscriber_fmt, EnvFilter};

use storefront_core::browser::{BrowserError, BrowserLauncher};
use storefront_core::workflow::{LoginDetection, LoginMarker};
use storefront_core::{
    inspect_descriptor, load_catalog, load_storefront_config, ArtifactLayout, Catalog,
    CatalogFinding, FindingLevel, RunError, RunReport, Runner, StorefrontConfig,
};

use commands::{CatalogCommands, LoginArgs, RunArgs};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] storefront_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("run failed: {0}")]
    Run(#[from] RunError),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("catalog check found {0} error(s)")]
    CatalogCheckFailed(usize),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Marketplace storefront listing automation", long_about = None)]
pub struct Cli {
    /// Path to storefront.toml
    #[arg(long, default_value = "configs/storefront.toml")]
    pub config: PathBuf,
    /// Path to the product catalog (defaults to catalog.toml next to the config)
    #[arg(long)]
    pub catalog: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Debug-level logging
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Logs in, sets up the shop and creates one listing per catalog entry
    Run(RunArgs),
    /// Opens the browser profile and waits for a manual login
    Login(LoginArgs),
    /// Catalog inspection
    #[command(subcommand)]
    Catalog(CatalogCommands),
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose);
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Run(args) => {
            if let Some(report) = context.run_listings(args)? {
                render(&report, cli.format)?;
            }
        }
        Commands::Login(args) => {
            if let Some(summary) = context.login(args)? {
                render(&summary, cli.format)?;
            }
        }
        Commands::Catalog(CatalogCommands::List) => {
            let listing = context.catalog_list()?;
            render(&listing, cli.format)?;
        }
        Commands::Catalog(CatalogCommands::Check) => {
            let report = context.catalog_check()?;
            render(&report, cli.format)?;
            let errors = report
                .iter()
                .filter(|entry| matches!(entry.status, CheckStatus::Error))
                .count();
            if errors > 0 {
                return Err(AppError::CatalogCheckFailed(errors));
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so `--format json` output stays parseable.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = subscriber_fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: Arc<StorefrontConfig>,
    config_path: PathBuf,
    catalog_path: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone();
        let config = load_storefront_config(&config_path)?;
        let catalog_path = cli.catalog.clone().unwrap_or_else(|| {
            config_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("catalog.toml")
        });
        Ok(Self {
            config: Arc::new(config),
            config_path,
            catalog_path,
        })
    }

    fn catalog(&self) -> Result<Catalog> {
        Ok(load_catalog(&self.catalog_path)?)
    }

    fn runtime() -> Result<tokio::runtime::Runtime> {
        Ok(tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?)
    }

    /// `None` when the operator interrupted the run.
    fn run_listings(&self, args: &RunArgs) -> Result<Option<RunReport>> {
        let catalog = self.catalog()?;
        let launcher = BrowserLauncher::from_config(Arc::clone(&self.config))?;
        let runner = Runner::new(Arc::clone(&self.config), catalog, args.to_options());
        let outcome = Self::runtime()?.block_on(runner.execute(&launcher));
        match outcome {
            Ok(report) => Ok(Some(report)),
            Err(RunError::Interrupted) => {
                warn!("Run interrupted, browser closed");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn login(&self, args: &LoginArgs) -> Result<Option<LoginSummary>> {
        let launcher = BrowserLauncher::from_config(Arc::clone(&self.config))?;
        let outcome =
            Self::runtime()?.block_on(storefront_core::login(&launcher, args.to_options()));
        match outcome {
            Ok(detection) => Ok(Some(LoginSummary::new(
                &self.config.profile.name,
                detection,
            ))),
            Err(RunError::Interrupted) => {
                info!("Login interrupted, browser closed");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn catalog_list(&self) -> Result<CatalogListing> {
        let catalog = self.catalog()?;
        let layout = ArtifactLayout::from_config(&self.config);
        let rows = catalog
            .products
            .iter()
            .map(|product| CatalogRow {
                id: product.id,
                name: product.name.clone(),
                price: product.price,
                tags: product.tags.len(),
                previews: layout.discover_previews(product).len(),
                artifact_present: layout.artifact_path(product).is_file(),
            })
            .collect();
        Ok(CatalogListing { rows })
    }

    fn catalog_check(&self) -> Result<Vec<HealthEntry>> {
        let catalog = self.catalog()?;
        let layout = ArtifactLayout::from_config(&self.config);
        let mut entries = vec![
            HealthEntry::ok("config", self.config_path.display().to_string()),
            HealthEntry::ok(
                "catalog",
                format!("{} ({} products)", self.catalog_path.display(), catalog.len()),
            ),
        ];
        entries.push(self.check_directory("products", &self.config.listing.products_dir));
        entries.push(self.check_directory("previews", &self.config.listing.previews_dir));
        entries.extend(
            catalog
                .products
                .iter()
                .flat_map(|product| inspect_descriptor(product, &layout))
                .map(HealthEntry::from),
        );
        Ok(entries)
    }

    fn check_directory(&self, name: &str, dir: &str) -> HealthEntry {
        let path = self.config.resolve_path(dir);
        if path.is_dir() {
            HealthEntry::ok(name, path.display().to_string())
        } else {
            HealthEntry::warn(name, format!("directory not found: {}", path.display()))
        }
    }
}

impl DisplayFallback for RunReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Run {} ({} to {})",
            self.run_id,
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.finished_at.format("%H:%M:%S")
        )];
        lines.push(format!(
            "Login detected via {} after {} checks",
            marker_label(&self.login.marker),
            self.login.polls
        ));
        match &self.shop {
            Some(shop) if shop.already_exists => lines.push("Shop: already set up".to_string()),
            Some(shop) => lines.push(format!(
                "Shop: name {}, {} setup steps",
                shop.shop_name.as_deref().unwrap_or("not chosen"),
                shop.continue_steps
            )),
            None => lines.push("Shop: setup skipped".to_string()),
        }
        for result in &self.results {
            let succeeded = result
                .steps
                .iter()
                .filter(|record| record.outcome.is_success())
                .count();
            let status = if result.published { "LISTED" } else { "FAILED" };
            lines.push(format!(
                "[{status}] #{} {} ({succeeded}/{} steps ok, stage {})",
                result.product_id,
                result.name,
                result.steps.len(),
                result.stage
            ));
            for record in result.failed_steps() {
                lines.push(format!(
                    "    {}: {}",
                    record.outcome.description,
                    record.outcome.message.as_deref().unwrap_or("failed")
                ));
            }
        }
        if let Some(review) = &self.settings_review {
            lines.push(format!("Settings review: {}", review.kind));
        }
        let summary = &self.summary;
        lines.push(format!(
            "Summary: attempted {}, published {} ({} as draft), failed {}",
            summary.attempted, summary.published, summary.drafts, summary.failed
        ));
        let metrics = &self.metrics;
        lines.push(format!(
            "Steps: {} ok, {} skipped, {} failed ({:.0}% success)",
            metrics.steps_succeeded,
            metrics.steps_skipped,
            metrics.steps_failed,
            metrics.step_success_rate()
        ));
        if !summary.failed_items.is_empty() {
            let names: Vec<&str> = summary
                .failed_items
                .iter()
                .map(|item| item.name.as_str())
                .collect();
            lines.push(format!("Needs attention: {}", names.join(", ")));
        }
        lines.join("\n")
    }
}

fn marker_label(marker: &LoginMarker) -> String {
    match marker {
        LoginMarker::Url(marker) => format!("url containing {marker:?}"),
        LoginMarker::Text(marker) => format!("text {marker:?}"),
    }
}

#[derive(Debug, Serialize)]
pub struct LoginSummary {
    pub profile: String,
    pub detection: LoginDetection,
}

impl LoginSummary {
    fn new(profile: &str, detection: LoginDetection) -> Self {
        Self {
            profile: profile.to_string(),
            detection,
        }
    }
}

impl DisplayFallback for LoginSummary {
    fn display(&self) -> String {
        format!(
            "Profile {} signed in ({}, {} ms)",
            self.profile,
            marker_label(&self.detection.marker),
            self.detection.waited_ms
        )
    }
}

#[derive(Debug, Serialize)]
pub struct CatalogListing {
    pub rows: Vec<CatalogRow>,
}

#[derive(Debug, Serialize)]
pub struct CatalogRow {
    pub id: u32,
    pub name: String,
    pub price: f64,
    pub tags: usize,
    pub previews: usize,
    pub artifact_present: bool,
}

impl DisplayFallback for CatalogListing {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "Catalog is empty".to_string();
        }
        let mut lines = vec!["Products:".to_string()];
        for row in &self.rows {
            lines.push(format!(
                "  - #{id} {name} | ${price:.2} | {tags} tags | {previews} previews{missing}",
                id = row.id,
                name = row.name,
                price = row.price,
                tags = row.tags,
                previews = row.previews,
                missing = if row.artifact_present {
                    ""
                } else {
                    " | artifact missing"
                }
            ));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(DisplayFallback::display)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }
}

impl From<CatalogFinding> for HealthEntry {
    fn from(finding: CatalogFinding) -> Self {
        let status = match finding.level {
            FindingLevel::Ok => CheckStatus::Ok,
            FindingLevel::Warn => CheckStatus::Warn,
            FindingLevel::Error => CheckStatus::Error,
        };
        Self {
            name: format!("#{} {}", finding.product_id, finding.name),
            status,
            detail: finding.detail,
        }
    }
}

impl DisplayFallback for HealthEntry {
    fn display(&self) -> String {
        format!(
            "[{status}] {name}: {detail}",
            status = self.status,
            name = self.name,
            detail = self.detail
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    use chrono::Utc;
    use storefront_core::browser::BrowserMetrics;
    use storefront_core::workflow::RunSummary;
    use tempfile::TempDir;
    use uuid::Uuid;

    const CATALOG: &str = r#"
[[products]]
id = 1
name = "Monthly Budget Planner"
filename = "monthly_budget_planner.pdf"
category = "budget"
price = 4.99
title = "Monthly Budget Planner | Printable PDF"
description = "Track income and expenses."
tags = ["budget planner", "finance tracker"]

[[products]]
id = 2
name = "Debt Snowball Tracker"
filename = "debt_snowball_tracker.pdf"
category = "budget"
price = 3.99
title = "Debt Snowball Tracker | Printable PDF"
description = "Pay off debt faster."
tags = []
"#;

    fn prepare_test_context() -> Result<(TempDir, Cli)> {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let configs_dir = root.join("configs");
        fs::create_dir_all(&configs_dir).unwrap();
        fs::write(
            configs_dir.join("storefront.toml"),
            "[listing]\nproducts_dir = \"../products\"\npreviews_dir = \"../mockups\"\n",
        )
        .unwrap();
        fs::write(configs_dir.join("catalog.toml"), CATALOG).unwrap();

        fs::create_dir_all(root.join("products")).unwrap();
        fs::create_dir_all(root.join("mockups")).unwrap();
        fs::write(root.join("products/monthly_budget_planner.pdf"), b"%PDF").unwrap();
        fs::write(
            root.join("mockups/monthly_budget_planner_mockup_1.png"),
            b"png",
        )
        .unwrap();

        let cli = Cli {
            config: configs_dir.join("storefront.toml"),
            catalog: None,
            format: OutputFormat::Json,
            verbose: false,
            command: Commands::Catalog(CatalogCommands::Check),
        };
        Ok((temp, cli))
    }

    #[test]
    fn catalog_list_reports_artifacts_and_previews() {
        let (_temp, cli) = prepare_test_context().unwrap();
        let context = AppContext::new(&cli).unwrap();
        let listing = context.catalog_list().unwrap();
        assert_eq!(listing.rows.len(), 2);
        assert!(listing.rows[0].artifact_present);
        assert_eq!(listing.rows[0].previews, 1);
        assert!(!listing.rows[1].artifact_present);
        assert!(listing.display().contains("artifact missing"));
    }

    #[test]
    fn catalog_check_flags_missing_artifact() {
        let (_temp, cli) = prepare_test_context().unwrap();
        let context = AppContext::new(&cli).unwrap();
        let entries = context.catalog_check().unwrap();
        let errors: Vec<_> = entries
            .iter()
            .filter(|entry| entry.status == CheckStatus::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].name.starts_with("#2"));
        assert!(entries
            .iter()
            .any(|entry| entry.status == CheckStatus::Warn && entry.detail == "no tags"));

        match run(cli) {
            Err(AppError::CatalogCheckFailed(count)) => assert_eq!(count, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn run_flags_map_to_options() {
        let cli = Cli::try_parse_from([
            "storefrontctl",
            "--format",
            "json",
            "run",
            "--limit",
            "2",
            "--only",
            "1,3",
            "--headless",
            "--no-settings-review",
            "--login-timeout",
            "60",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        let options = args.to_options();
        assert_eq!(options.limit, Some(2));
        assert_eq!(options.only, vec![1, 3]);
        assert_eq!(options.headless, Some(true));
        assert!(!options.review_settings);
        assert!(!options.skip_shop_setup);
        assert!(options.hold_for_review);
        assert_eq!(options.login_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn run_no_hold_closes_browser_after_run() {
        let cli = Cli::try_parse_from(["storefrontctl", "run", "--no-hold"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        let options = args.to_options();
        assert!(!options.hold_for_review);
        assert!(options.review_settings);
        assert_eq!(options.headless, None);
    }

    #[test]
    fn login_holds_browser_by_default() {
        let cli = Cli::try_parse_from(["storefrontctl", "login"]).unwrap();
        let Commands::Login(args) = cli.command else {
            panic!("expected login command");
        };
        let options = args.to_options();
        assert!(options.hold_open);
        assert_eq!(options.headless, Some(false));
    }

    #[test]
    fn run_report_text_lists_summary() {
        let report = RunReport {
            run_id: Uuid::nil(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            login: LoginDetection {
                marker: LoginMarker::Text("Shop Manager".to_string()),
                polls: 4,
                waited_ms: 6_000,
            },
            shop: None,
            settings_review: None,
            results: Vec::new(),
            summary: RunSummary::default(),
            metrics: BrowserMetrics {
                steps_succeeded: 3,
                steps_skipped: 2,
                steps_failed: 1,
                ..BrowserMetrics::default()
            },
        };
        let text = report.display();
        assert!(text.contains("Login detected via text \"Shop Manager\" after 4 checks"));
        assert!(text.contains("Shop: setup skipped"));
        assert!(text.contains("Summary: attempted 0, published 0 (0 as draft), failed 0"));
        assert!(text.contains("Steps: 3 ok, 2 skipped, 1 failed (75% success)"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["login"]["marker"]["kind"], "text");
    }
}
