use std::sync::{Arc, Mutex};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::StorefrontConfig;

use super::error::{BrowserError, BrowserResult};
use super::metrics::BrowserMetrics;
use super::profile::{BrowserProfile, ProfileManager};

#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub headless: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<StorefrontConfig>,
    profiles: ProfileManager,
}

impl BrowserLauncher {
    pub fn new(config: Arc<StorefrontConfig>, profiles: ProfileManager) -> Self {
        Self { config, profiles }
    }

    pub fn from_config(config: Arc<StorefrontConfig>) -> BrowserResult<Self> {
        let profiles = ProfileManager::new(config.resolve_path(&config.profile.base_dir))?;
        Ok(Self::new(config, profiles))
    }

    pub fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    pub async fn launch(&self) -> BrowserResult<BrowserAutomation> {
        self.launch_with_overrides(LaunchOverrides::default()).await
    }

    pub async fn launch_with_overrides(
        &self,
        overrides: LaunchOverrides,
    ) -> BrowserResult<BrowserAutomation> {
        let profile = self.profiles.open(&self.config.profile.name)?;
        let headless = overrides.headless.unwrap_or(self.config.chromium.headless);
        let chromium_config = self.build_chromium_config(&profile, headless)?;
        info!(
            profile = %profile.name(),
            width = self.config.viewport.width,
            height = self.config.viewport.height,
            headless,
            "Launching Chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        profile.touch().await?;

        Ok(BrowserAutomation {
            browser,
            profile,
            handler_task: Some(handler_task),
            config: Arc::clone(&self.config),
            metrics: Arc::new(Mutex::new(BrowserMetrics::default())),
        })
    }

    fn build_chromium_config(
        &self,
        profile: &BrowserProfile,
        headless: bool,
    ) -> BrowserResult<ChromiumConfig> {
        let chromium = &self.config.chromium;
        let viewport = &self.config.viewport;
        let mut builder = ChromiumConfig::builder()
            .user_data_dir(profile.path())
            .viewport(ChromiumViewport {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: viewport.width >= viewport.height,
                has_touch: false,
            });

        if let Some(executable) = &chromium.executable_path {
            builder = builder.chrome_executable(executable);
        }
        if !headless {
            builder = builder.with_head();
        }
        if !chromium.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = chromium.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![
            format!("--window-size={},{}", viewport.width, viewport.height),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--no-first-run".to_string(),
            "--password-store=basic".to_string(),
        ];
        if chromium.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if let Some(lang) = &chromium.lang {
            args.push(format!("--lang={lang}"));
        }
        if let Some(user_agent) = &chromium.user_agent {
            args.push(format!("--user-agent={user_agent}"));
        }

        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

#[derive(Debug)]
pub struct BrowserAutomation {
    browser: Browser,
    profile: BrowserProfile,
    handler_task: Option<JoinHandle<()>>,
    config: Arc<StorefrontConfig>,
    metrics: Arc<Mutex<BrowserMetrics>>,
}

impl BrowserAutomation {
    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }

    pub fn metrics(&self) -> BrowserMetrics {
        self.metrics
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn metrics_handle(&self) -> Arc<Mutex<BrowserMetrics>> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    pub async fn new_context(&self) -> BrowserResult<BrowserContext> {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record_page_open();
        }
        let params = CreateTargetParams::new("about:blank");
        let page = self.browser.new_page(params).await?;
        self.configure_page(&page).await?;
        Ok(BrowserContext {
            page,
            metrics: Arc::clone(&self.metrics),
        })
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!(profile = %self.profile.name(), "Shutting down Chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        Ok(())
    }

    async fn configure_page(&self, page: &Page) -> BrowserResult<()> {
        match &self.config.chromium.user_agent {
            Some(agent) => page.enable_stealth_mode_with_agent(agent).await?,
            None => page.enable_stealth_mode().await?,
        }
        Ok(())
    }
}

impl Drop for BrowserAutomation {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!(
                    profile = %self.profile.name(),
                    "BrowserAutomation dropped without explicit shutdown"
                );
            }
        }
    }
}

#[derive(Debug)]
pub struct BrowserContext {
    page: Page,
    metrics: Arc<Mutex<BrowserMetrics>>,
}

impl BrowserContext {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn goto(&self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.goto(params).await?;
        self.page.wait_for_navigation().await?;
        self.with_metrics(|metrics| metrics.record_navigation());
        Ok(())
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
}
