use std::time::Duration;

use clap::Args;
use storefront_core::{LoginOptions, RunOptions};

/// Parameters of the `run` command.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Process at most this many catalog entries.
    #[arg(long)]
    pub limit: Option<usize>,
    /// Only process these product ids (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<u32>,
    /// Skip the shop creation flow.
    #[arg(long, default_value_t = false)]
    pub skip_shop_setup: bool,
    /// Do not visit the shop settings page after listing.
    #[arg(long, default_value_t = false)]
    pub no_settings_review: bool,
    /// Close the browser as soon as the run finishes instead of waiting for Ctrl+C.
    #[arg(long, default_value_t = false)]
    pub no_hold: bool,
    /// Run Chromium without a window.
    #[arg(long, default_value_t = false)]
    pub headless: bool,
    /// Seconds to wait for the manual login.
    #[arg(long)]
    pub login_timeout: Option<u64>,
}

impl RunArgs {
    pub fn to_options(&self) -> RunOptions {
        RunOptions {
            limit: self.limit,
            only: self.only.clone(),
            skip_shop_setup: self.skip_shop_setup,
            review_settings: !self.no_settings_review,
            hold_for_review: !self.no_hold,
            headless: self.headless.then_some(true),
            login_timeout: self.login_timeout.map(Duration::from_secs),
        }
    }
}

/// Parameters of the `login` command.
#[derive(Args, Debug, Clone, Default)]
pub struct LoginArgs {
    /// Close the browser as soon as the login is detected.
    #[arg(long, default_value_t = false)]
    pub no_hold: bool,
    /// Seconds to wait for the manual login.
    #[arg(long)]
    pub login_timeout: Option<u64>,
}

impl LoginArgs {
    pub fn to_options(&self) -> LoginOptions {
        LoginOptions {
            headless: Some(false),
            login_timeout: self.login_timeout.map(Duration::from_secs),
            hold_open: !self.no_hold,
        }
    }
}
