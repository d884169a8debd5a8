mod action;
mod automation;
mod error;
mod metrics;
mod profile;
mod session;
mod waiter;

pub use action::{ActionExecutor, ActionOutcome, FallbackOutcome, OutcomeKind};
pub use automation::{BrowserAutomation, BrowserContext, BrowserLauncher, LaunchOverrides};
pub use error::{BrowserError, BrowserResult};
pub use metrics::BrowserMetrics;
pub use profile::{BrowserProfile, ProfileManager};
pub use session::{BrowserMarketplaceSession, Locator, MarketplaceSession};
pub use waiter::{wait_until, PollingWaiter, WaitReport};
