use serde::{Deserialize, Serialize};

use super::action::OutcomeKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserMetrics {
    pub pages_opened: u64,
    pub navigations: u64,
    pub login_polls: u64,
    pub steps_succeeded: u64,
    pub steps_skipped: u64,
    pub steps_failed: u64,
    pub files_uploaded: u64,
}

impl BrowserMetrics {
    pub fn record_page_open(&mut self) {
        self.pages_opened = self.pages_opened.saturating_add(1);
    }

    pub fn record_navigation(&mut self) {
        self.navigations = self.navigations.saturating_add(1);
    }

    pub fn record_login_polls(&mut self, polls: u64) {
        self.login_polls = self.login_polls.saturating_add(polls);
    }

    pub fn record_outcome(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Success => self.steps_succeeded = self.steps_succeeded.saturating_add(1),
            OutcomeKind::Skipped => self.steps_skipped = self.steps_skipped.saturating_add(1),
            OutcomeKind::Failed => self.steps_failed = self.steps_failed.saturating_add(1),
        }
    }

    pub fn record_uploads(&mut self, count: u64) {
        self.files_uploaded = self.files_uploaded.saturating_add(count);
    }

    pub fn total_steps(&self) -> u64 {
        self.steps_succeeded + self.steps_skipped + self.steps_failed
    }

    pub fn step_success_rate(&self) -> f64 {
        let attempted = self.steps_succeeded + self.steps_failed;
        if attempted == 0 {
            0.0
        } else {
            (self.steps_succeeded as f64 / attempted as f64) * 100.0
        }
    }
}
