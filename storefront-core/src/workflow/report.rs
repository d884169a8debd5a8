use serde::Serialize;

use super::listing::{ListingResult, PublishMethod};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub product_id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub published: usize,
    pub drafts: usize,
    pub failed: usize,
    pub failed_items: Vec<FailedItem>,
}

impl RunSummary {
    pub fn all_published(&self) -> bool {
        self.failed == 0
    }
}

/// Pure aggregation over per-item results. Drafts count as published.
pub fn summarize(results: &[ListingResult]) -> RunSummary {
    let failed_items: Vec<FailedItem> = results
        .iter()
        .filter(|result| !result.published)
        .map(|result| FailedItem {
            product_id: result.product_id,
            name: result.name.clone(),
        })
        .collect();
    let published = results.iter().filter(|result| result.published).count();
    let drafts = results
        .iter()
        .filter(|result| result.published_via == Some(PublishMethod::SaveDraft))
        .count();
    RunSummary {
        attempted: results.len(),
        published,
        drafts,
        failed: failed_items.len(),
        failed_items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::listing::ListingStage;

    fn result(id: u32, via: Option<PublishMethod>) -> ListingResult {
        let stage = if via.is_some() {
            ListingStage::Published
        } else {
            ListingStage::PublishFailed
        };
        ListingResult {
            product_id: id,
            name: format!("product {id}"),
            steps: Vec::new(),
            stages: vec![ListingStage::NotStarted, stage],
            stage,
            published: via.is_some(),
            published_via: via,
        }
    }

    #[test]
    fn counts_published_and_failed() {
        let results = vec![
            result(1, Some(PublishMethod::Publish)),
            result(2, None),
            result(3, Some(PublishMethod::SaveDraft)),
        ];
        let summary = summarize(&results);
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.published, 2);
        assert_eq!(summary.drafts, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_items[0].name, "product 2");
        assert!(!summary.all_published());
    }

    #[test]
    fn empty_run_is_all_published() {
        let summary = summarize(&[]);
        assert_eq!(summary, RunSummary::default());
        assert!(summary.all_published());
    }
}
