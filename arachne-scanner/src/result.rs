use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Terminal result of fetching one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchOutcome {
    Success,
    Failed(String),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success)
    }
}

/// Claim state of an identifier within one crawl run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitState {
    InProgress,
    Done(FetchOutcome),
}

/// Children of a finalized identifier, split by whether they had already
/// been claimed when the parent's fetch completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub new: BTreeSet<String>,
    pub backlinks: BTreeSet<String>,
}

impl Partition {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.backlinks.is_empty()
    }
}

/// A failed identifier and the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlFailure {
    pub url: String,
    pub error: String,
}
