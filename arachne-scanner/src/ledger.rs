use crate::result::{CrawlFailure, FetchOutcome, Partition, VisitState};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Edge sets keyed by parent identifier.
pub type EdgeMap = HashMap<String, Partition>;

#[derive(Debug, Default)]
struct LedgerInner {
    states: HashMap<String, VisitState>,
    edges: EdgeMap,
}

/// Record of every identifier claimed during one crawl run.
///
/// All reads and writes go through a single lock. Callers must never hold
/// the lock across I/O; every method here takes and releases it internally.
#[derive(Debug, Default)]
pub struct VisitationLedger {
    inner: Mutex<LedgerInner>,
}

impl VisitationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        // A panicking holder cannot leave the maps half-written, so the
        // data behind a poisoned lock is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks `url` as in progress if nobody has claimed it yet.
    ///
    /// Returns `true` only for the first caller; everyone else must skip
    /// the fetch.
    pub fn try_claim(&self, url: &str) -> bool {
        let mut inner = self.lock();
        if inner.states.contains_key(url) {
            return false;
        }
        inner.states.insert(url.to_string(), VisitState::InProgress);
        true
    }

    /// Records the terminal outcome of `url` and splits `children` into
    /// identifiers that were unknown at this moment (`new`) and identifiers
    /// already claimed (`backlinks`).
    ///
    /// Edge sets are only stored for successful fetches. A failed fetch
    /// records its outcome and yields an empty partition.
    pub fn finalize(&self, url: &str, outcome: FetchOutcome, children: Vec<String>) -> Partition {
        let mut inner = self.lock();

        if let Some(VisitState::Done(_)) = inner.states.get(url) {
            let recorded = inner.edges.get(url).cloned().unwrap_or_default();
            drop(inner);
            warn!("{} finalized twice, keeping the first outcome", url);
            return recorded;
        }

        let succeeded = outcome.is_success();
        inner
            .states
            .insert(url.to_string(), VisitState::Done(outcome));

        if !succeeded {
            return Partition::default();
        }

        let mut partition = Partition::default();
        for child in children {
            if inner.states.contains_key(&child) {
                partition.backlinks.insert(child);
            } else {
                partition.new.insert(child);
            }
        }

        inner.edges.insert(url.to_string(), partition.clone());
        partition
    }

    pub fn state(&self, url: &str) -> Option<VisitState> {
        self.lock().states.get(url).cloned()
    }

    pub fn edges(&self, url: &str) -> Option<Partition> {
        self.lock().edges.get(url).cloned()
    }

    /// Number of successful claims so far.
    pub fn claimed_count(&self) -> usize {
        self.lock().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().states.is_empty()
    }

    /// Failed identifiers, sorted by identifier.
    pub fn failures(&self) -> Vec<CrawlFailure> {
        let inner = self.lock();
        let mut failures: Vec<CrawlFailure> = inner
            .states
            .iter()
            .filter_map(|(url, state)| match state {
                VisitState::Done(FetchOutcome::Failed(error)) => Some(CrawlFailure {
                    url: url.clone(),
                    error: error.clone(),
                }),
                _ => None,
            })
            .collect();
        failures.sort_by(|a, b| a.url.cmp(&b.url));
        failures
    }

    /// Snapshot of every recorded edge set, for tree building.
    pub fn edge_map(&self) -> EdgeMap {
        self.lock().edges.clone()
    }
}
