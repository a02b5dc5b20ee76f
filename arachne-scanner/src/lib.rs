pub mod crawler;
pub mod error;
pub mod fetcher;
pub mod ledger;
pub mod result;

pub use crawler::{Crawler, FailureCallback, ProgressCallback};
pub use error::CrawlError;
pub use fetcher::{Fetcher, HttpFetcher, TransportPolicy};
pub use ledger::{EdgeMap, VisitationLedger};
pub use result::{CrawlFailure, FetchOutcome, Partition, VisitState};
