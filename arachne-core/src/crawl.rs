use crate::report::ReportData;
use arachne_scanner::{
    CrawlError, Crawler, Fetcher, HttpFetcher, TransportPolicy, VisitationLedger,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

pub const DEFAULT_URL: &str = "https://cuvva.com";
pub const DEFAULT_DEPTH: usize = 3;

/// Options for configuring a crawl operation
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub url: String,
    pub max_depth: usize,
    pub timeout: Duration,
    pub transport: TransportPolicy,
    pub show_progress_bars: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            max_depth: DEFAULT_DEPTH,
            timeout: arachne_scanner::crawler::DEFAULT_FETCH_TIMEOUT,
            transport: TransportPolicy::default(),
            show_progress_bars: false,
        }
    }
}

/// Callback for reporting failed identifiers as they happen
pub type CrawlFailureCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// The HTTP fetcher described by `options`.
pub fn http_fetcher(options: &CrawlOptions) -> Result<Arc<dyn Fetcher>, CrawlError> {
    let fetcher =
        HttpFetcher::with_timeout(options.timeout)?.with_transport_policy(options.transport);
    Ok(Arc::new(fetcher))
}

/// Crawl `options.url` with `fetcher` on a fresh ledger and gather the
/// report data once every branch has finished.
pub async fn execute_crawl(
    options: CrawlOptions,
    fetcher: Arc<dyn Fetcher>,
    cancel: CancellationToken,
    failure_callback: Option<CrawlFailureCallback>,
) -> ReportData {
    let CrawlOptions {
        url,
        max_depth,
        timeout,
        show_progress_bars,
        ..
    } = options;

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Starting crawl...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let claimed_count = Arc::new(AtomicUsize::new(0));
    let count_clone = claimed_count.clone();
    let pb_clone = progress_bar.clone();
    let progress_callback: arachne_scanner::ProgressCallback = Arc::new(move |url: String| {
        let count = count_clone.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(ref pb) = pb_clone {
            pb.set_message(format!(
                "Crawling... {} identifiers claimed ({})",
                count,
                extract_url_path(&url)
            ));
            pb.tick();
        }
    });

    let ledger = Arc::new(VisitationLedger::new());
    let mut crawler = Crawler::new(fetcher, ledger.clone())
        .with_timeout(timeout)
        .with_cancellation(cancel)
        .with_progress_callback(progress_callback);

    if let Some(cb) = failure_callback {
        let pb_clone = progress_bar.clone();
        crawler = crawler.with_failure_callback(Arc::new(move |url: String, reason: String| {
            let line = format!("<- Error on {}: {}", url, reason);
            match pb_clone {
                Some(ref pb) => pb.suspend(|| cb(line)),
                None => cb(line),
            }
        }));
    }

    crawler.crawl(&url, max_depth).await;

    if let Some(ref pb) = progress_bar {
        let total = claimed_count.load(Ordering::Relaxed);
        pb.finish_with_message(format!("Crawl complete! {} identifiers claimed", total));
    }

    ReportData::from_ledger(&url, max_depth, &ledger)
}
