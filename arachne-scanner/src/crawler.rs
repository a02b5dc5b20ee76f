use crate::error::{CrawlError, Result};
use crate::fetcher::Fetcher;
use crate::ledger::VisitationLedger;
use crate::result::FetchOutcome;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Called with each identifier right after it is claimed.
pub type ProgressCallback = Arc<dyn Fn(String) + Send + Sync>;
/// Called with the identifier and the reason when a fetch fails.
pub type FailureCallback = Arc<dyn Fn(String, String) + Send + Sync>;

struct CrawlContext {
    fetcher: Arc<dyn Fetcher>,
    ledger: Arc<VisitationLedger>,
    timeout: Duration,
    cancel: CancellationToken,
    progress_callback: Option<ProgressCallback>,
    failure_callback: Option<FailureCallback>,
}

impl CrawlContext {
    async fn fetch(&self, url: &str) -> Result<Vec<String>> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CrawlError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.fetcher.fetch(url, url)) => {
                result.map_err(|_| CrawlError::Timeout(self.timeout))?
            }
        }
    }
}

/// Recursive fan-out crawler over a shared [`VisitationLedger`].
///
/// Every newly discovered child gets its own task; a node returns only
/// after all of its children have returned.
pub struct Crawler {
    fetcher: Arc<dyn Fetcher>,
    ledger: Arc<VisitationLedger>,
    timeout: Duration,
    cancel: CancellationToken,
    progress_callback: Option<ProgressCallback>,
    failure_callback: Option<FailureCallback>,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn Fetcher>, ledger: Arc<VisitationLedger>) -> Self {
        Self {
            fetcher,
            ledger,
            timeout: DEFAULT_FETCH_TIMEOUT,
            cancel: CancellationToken::new(),
            progress_callback: None,
            failure_callback: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_failure_callback(mut self, callback: FailureCallback) -> Self {
        self.failure_callback = Some(callback);
        self
    }

    pub fn ledger(&self) -> &Arc<VisitationLedger> {
        &self.ledger
    }

    /// Crawls `root` and everything reachable from it within `max_depth`
    /// levels, the root itself being level one.
    pub async fn crawl(&self, root: &str, max_depth: usize) {
        info!("Starting crawl of {} with depth {}", root, max_depth);

        let context = Arc::new(CrawlContext {
            fetcher: self.fetcher.clone(),
            ledger: self.ledger.clone(),
            timeout: self.timeout,
            cancel: self.cancel.clone(),
            progress_callback: self.progress_callback.clone(),
            failure_callback: self.failure_callback.clone(),
        });
        crawl_node(context, root.to_string(), max_depth).await;

        info!(
            "Crawl complete. Claimed {} identifiers",
            self.ledger.claimed_count()
        );
    }
}

fn crawl_node(context: Arc<CrawlContext>, url: String, depth: usize) -> BoxFuture<'static, ()> {
    async move {
        if depth == 0 {
            return;
        }
        if !context.ledger.try_claim(&url) {
            debug!("{} already claimed", url);
            return;
        }

        if let Some(ref callback) = context.progress_callback {
            callback(url.clone());
        }

        let (outcome, children) = match context.fetch(&url).await {
            Ok(children) => (FetchOutcome::Success, children),
            Err(e) => (FetchOutcome::Failed(e.to_string()), Vec::new()),
        };
        let partition = context.ledger.finalize(&url, outcome.clone(), children);

        if let FetchOutcome::Failed(reason) = outcome {
            warn!("Crawl error for {}: {}", url, reason);
            if let Some(ref callback) = context.failure_callback {
                callback(url, reason);
            }
            return;
        }

        debug!(
            "{}: {} new, {} backlinks",
            url,
            partition.new.len(),
            partition.backlinks.len()
        );

        // Children at depth zero would return before claiming anything.
        if depth == 1 {
            return;
        }

        let handles: Vec<_> = partition
            .new
            .into_iter()
            .map(|child| tokio::spawn(crawl_node(context.clone(), child, depth - 1)))
            .collect();

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                warn!("Sub-crawl of {} failed: {}", url, CrawlError::from(e));
            }
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{HttpFetcher, TransportPolicy};
    use crate::result::VisitState;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    /// In-memory link graph that counts how often each page is fetched.
    #[derive(Default)]
    struct GraphFetcher {
        links: HashMap<String, Vec<String>>,
        failing: HashSet<String>,
        slow: HashSet<String>,
        fetches: Mutex<HashMap<String, usize>>,
    }

    impl GraphFetcher {
        fn new(edges: &[(&str, Vec<&str>)]) -> Self {
            let links = edges
                .iter()
                .map(|(from, to)| {
                    (from.to_string(), to.iter().map(|s| s.to_string()).collect())
                })
                .collect();
            Self {
                links,
                ..Default::default()
            }
        }

        fn failing(mut self, url: &str) -> Self {
            self.failing.insert(url.to_string());
            self
        }

        fn slow(mut self, url: &str) -> Self {
            self.slow.insert(url.to_string());
            self
        }

        fn fetch_count(&self, url: &str) -> usize {
            self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Fetcher for GraphFetcher {
        async fn fetch(&self, url: &str, _base_url: &str) -> Result<Vec<String>> {
            *self.fetches.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
            if self.slow.contains(url) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.failing.contains(url) {
                return Err(CrawlError::Other(format!("refused {}", url)));
            }
            Ok(self.links.get(url).cloned().unwrap_or_default())
        }
    }

    fn crawler_for(fetcher: Arc<GraphFetcher>) -> Crawler {
        Crawler::new(fetcher, Arc::new(VisitationLedger::new()))
    }

    #[tokio::test]
    async fn test_zero_depth_claims_nothing() {
        let fetcher = Arc::new(GraphFetcher::new(&[("a", vec!["b"])]));
        let crawler = crawler_for(fetcher.clone());

        crawler.crawl("a", 0).await;

        assert!(crawler.ledger().is_empty());
        assert_eq!(fetcher.fetch_count("a"), 0);
    }

    #[tokio::test]
    async fn test_depth_limits_exploration() {
        let fetcher = Arc::new(GraphFetcher::new(&[
            ("a", vec!["b"]),
            ("b", vec!["c"]),
            ("c", vec!["d"]),
        ]));
        let crawler = crawler_for(fetcher.clone());

        crawler.crawl("a", 2).await;

        let ledger = crawler.ledger();
        assert_eq!(ledger.claimed_count(), 2);
        assert!(ledger.state("c").is_none());
        // b's edge to c is recorded even though c was never fetched.
        assert!(ledger.edges("b").unwrap().new.contains("c"));
        assert_eq!(fetcher.fetch_count("c"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_each_identifier_fetched_once() {
        // Every page links to every page, including itself.
        let names: Vec<String> = (0..25).map(|i| format!("p{}", i)).collect();
        let all: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let edges: Vec<(&str, Vec<&str>)> = all.iter().map(|n| (*n, all.clone())).collect();
        let fetcher = Arc::new(GraphFetcher::new(&edges));
        let crawler = crawler_for(fetcher.clone());

        crawler.crawl("p0", 4).await;

        assert_eq!(crawler.ledger().claimed_count(), names.len());
        for name in &names {
            assert_eq!(fetcher.fetch_count(name), 1, "{} fetched more than once", name);
            assert!(matches!(
                crawler.ledger().state(name),
                Some(VisitState::Done(FetchOutcome::Success))
            ));
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_stops_branch_only() {
        let fetcher = Arc::new(
            GraphFetcher::new(&[
                ("root", vec!["bad", "good"]),
                ("bad", vec!["hidden"]),
                ("good", vec!["leaf"]),
            ])
            .failing("bad"),
        );
        let failures = Arc::new(Mutex::new(Vec::new()));
        let failures_clone = failures.clone();
        let crawler = crawler_for(fetcher.clone()).with_failure_callback(Arc::new(
            move |url: String, reason: String| failures_clone.lock().unwrap().push((url, reason)),
        ));

        crawler.crawl("root", 3).await;

        let ledger = crawler.ledger();
        assert!(ledger.state("hidden").is_none());
        assert!(ledger.edges("bad").is_none());
        assert!(matches!(
            ledger.state("leaf"),
            Some(VisitState::Done(FetchOutcome::Success))
        ));

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "bad");
        assert!(failures[0].1.contains("refused bad"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_failure_outcome() {
        let fetcher = Arc::new(GraphFetcher::new(&[("root", vec!["slow", "fast"])]).slow("slow"));
        let crawler = crawler_for(fetcher).with_timeout(Duration::from_millis(50));

        crawler.crawl("root", 2).await;

        let ledger = crawler.ledger();
        let failures = ledger.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].url, "slow");
        assert!(failures[0].error.contains("timed out"));
        assert!(matches!(
            ledger.state("fast"),
            Some(VisitState::Done(FetchOutcome::Success))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_token_fails_fetch() {
        let fetcher = Arc::new(GraphFetcher::new(&[("root", vec!["child"])]));
        let token = CancellationToken::new();
        token.cancel();
        let crawler = crawler_for(fetcher).with_cancellation(token);

        crawler.crawl("root", 3).await;

        let ledger = crawler.ledger();
        assert_eq!(ledger.claimed_count(), 1);
        assert_eq!(
            ledger.state("root"),
            Some(VisitState::Done(FetchOutcome::Failed("Fetch cancelled".to_string())))
        );
    }

    #[tokio::test]
    async fn test_progress_callback_sees_every_claim() {
        let fetcher = Arc::new(GraphFetcher::new(&[("a", vec!["b", "c"]), ("b", vec!["a", "c"])]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let crawler = crawler_for(fetcher).with_progress_callback(Arc::new(move |url: String| {
            seen_clone.lock().unwrap().push(url);
        }));

        crawler.crawl("a", 3).await;

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_crawl_over_http() {
        let mock_server = MockServer::start().await;
        let uri = mock_server.uri();

        let pages = [
            ("/", format!(r#"<a href="{uri}/pkg/">pkg</a><a href="http://elsewhere.test/">x</a>"#)),
            ("/pkg/", r#"<a href="/cmd/">cmd</a><a href="/">home</a>"#.to_string()),
            ("/cmd/", "<p>no links</p>".to_string()),
        ];
        for (page, body) in pages {
            Mock::given(method("GET"))
                .and(path(page))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "text/html")
                        .set_body_bytes(body.into_bytes()),
                )
                .expect(1)
                .mount(&mock_server)
                .await;
        }

        let root = format!("{}/", uri);
        let crawler = Crawler::new(
            Arc::new(HttpFetcher::new().unwrap()),
            Arc::new(VisitationLedger::new()),
        );
        crawler.crawl(&root, 3).await;

        let ledger = crawler.ledger();
        assert_eq!(ledger.claimed_count(), 3);
        let pkg = ledger.edges(&format!("{}/pkg/", uri)).unwrap();
        assert!(pkg.backlinks.contains(&root));
        assert!(pkg.new.contains(&format!("{}/cmd/", uri)));
        assert!(ledger.failures().is_empty());
    }

    #[tokio::test]
    async fn test_http_timeout_is_failure_under_every_policy() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(r#"<a href="/never">never</a>"#)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let root = format!("{}/", mock_server.uri());
        let timeout = Duration::from_millis(300);
        for policy in [TransportPolicy::Lenient, TransportPolicy::Strict] {
            let fetcher = HttpFetcher::with_timeout(timeout)
                .unwrap()
                .with_transport_policy(policy);
            let crawler = Crawler::new(Arc::new(fetcher), Arc::new(VisitationLedger::new()))
                .with_timeout(timeout);

            crawler.crawl(&root, 3).await;

            let ledger = crawler.ledger();
            let failures = ledger.failures();
            assert_eq!(failures.len(), 1, "{:?} policy", policy);
            assert_eq!(failures[0].url, root);
            assert_eq!(failures[0].error, "Fetch timed out after 300ms");
            assert!(ledger.edges(&root).is_none());
        }
    }
}
