use crate::error::{CrawlError, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Turns one document into the identifiers it links to.
///
/// Implementations are dropped mid-flight when the crawler's timeout or
/// cancellation fires, so they must not rely on running to completion.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, base_url: &str) -> Result<Vec<String>>;
}

/// What to do when the request itself fails to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportPolicy {
    /// Treat the page as having no links.
    #[default]
    Lenient,
    /// Report the failure so the page is recorded as failed.
    Strict,
}

pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    transport: TransportPolicy,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Arachne/0.1 (https://github.com/trapdoorsec/arachne)")
            .timeout(timeout)
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            timeout,
            transport: TransportPolicy::default(),
        })
    }

    pub fn with_transport_policy(mut self, transport: TransportPolicy) -> Self {
        self.transport = transport;
        self
    }

    async fn get_body(&self, url: Url) -> Result<(Option<String>, String)> {
        let response = self.client.get(url).send().await?;
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.text().await?;
        Ok((content_type, body))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, base_url: &str) -> Result<Vec<String>> {
        let target =
            Url::parse(url).map_err(|e| CrawlError::InvalidUrl(format!("{}: {}", url, e)))?;
        let base = Url::parse(base_url)
            .map_err(|e| CrawlError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        debug!("Fetching {}", url);

        let (content_type, body) = match self.get_body(target).await {
            Ok(page) => page,
            // A timeout is a failure under either policy.
            Err(CrawlError::HttpError(e)) if e.is_timeout() => {
                debug!("Request to {} timed out: {}", url, e);
                return Err(CrawlError::Timeout(self.timeout));
            }
            Err(e) => match self.transport {
                TransportPolicy::Strict => return Err(e),
                TransportPolicy::Lenient => {
                    debug!("Transport error for {} ignored: {}", url, e);
                    return Ok(Vec::new());
                }
            },
        };

        let is_html = content_type
            .as_ref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(true);
        if !is_html {
            return Ok(Vec::new());
        }

        Ok(extract_links(&body, &base))
    }
}

/// Same-origin link targets in `html`, resolved against `base`, in
/// document order with duplicates removed.
pub fn extract_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(link_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links: Vec<String> = Vec::new();
    for element in document.select(&link_selector) {
        if let Some(href) = element.value().attr("href")
            && let Some(absolute_url) = resolve_url(base, href)
        {
            if is_same_origin(&absolute_url, base) {
                debug!("Found link: {}", absolute_url);
                let link = absolute_url.to_string();
                if !links.contains(&link) {
                    links.push(link);
                }
            } else {
                debug!("  -> Cross-origin, skipping {}", absolute_url);
            }
        }
    }
    links
}

fn resolve_url(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    // Skip empty, javascript:, mailto:, tel:, and in-page anchors
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    url.set_fragment(None);
    Some(url)
}

fn is_same_origin(url: &Url, base: &Url) -> bool {
    url.origin() == base.origin()
}
