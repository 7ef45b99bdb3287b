//! Page and resource fetching
//!
//! This module handles all network access for the crawler, including:
//! - The [`Transport`] boundary, so traversal can run against any byte source
//! - Building HTTP clients with proper user agent strings
//! - Decoding legacy-charset pages to UTF-8
//! - Fixed-delay retry of failed fetches
//! - Downloading resources into the store at most once

use crate::config::{RetryConfig, UserAgentConfig};
use crate::site::ResourceInfo;
use crate::storage::{Claim, HistoryStore};
use crate::{FetchError, FetchResult, HarvestError};
use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use reqwest::{header::CONTENT_TYPE, Client};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Span;
use url::Url;

/// Source of page text and resource bytes
///
/// A non-success status must be reported as [`FetchError::Status`]; retrying
/// is done by [`Fetcher`], not by the transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches a page and returns its body decoded to UTF-8
    async fn get_page(&self, url: &Url) -> FetchResult<String>;

    /// Fetches the raw bytes of a resource
    async fn get_bytes(&self, url: &Url) -> FetchResult<Vec<u8>>;
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```
/// use site_harvester::config::UserAgentConfig;
/// use site_harvester::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version
    let user_agent = format!("{}/{}", config.crawler_name, config.crawler_version);

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Transport`] over a reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, url: &Url) -> FetchResult<reqwest::Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| network_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_page(&self, url: &Url) -> FetchResult<String> {
        let response = self.send(url).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(|e| network_error(url, &e))?;
        Ok(decode_html(&body, content_type.as_deref()))
    }

    async fn get_bytes(&self, url: &Url) -> FetchResult<Vec<u8>> {
        let response = self.send(url).await?;
        let body = response.bytes().await.map_err(|e| network_error(url, &e))?;
        Ok(body.to_vec())
    }
}

fn network_error(url: &Url, error: &reqwest::Error) -> FetchError {
    let message = if error.is_timeout() {
        "request timeout".to_string()
    } else if error.is_connect() {
        "connection refused".to_string()
    } else {
        error.to_string()
    };
    FetchError::Network {
        url: url.to_string(),
        message,
    }
}

/// Decodes a page body to UTF-8
///
/// The charset comes from the `Content-Type` header when present, otherwise
/// from a `charset=` declaration in the first 1024 bytes of the document. A
/// byte order mark overrides both; unknown labels fall back to UTF-8.
///
/// # Example
///
/// ```
/// use site_harvester::crawler::decode_html;
///
/// // "美食" in GBK
/// let body = [0xC3, 0xC0, 0xCA, 0xB3];
/// assert_eq!(decode_html(&body, Some("text/html; charset=GBK")), "美食");
/// ```
pub fn decode_html(body: &[u8], content_type: Option<&str>) -> String {
    let label = content_type
        .and_then(charset_label)
        .or_else(|| sniff_meta_charset(body));
    let encoding = label
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

fn charset_label(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let start = lower.find("charset=")? + "charset=".len();
    let label: String = lower[start..]
        .trim_start_matches(&['"', '\''][..])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(*c, '-' | '_' | ':' | '.'))
        .collect();
    (!label.is_empty()).then_some(label)
}

fn sniff_meta_charset(body: &[u8]) -> Option<String> {
    let head = &body[..body.len().min(1024)];
    charset_label(&String::from_utf8_lossy(head))
}

/// Retry schedule applied to every fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.delay(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// What [`Fetcher::download`] did with a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fetched, written to the store and recorded in the history
    Saved(ResourceInfo),
    /// Already recorded by this or an earlier crawl
    Known,
    /// Another worker is downloading the same resource
    InProgress,
}

/// Retrying fetch front-end shared by every worker
///
/// Every event is emitted under the span handed to [`Fetcher::new`], and
/// every wait observes the crawl's cancellation token.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    span: Span,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        cancel: CancellationToken,
        span: Span,
    ) -> Self {
        Self {
            transport,
            retry,
            cancel,
            span,
        }
    }

    /// Fetches a page, retrying on failure
    pub async fn fetch_page(&self, url: &Url) -> FetchResult<String> {
        self.with_retry(url, move || self.transport.get_page(url))
            .await
    }

    /// Fetches resource bytes, retrying on failure; an empty body is a failure
    pub async fn fetch_resource(&self, url: &Url) -> FetchResult<Vec<u8>> {
        self.with_retry(url, move || async move {
            let bytes = self.transport.get_bytes(url).await?;
            if bytes.is_empty() {
                return Err(FetchError::EmptyBody {
                    url: url.to_string(),
                });
            }
            Ok(bytes)
        })
        .await
    }

    /// Downloads one resource unless the history already has it
    ///
    /// The resource is claimed in `history` before any network access, so two
    /// workers that discover the same URL download it once. On failure the
    /// claim is released and nothing is recorded; on success the bytes are
    /// stored as `{store_dir}/{hash}.{ext}` and the record is added.
    pub async fn download(
        &self,
        url: &Url,
        description: &str,
        default_suffix: &str,
        store_dir: &Path,
        history: &HistoryStore,
    ) -> Result<DownloadOutcome, HarvestError> {
        let info = ResourceInfo::new(url, description, default_suffix);

        match history.try_claim(&info.content_hash) {
            Claim::Known => {
                tracing::debug!(parent: &self.span, "Skipping known resource {}", url);
                return Ok(DownloadOutcome::Known);
            }
            Claim::InProgress => {
                tracing::debug!(parent: &self.span, "Resource {} is already being fetched", url);
                return Ok(DownloadOutcome::InProgress);
            }
            Claim::Acquired => {}
        }

        let saved = async {
            let bytes = self.fetch_resource(url).await?;
            write_resource(store_dir, &info, &bytes, &self.span).await?;
            Ok::<_, HarvestError>(bytes.len())
        }
        .await;

        match saved {
            Ok(size) => {
                tracing::info!(parent: &self.span, "Saved {} ({} bytes) as {}", url, size, info.file_name());
                history.put(info.clone());
                Ok(DownloadOutcome::Saved(info))
            }
            Err(e) => {
                history.release(&info.content_hash);
                Err(e)
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, url: &Url, mut attempt_once: F) -> FetchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        let mut attempt = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled {
                    url: url.to_string(),
                });
            }

            attempt += 1;
            let error = match attempt_once().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !is_transient(&error) {
                return Err(error);
            }
            if attempt >= self.retry.max_attempts {
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            tracing::warn!(
                parent: &self.span,
                "Attempt {}/{} for {} failed: {}",
                attempt,
                self.retry.max_attempts,
                url,
                error
            );
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(FetchError::Cancelled { url: url.to_string() });
                }
                _ = tokio::time::sleep(self.retry.delay) => {}
            }
        }
    }
}

/// Client errors other than timeouts and throttling will not change on retry
fn is_transient(error: &FetchError) -> bool {
    match error {
        FetchError::Status { status, .. } => {
            !(400..500).contains(status) || *status == 408 || *status == 429
        }
        FetchError::Cancelled { .. } => false,
        _ => true,
    }
}

/// Writes resource bytes under their content address, never replacing a file
async fn write_resource(
    store_dir: &Path,
    info: &ResourceInfo,
    bytes: &[u8],
    span: &Span,
) -> std::io::Result<()> {
    tokio::fs::create_dir_all(store_dir).await?;

    let path = store_dir.join(info.file_name());
    if tokio::fs::try_exists(&path).await? {
        tracing::debug!(parent: span, "{} already on disk, keeping it", path.display());
        return Ok(());
    }

    let partial = store_dir.join(format!("{}.part", info.file_name()));
    tokio::fs::write(&partial, bytes).await?;
    tokio::fs::rename(&partial, &path).await
}
