//! In-memory site used by the crawler unit tests

use crate::crawler::fetcher::{Fetcher, RetryPolicy, Transport};
use crate::crawler::stats::StatsCollector;
use crate::crawler::traversal::Traversal;
use crate::storage::{HistoryStore, MemoryBackend};
use crate::{FetchError, FetchResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Span, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use url::Url;

/// Pages and files keyed by absolute URL; anything else is a 404
#[derive(Default)]
pub struct StaticSite {
    pages: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
    page_hits: Mutex<HashMap<String, u32>>,
    file_hits: AtomicU32,
    panic_on: Option<String>,
}

impl StaticSite {
    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn file(mut self, url: &str, bytes: &[u8]) -> Self {
        self.files.insert(url.to_string(), bytes.to_vec());
        self
    }

    /// Makes fetching `url` panic, as a crashing worker would
    pub fn panic_on(mut self, url: &str) -> Self {
        self.panic_on = Some(url.to_string());
        self
    }

    pub fn page_hits(&self, url: &str) -> u32 {
        self.page_hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn file_hits(&self) -> u32 {
        self.file_hits.load(Ordering::SeqCst)
    }
}

fn not_found(url: &Url) -> FetchError {
    FetchError::Status {
        url: url.to_string(),
        status: 404,
    }
}

#[async_trait]
impl Transport for StaticSite {
    async fn get_page(&self, url: &Url) -> FetchResult<String> {
        if self.panic_on.as_deref() == Some(url.as_str()) {
            panic!("transport crashed on {url}");
        }
        *self
            .page_hits
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
        self.pages.get(url.as_str()).cloned().ok_or_else(|| not_found(url))
    }

    async fn get_bytes(&self, url: &Url) -> FetchResult<Vec<u8>> {
        self.file_hits.fetch_add(1, Ordering::SeqCst);
        self.files.get(url.as_str()).cloned().ok_or_else(|| not_found(url))
    }
}

/// Records the name of the span each event is emitted under
#[derive(Clone, Default)]
pub struct SpanRecorder {
    parents: Arc<Mutex<Vec<Option<String>>>>,
}

impl SpanRecorder {
    /// Routes this thread's events to the recorder until the guard drops
    pub fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn parents(&self) -> Vec<Option<String>> {
        self.parents.lock().unwrap().clone()
    }
}

impl<S> Layer<S> for SpanRecorder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let parent = ctx.event_span(event).map(|span| span.name().to_string());
        self.parents.lock().unwrap().push(parent);
    }
}

/// Builds a traversal over `site` with a single attempt per fetch
pub fn traversal(site: Arc<StaticSite>, store_dir: &Path, cancel: CancellationToken) -> Traversal {
    let retry = RetryPolicy {
        max_attempts: 1,
        delay: Duration::from_millis(1),
    };
    let fetcher = Fetcher::new(site, retry, cancel.clone(), Span::none());
    let history = HistoryStore::load(Box::new(MemoryBackend::new()), "test").unwrap();
    Traversal::new(
        fetcher,
        Arc::new(history),
        store_dir.to_path_buf(),
        Arc::new(StatsCollector::new()),
        cancel,
        Span::none(),
    )
}
