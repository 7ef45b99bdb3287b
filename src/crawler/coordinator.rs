//! Crawler coordinator - wires a configuration into a running crawl
//!
//! This module connects the pieces a crawl needs:
//! - The HTTP transport and retrying fetcher
//! - The history store loaded from its backend
//! - The root site descriptors turned into seed tasks
//! - The scheduler that runs the worker pool

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, Fetcher, HttpTransport, RetryPolicy, Transport};
use crate::crawler::scheduler::Scheduler;
use crate::crawler::stats::{CrawlStats, StatsCollector};
use crate::crawler::traversal::Traversal;
use crate::site::CrawlTask;
use crate::storage::{open_history, HistoryStore};
use crate::HarvestError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main crawl coordinator
pub struct Coordinator {
    config: Config,
    transport: Arc<dyn Transport>,
    history: HistoryStore,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a coordinator fetching over HTTP
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built or the history snapshot
    /// cannot be loaded. Nothing has been fetched at that point.
    pub fn new(config: Config, cancel: CancellationToken) -> Result<Self, HarvestError> {
        let client = build_http_client(&config.user_agent)?;
        let history = open_history(&config.history)?;
        Ok(Self::with_transport(
            config,
            Arc::new(HttpTransport::new(client)),
            history,
            cancel,
        ))
    }

    /// Creates a coordinator over any transport and an already loaded history
    pub fn with_transport(
        config: Config,
        transport: Arc<dyn Transport>,
        history: HistoryStore,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            transport,
            history,
            cancel,
        }
    }

    /// Runs the crawl to completion or cancellation
    pub async fn run(self) -> Result<CrawlStats, HarvestError> {
        let span = tracing::info_span!("crawl", source = %self.config.history.source_id);

        let seeds = self
            .config
            .sites
            .iter()
            .cloned()
            .map(CrawlTask::new)
            .collect::<Result<Vec<_>, _>>()?;
        for seed in &seeds {
            tracing::debug!(parent: &span, "Site tree:\n{}", seed.node().render_tree());
        }

        tracing::info!(
            parent: &span,
            "Loaded {} history entries for '{}' from {} backend",
            self.history.len(),
            self.history.source_id(),
            self.history.backend_name()
        );
        tracing::info!(
            parent: &span,
            "Crawling {} sites into {}",
            seeds.len(),
            self.config.crawler.store_dir
        );

        let fetcher = Fetcher::new(
            self.transport,
            RetryPolicy::from(&self.config.retry),
            self.cancel.clone(),
            span.clone(),
        );
        let traversal = Traversal::new(
            fetcher,
            Arc::new(self.history),
            PathBuf::from(&self.config.crawler.store_dir),
            Arc::new(StatsCollector::new()),
            self.cancel.clone(),
            span.clone(),
        );

        Scheduler::new(&self.config.crawler, traversal, self.cancel, span)
            .run(seeds)
            .await
    }
}

/// Runs a complete crawl over HTTP
///
/// # Example
///
/// ```no_run
/// use site_harvester::config::load_config;
/// use site_harvester::crawler::run_crawl;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let stats = run_crawl(config, CancellationToken::new()).await?;
/// println!("{stats}");
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, cancel: CancellationToken) -> Result<CrawlStats, HarvestError> {
    Coordinator::new(config, cancel)?.run().await
}
