//! Expansion of one crawl task
//!
//! A task is expanded by fetching its page and, depending on the node kind,
//! either producing child tasks (navigation) or downloading resources
//! (container). Expansion never fails as a whole: every problem is logged,
//! counted, and the affected branch is dropped.

use crate::crawler::fetcher::{DownloadOutcome, Fetcher};
use crate::crawler::parser::{extract_container, extract_links};
use crate::crawler::stats::StatsCollector;
use crate::site::{Container, CrawlTask, Navigation, NodeKind, SiblingPagination, SiteNode};
use crate::storage::HistoryStore;
use crate::url::{locate_page_token, resolve, sibling_hrefs};
use crate::{FetchError, HarvestError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Span;
use url::Url;

/// Everything a worker needs to expand tasks
pub struct Traversal {
    fetcher: Fetcher,
    history: Arc<HistoryStore>,
    store_dir: PathBuf,
    stats: Arc<StatsCollector>,
    cancel: CancellationToken,
    span: Span,
}

impl Traversal {
    pub fn new(
        fetcher: Fetcher,
        history: Arc<HistoryStore>,
        store_dir: PathBuf,
        stats: Arc<StatsCollector>,
        cancel: CancellationToken,
        span: Span,
    ) -> Self {
        Self {
            fetcher,
            history,
            store_dir,
            stats,
            cancel,
            span,
        }
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Expands `task` and returns the child tasks to enqueue
    pub async fn expand(&self, task: &CrawlTask) -> Vec<CrawlTask> {
        let url = task.url();
        tracing::debug!(parent: &self.span, "Expanding {}", task);

        let html = match self.fetcher.fetch_page(url).await {
            Ok(html) => html,
            Err(FetchError::Cancelled { .. }) => return Vec::new(),
            Err(e) => {
                self.stats.page_failed();
                tracing::warn!(parent: &self.span, "Failed to fetch page {}: {}", url, e);
                return Vec::new();
            }
        };
        self.stats.page_visited();

        match &task.node().kind {
            NodeKind::Navigation(nav) => self.expand_navigation(task, nav, &html),
            NodeKind::Container(container) => self.expand_container(task, container, &html).await,
        }
    }

    fn expand_navigation(&self, task: &CrawlTask, nav: &Navigation, html: &str) -> Vec<CrawlTask> {
        let url = task.url();
        let hrefs = match extract_links(html, &nav.child_selector) {
            Ok(hrefs) => hrefs,
            Err(message) => {
                self.report(&HarvestError::HtmlParse {
                    url: url.to_string(),
                    message,
                });
                return Vec::new();
            }
        };

        let hrefs = match &nav.pagination {
            Some(pagination) => self.sibling_pages(url, hrefs, pagination),
            None => hrefs,
        };

        let children: Vec<CrawlTask> = hrefs
            .iter()
            .filter_map(|href| self.child_task(task.node(), url, href))
            .collect();
        tracing::debug!(parent: &self.span, "{} yielded {} children", url, children.len());
        children
    }

    /// Replaces the matched links by the synthesized pages `1..=sibling_num`
    ///
    /// Only the first matched href is used as the page template. When it has
    /// no page token, pagination is skipped for this page and that href is
    /// followed on its own.
    fn sibling_pages(
        &self,
        url: &Url,
        hrefs: Vec<String>,
        pagination: &SiblingPagination,
    ) -> Vec<String> {
        let Some(first) = hrefs.into_iter().next() else {
            tracing::debug!(parent: &self.span, "No pagination links on {}", url);
            return Vec::new();
        };

        match locate_page_token(&first, &pagination.turn_page) {
            Ok(span) => sibling_hrefs(&first, span, pagination.sibling_num),
            Err(e) => {
                tracing::warn!(parent: &self.span, "Skipping pagination on {}: {}", url, e);
                vec![first]
            }
        }
    }

    fn child_task(&self, parent: &SiteNode, base: &Url, href: &str) -> Option<CrawlTask> {
        let child_url = match resolve(base.as_str(), href) {
            Ok(child_url) => child_url,
            Err(e) => {
                tracing::debug!(parent: &self.span, "Ignoring link '{}' on {}: {}", href, base, e);
                return None;
            }
        };

        let child = parent.instantiate_child(child_url)?;
        match CrawlTask::new(child) {
            Ok(task) => Some(task),
            Err(e) => {
                self.report(&e.into());
                None
            }
        }
    }

    async fn expand_container(
        &self,
        task: &CrawlTask,
        container: &Container,
        html: &str,
    ) -> Vec<CrawlTask> {
        let url = task.url();
        let page = match extract_container(html, &container.resources, container.info_text.as_deref()) {
            Ok(page) => page,
            Err(message) => {
                self.report(&HarvestError::HtmlParse {
                    url: url.to_string(),
                    message,
                });
                return Vec::new();
            }
        };

        tracing::debug!(
            parent: &self.span,
            "{} matched {} resources ({} with links)",
            url,
            page.matched,
            page.resource_links.len()
        );

        for link in &page.resource_links {
            if self.cancel.is_cancelled() {
                return Vec::new();
            }

            let resource_url = match resolve(url.as_str(), link) {
                Ok(resource_url) => resource_url,
                Err(e) => {
                    tracing::debug!(parent: &self.span, "Ignoring resource '{}' on {}: {}", link, url, e);
                    continue;
                }
            };

            let outcome = self
                .fetcher
                .download(
                    &resource_url,
                    &page.description,
                    &container.resources.default_suffix,
                    &self.store_dir,
                    &self.history,
                )
                .await;

            match outcome {
                Ok(DownloadOutcome::Saved(_)) => self.stats.resource_downloaded(),
                Ok(DownloadOutcome::Known) => self.stats.resource_skipped(),
                Ok(DownloadOutcome::InProgress) => self.stats.resource_in_progress(),
                Err(HarvestError::Fetch(FetchError::Cancelled { .. })) => return Vec::new(),
                Err(e) => {
                    self.stats.resource_failed();
                    tracing::warn!(parent: &self.span, "Failed to download {}: {}", resource_url, e);
                }
            }
        }

        if container.paging.is_none() || page.matched == 0 {
            return Vec::new();
        }
        match task.node().next_container_page(url) {
            Ok(Some(next)) => match CrawlTask::new(next) {
                Ok(next) => vec![next],
                Err(e) => {
                    self.report(&e.into());
                    Vec::new()
                }
            },
            Ok(None) => {
                tracing::debug!(parent: &self.span, "Paging from {} reached its limit", url);
                Vec::new()
            }
            Err(e) => {
                self.report(&e.into());
                Vec::new()
            }
        }
    }

    fn report(&self, error: &HarvestError) {
        tracing::warn!(parent: &self.span, "{}", error);
    }
}
