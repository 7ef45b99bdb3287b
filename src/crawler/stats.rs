//! Crawl counters shared by the workers

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Summary of a finished (or cancelled) crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Tasks taken off the queue and fully expanded
    pub tasks_processed: u64,
    pub pages_visited: u64,
    pub pages_failed: u64,
    pub resources_downloaded: u64,
    /// Resources skipped because the history already had them
    pub resources_skipped: u64,
    /// Resources left to another worker that was already downloading them
    ///
    /// If that worker fails, the resource is counted in `resources_failed`
    /// and stays uncollected until a later run finds it again.
    pub resources_in_progress: u64,
    pub resources_failed: u64,
    pub cancelled: bool,
    /// Set when a worker died and the remaining tasks were dropped
    pub aborted: bool,
}

impl fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tasks, {} pages ({} failed), {} resources saved, {} already known, \
             {} fetched elsewhere, {} failed{}{}",
            self.tasks_processed,
            self.pages_visited,
            self.pages_failed,
            self.resources_downloaded,
            self.resources_skipped,
            self.resources_in_progress,
            self.resources_failed,
            if self.cancelled { " (cancelled)" } else { "" },
            if self.aborted { " (aborted)" } else { "" }
        )
    }
}

/// Lock-free counters updated by workers while the crawl runs
#[derive(Debug, Default)]
pub struct StatsCollector {
    tasks_processed: AtomicU64,
    pages_visited: AtomicU64,
    pages_failed: AtomicU64,
    resources_downloaded: AtomicU64,
    resources_skipped: AtomicU64,
    resources_in_progress: AtomicU64,
    resources_failed: AtomicU64,
    cancelled: AtomicBool,
    aborted: AtomicBool,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finished task and returns the running total
    pub fn task_processed(&self) -> u64 {
        self.tasks_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn page_visited(&self) {
        self.pages_visited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn page_failed(&self) {
        self.pages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resource_downloaded(&self) {
        self.resources_downloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resource_skipped(&self) {
        self.resources_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resource_in_progress(&self) {
        self.resources_in_progress.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resource_failed(&self) {
        self.resources_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn mark_aborted(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Copies the current counter values
    pub fn snapshot(&self) -> CrawlStats {
        CrawlStats {
            tasks_processed: self.tasks_processed.load(Ordering::Relaxed),
            pages_visited: self.pages_visited.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            resources_downloaded: self.resources_downloaded.load(Ordering::Relaxed),
            resources_skipped: self.resources_skipped.load(Ordering::Relaxed),
            resources_in_progress: self.resources_in_progress.load(Ordering::Relaxed),
            resources_failed: self.resources_failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}
