//! Worker pool driving the crawl to completion
//!
//! This module handles:
//! - A bounded queue of pending crawl tasks shared by all workers
//! - Counting outstanding tasks to detect when the crawl has finished
//! - Backpressure without deadlock when the queue is full
//! - Stopping every worker on operator cancellation
//! - Flushing the history store exactly once at the end

use crate::config::CrawlerConfig;
use crate::crawler::stats::CrawlStats;
use crate::crawler::traversal::Traversal;
use crate::site::CrawlTask;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// Tasks enqueued but not yet fully processed
///
/// The count is raised for every child before its parent is marked done, so
/// it can only reach zero once no task exists anywhere: queued, held in a
/// worker's backlog, or being expanded. Reaching zero latches `quiescent`.
struct InFlight {
    count: AtomicUsize,
    peak: AtomicUsize,
    quiescent: CancellationToken,
}

impl InFlight {
    fn new(initial: usize) -> Self {
        let quiescent = CancellationToken::new();
        if initial == 0 {
            quiescent.cancel();
        }
        Self {
            count: AtomicUsize::new(initial),
            peak: AtomicUsize::new(initial),
            quiescent,
        }
    }

    fn add(&self, n: usize) {
        let now = self.count.fetch_add(n, Ordering::AcqRel) + n;
        self.peak.fetch_max(now, Ordering::AcqRel);
    }

    fn done(&self, span: &Span) {
        match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(1) => self.quiescent.cancel(),
            Ok(_) => {}
            Err(_) => tracing::error!(parent: span, "In-flight counter released below zero"),
        }
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Highest number of tasks ever outstanding at once
    fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

/// State shared by every worker of one run
struct WorkerShared {
    tx: mpsc::Sender<CrawlTask>,
    rx: Mutex<mpsc::Receiver<CrawlTask>>,
    in_flight: InFlight,
    traversal: Arc<Traversal>,
    /// Child of the operator token; also cancelled when a worker dies
    stop: CancellationToken,
    span: Span,
}

impl WorkerShared {
    fn new(
        queue_capacity: usize,
        outstanding: usize,
        traversal: Arc<Traversal>,
        stop: CancellationToken,
        span: Span,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            in_flight: InFlight::new(outstanding),
            traversal,
            stop,
            span,
        }
    }

    fn task_done(&self) {
        self.in_flight.done(&self.span);
    }

    /// Waits for the next queued task; `None` once the crawl is over
    async fn next_task(&self) -> Option<CrawlTask> {
        let mut rx = tokio::select! {
            rx = self.rx.lock() => rx,
            _ = self.in_flight.quiescent.cancelled() => return None,
            _ = self.stop.cancelled() => return None,
        };
        tokio::select! {
            task = rx.recv() => task,
            _ = self.in_flight.quiescent.cancelled() => None,
            _ = self.stop.cancelled() => None,
        }
    }

    /// Moves backlog tasks into the shared queue while it has room
    fn offer_backlog(&self, backlog: &mut VecDeque<CrawlTask>) {
        while let Some(task) = backlog.pop_front() {
            match self.tx.try_send(task) {
                Ok(()) => {}
                Err(TrySendError::Full(task)) => {
                    backlog.push_front(task);
                    return;
                }
                Err(TrySendError::Closed(_)) => self.task_done(),
            }
        }
    }
}

/// Bounded worker pool over a shared pending-task queue
///
/// Workers never block on a full queue: children that do not fit are kept in
/// the producing worker's local backlog. Before taking shared work, a worker
/// offers its oldest backlog tasks to the queue and runs the newest ones
/// itself, depth-first. A backlog therefore only holds the children of the
/// pages on one root-to-leaf path, and the work outstanding at any time stays
/// within the queue capacity plus `workers × depth × fan-out`.
///
/// A run ends when no task is outstanding, when the operator's token is
/// cancelled, or when a worker dies; the last case is reported as aborted.
pub struct Scheduler {
    workers: usize,
    queue_capacity: usize,
    traversal: Arc<Traversal>,
    cancel: CancellationToken,
    span: Span,
}

impl Scheduler {
    pub fn new(
        config: &CrawlerConfig,
        traversal: Traversal,
        cancel: CancellationToken,
        span: Span,
    ) -> Self {
        Self {
            workers: (config.workers as usize).max(1),
            queue_capacity: config.queue_capacity().max(1),
            traversal: Arc::new(traversal),
            cancel,
            span,
        }
    }

    /// Crawls from `seeds` until quiescence or cancellation
    ///
    /// The history store is flushed exactly once before returning, whether the
    /// run completed or was cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error only when the final history flush fails; the counters
    /// of the run are logged before that.
    pub async fn run(self, seeds: Vec<CrawlTask>) -> crate::Result<CrawlStats> {
        let shared = Arc::new(WorkerShared::new(
            self.queue_capacity,
            seeds.len(),
            self.traversal.clone(),
            self.cancel.child_token(),
            self.span.clone(),
        ));

        tracing::info!(
            parent: &self.span,
            "Starting {} workers on {} seeds (queue capacity {})",
            self.workers,
            seeds.len(),
            self.queue_capacity
        );
        let start_time = std::time::Instant::now();

        let seeder = {
            let shared = shared.clone();
            tokio::spawn(async move {
                for task in seeds {
                    tokio::select! {
                        _ = shared.stop.cancelled() => break,
                        sent = shared.tx.send(task) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            workers.spawn(worker_loop(id, shared.clone()));
        }
        let mut worker_died = false;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(parent: &self.span, "Worker task failed: {}", e);
                worker_died = true;
                shared.stop.cancel();
            }
        }
        seeder.abort();

        let stats = self.traversal.stats();
        if worker_died {
            stats.mark_aborted();
            tracing::error!(
                parent: &self.span,
                "Crawl aborted with {} tasks outstanding",
                shared.in_flight.count()
            );
        }
        if self.cancel.is_cancelled() {
            stats.mark_cancelled();
            tracing::warn!(
                parent: &self.span,
                "Crawl cancelled with {} tasks outstanding",
                shared.in_flight.count()
            );
        }

        let summary = stats.snapshot();
        tracing::info!(
            parent: &self.span,
            "Crawl finished in {:?}: {} (at most {} tasks outstanding)",
            start_time.elapsed(),
            summary,
            shared.in_flight.peak()
        );

        let flushed = self.traversal.history().flush()?;
        tracing::info!(
            parent: &self.span,
            "Flushed {} history entries for '{}' to {} backend",
            flushed,
            self.traversal.history().source_id(),
            self.traversal.history().backend_name()
        );
        Ok(summary)
    }
}

async fn worker_loop(id: usize, shared: Arc<WorkerShared>) {
    let mut backlog = VecDeque::new();
    tracing::debug!(parent: &shared.span, "Worker {} started", id);

    loop {
        if shared.stop.is_cancelled() {
            break;
        }

        shared.offer_backlog(&mut backlog);
        let task = match backlog.pop_back() {
            Some(task) => task,
            None => match shared.next_task().await {
                Some(task) => task,
                None => break,
            },
        };

        let children = shared.traversal.expand(&task).await;
        for child in children {
            shared.in_flight.add(1);
            match shared.tx.try_send(child) {
                Ok(()) => {}
                Err(TrySendError::Full(child)) => backlog.push_back(child),
                Err(TrySendError::Closed(_)) => shared.task_done(),
            }
        }

        let processed = shared.traversal.stats().task_processed();
        if processed % 10 == 0 {
            tracing::info!(
                parent: &shared.span,
                "Progress: {} tasks processed, {} outstanding",
                processed,
                shared.in_flight.count()
            );
        }
        shared.task_done();
    }

    if !backlog.is_empty() {
        tracing::debug!(
            parent: &shared.span,
            "Worker {} dropped {} backlog tasks",
            id,
            backlog.len()
        );
    }
    tracing::debug!(parent: &shared.span, "Worker {} stopped", id);
}
