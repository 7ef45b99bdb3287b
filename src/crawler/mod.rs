//! Crawler module for page traversal and resource collection
//!
//! This module contains the core crawling logic, including:
//! - Fetching pages and resources with retry
//! - HTML extraction of links and resources
//! - Expanding crawl tasks into children and downloads
//! - The worker pool that runs a crawl to completion
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;
mod stats;
mod traversal;

#[cfg(test)]
mod testing;

pub use coordinator::{run_crawl, Coordinator};
pub use fetcher::{
    build_http_client, decode_html, DownloadOutcome, Fetcher, HttpTransport, RetryPolicy, Transport,
};
pub use parser::{extract_container, extract_links, ContainerPage};
pub use scheduler::Scheduler;
pub use stats::{CrawlStats, StatsCollector};
pub use traversal::Traversal;
