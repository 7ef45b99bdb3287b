use crate::site::SiteNode;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Site-Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub history: HistoryConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    /// Root site descriptors; each must carry a url
    #[serde(rename = "site", default)]
    pub sites: Vec<SiteNode>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent crawl workers
    pub workers: u32,

    /// Pending queue capacity per worker
    #[serde(rename = "queue-factor", default = "default_queue_factor")]
    pub queue_factor: u32,

    /// Directory downloaded resources are written to
    #[serde(rename = "store-dir")]
    pub store_dir: String,
}

impl CrawlerConfig {
    /// Capacity of the shared pending-task queue
    pub fn queue_capacity(&self) -> usize {
        (self.workers as usize).saturating_mul(self.queue_factor as usize)
    }
}

/// Retry policy for page and resource fetches
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per fetch, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between attempts (milliseconds)
    #[serde(rename = "delay-ms", default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Where the download history is persisted
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Snapshot directory (json) or database file (sqlite)
    pub path: String,

    /// Names the snapshot of this crawl
    #[serde(rename = "source-id")]
    pub source_id: String,
}

/// History backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Json,
    Sqlite,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "site-harvester".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn default_queue_factor() -> u32 {
    20
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    5000
}
