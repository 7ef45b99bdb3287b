//! Configuration module for Site-Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, including the site descriptor trees to crawl.
//!
//! # Example
//!
//! ```no_run
//! use site_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Crawling {} sites", config.sites.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{BackendKind, Config, CrawlerConfig, HistoryConfig, RetryConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, validate_sites};
