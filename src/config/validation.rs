use crate::config::types::{Config, CrawlerConfig, HistoryConfig, RetryConfig, UserAgentConfig};
use crate::site::{CrawlTask, SiteNode};
use crate::storage::check_source_id;
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_history_config(&config.history)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_sites(&config.sites)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.queue_factor < 1 {
        return Err(ConfigError::Validation(format!(
            "queue_factor must be >= 1, got {}",
            config.queue_factor
        )));
    }

    if config.store_dir.is_empty() {
        return Err(ConfigError::Validation(
            "store_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }
    Ok(())
}

/// Validates history configuration
fn validate_history_config(config: &HistoryConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "history path cannot be empty".to_string(),
        ));
    }

    check_source_id(&config.source_id).map_err(|_| {
        ConfigError::Validation(format!(
            "source_id must be alphanumeric with '-', '_' or '.', got '{}'",
            config.source_id
        ))
    })
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Ok(())
}

/// Validates the root site descriptors
///
/// Node shapes, selectors and turn-page patterns are checked when the nodes
/// are deserialized; here every root must also be bound to a URL.
pub fn validate_sites(sites: &[SiteNode]) -> Result<(), ConfigError> {
    if sites.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[site]] is required".to_string(),
        ));
    }

    for site in sites {
        CrawlTask::new(site.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sites_requires_url() {
        let template = SiteNode::container("img[src]").unwrap();
        assert!(validate_sites(&[template.clone()]).is_err());

        let root = template.with_url("http://a.com/").unwrap();
        assert!(validate_sites(&[root]).is_ok());
    }

    #[test]
    fn test_validate_sites_not_empty() {
        assert!(validate_sites(&[]).is_err());
    }

    #[test]
    fn test_validate_user_agent_name() {
        let mut config = UserAgentConfig::default();
        assert!(validate_user_agent_config(&config).is_ok());

        config.crawler_name = "bad name!".to_string();
        assert!(validate_user_agent_config(&config).is_err());
    }

    #[test]
    fn test_validate_retry_bounds() {
        let mut config = RetryConfig::default();
        assert!(validate_retry_config(&config).is_ok());

        config.max_attempts = 0;
        assert!(validate_retry_config(&config).is_err());
    }
}
