use crate::config::types::{Config, CrawlerConfig, OutputConfig, SourceConfig, SyncConfig};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Upper bound on fetches kept in flight
const MAX_CONCURRENCY: u32 = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_source_config(&config.source)?;
    validate_output_config(&config.output)?;
    if let Some(sync) = &config.sync {
        validate_sync_config(sync)?;
    }
    Ok(())
}

/// Validates retry, pacing and concurrency settings
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.concurrency
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.jitter_min_ms > config.jitter_max_ms {
        return Err(ConfigError::Validation(format!(
            "jitter_min_ms ({}) must not exceed jitter_max_ms ({})",
            config.jitter_min_ms, config.jitter_max_ms
        )));
    }

    if config.max_retry_delay_ms < config.retry_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_retry_delay_ms ({}) must be >= retry_delay_ms ({})",
            config.max_retry_delay_ms, config.retry_delay_ms
        )));
    }

    if config.progress_interval < 1 {
        return Err(ConfigError::Validation(
            "progress_interval must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the review source settings
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            config.base_url
        )));
    }

    for (name, template) in [
        ("review_path", &config.review_path),
        ("expand_path", &config.expand_path),
    ] {
        if !template.contains("{id}") {
            return Err(ConfigError::Validation(format!(
                "{} must contain the {{id}} placeholder, got '{}'",
                name, template
            )));
        }
    }

    validate_selector(&config.count_selector)?;
    validate_selector(&config.review_selector)?;

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user_agents must not contain empty entries".to_string(),
        ));
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            message: format!("{:?}", e),
        })
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.sink_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "sink_path cannot be empty".to_string(),
        ));
    }

    if config.state_dir.is_empty() {
        return Err(ConfigError::Validation(
            "state_dir cannot be empty".to_string(),
        ));
    }

    if config.dataset_dir.is_empty() {
        return Err(ConfigError::Validation(
            "dataset_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the sync target settings
fn validate_sync_config(config: &SyncConfig) -> Result<(), ConfigError> {
    if config.bucket.trim().is_empty() {
        return Err(ConfigError::Validation("bucket cannot be empty".to_string()));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "sync timeout_secs must be >= 1".to_string(),
        ));
    }

    match (&config.endpoint, &config.mirror_dir) {
        (Some(endpoint), None) => {
            Url::parse(endpoint)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid sync endpoint: {}", e)))?;
        }
        (None, Some(_)) => {}
        (Some(_), Some(_)) => {
            return Err(ConfigError::Validation(
                "sync accepts either endpoint or mirror_dir, not both".to_string(),
            ));
        }
        (None, None) => {
            return Err(ConfigError::Validation(
                "sync requires an endpoint or a mirror_dir".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffKind;

    fn crawler_config() -> CrawlerConfig {
        CrawlerConfig {
            concurrency: 3,
            max_attempts: 3,
            retry_delay_ms: 2000,
            backoff: BackoffKind::Fixed,
            max_retry_delay_ms: 30_000,
            expansion_threshold: 25,
            jitter_min_ms: 1000,
            jitter_max_ms: 3000,
            progress_interval: 10,
        }
    }

    fn sync_config() -> SyncConfig {
        SyncConfig {
            bucket: "reviews".to_string(),
            interval: 100,
            timeout_secs: 600,
            endpoint: None,
            mirror_dir: Some("/tmp/mirror".to_string()),
        }
    }

    #[test]
    fn test_crawler_bounds() {
        assert!(validate_crawler_config(&crawler_config()).is_ok());

        let mut config = crawler_config();
        config.concurrency = 65;
        assert!(validate_crawler_config(&config).is_err());

        let mut config = crawler_config();
        config.max_attempts = 0;
        assert!(validate_crawler_config(&config).is_err());

        let mut config = crawler_config();
        config.jitter_min_ms = 5000;
        assert!(validate_crawler_config(&config).is_err());
    }

    #[test]
    fn test_zero_jitter_is_allowed() {
        let mut config = crawler_config();
        config.jitter_min_ms = 0;
        config.jitter_max_ms = 0;
        assert!(validate_crawler_config(&config).is_ok());
    }

    #[test]
    fn test_source_templates_need_placeholder() {
        let mut config = SourceConfig::default();
        assert!(validate_source_config(&config).is_ok());

        config.review_path = "/title/reviews".to_string();
        assert!(validate_source_config(&config).is_err());
    }

    #[test]
    fn test_source_rejects_bad_selector_and_scheme() {
        let mut config = SourceConfig::default();
        config.count_selector = "div[[".to_string();
        assert!(matches!(
            validate_source_config(&config),
            Err(ConfigError::InvalidSelector { .. })
        ));

        let mut config = SourceConfig::default();
        config.base_url = "ftp://example.com".to_string();
        assert!(matches!(
            validate_source_config(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_sync_target_must_be_unique() {
        assert!(validate_sync_config(&sync_config()).is_ok());

        let mut config = sync_config();
        config.endpoint = Some("https://storage.example.com".to_string());
        assert!(validate_sync_config(&config).is_err());

        let mut config = sync_config();
        config.mirror_dir = None;
        assert!(validate_sync_config(&config).is_err());

        let mut config = sync_config();
        config.mirror_dir = None;
        config.endpoint = Some("not a url".to_string());
        assert!(matches!(
            validate_sync_config(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }
}
