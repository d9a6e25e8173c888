use crate::config::mirrors::MirrorEntry;
use crate::config::types::{
    Config, CrawlerConfig, DownloaderConfig, OutputConfig, RotationConfig, SiteConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_downloader_config(&config.downloader)?;
    validate_rotation_config(&config.rotation)?;
    validate_mirrors(&config.mirrors)?;
    Ok(())
}

/// Validates the site location
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "base_url '{}' must use an http(s) scheme",
            config.base_url
        )));
    }

    if !config.library_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "library_path must start with '/', got '{}'",
            config.library_path
        )));
    }

    if !config.product_prefix.starts_with('/') || config.product_prefix.len() < 2 {
        return Err(ConfigError::Validation(format!(
            "product_prefix must be a non-root path starting with '/', got '{}'",
            config.product_prefix
        )));
    }

    Ok(())
}

/// Validates crawler pacing
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.request_delay.is_zero() {
        return Err(ConfigError::Validation(
            "request_delay must be greater than zero".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
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

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.metadata_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "metadata_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates download concurrency and rotation cadence
fn validate_downloader_config(config: &DownloaderConfig) -> Result<(), ConfigError> {
    if config.max_per_mirror < 1 || config.max_per_mirror > 32 {
        return Err(ConfigError::Validation(format!(
            "max_per_mirror must be between 1 and 32, got {}",
            config.max_per_mirror
        )));
    }

    if config.max_concurrent_transfers < 1 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_transfers must be >= 1, got {}",
            config.max_concurrent_transfers
        )));
    }

    if config.rotation_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "rotation_interval must be >= 1, got {}",
            config.rotation_interval
        )));
    }

    if config.transfer_timeout_secs < 1 || config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "transfer and connect timeouts must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

fn validate_rotation_config(config: &RotationConfig) -> Result<(), ConfigError> {
    if config.enabled && config.command.trim().is_empty() {
        return Err(ConfigError::Validation(
            "rotation command cannot be empty while rotation is enabled".to_string(),
        ));
    }

    if config.min_id > config.max_id {
        return Err(ConfigError::Validation(format!(
            "rotation min_id ({}) must not exceed max_id ({})",
            config.min_id, config.max_id
        )));
    }

    if config.enabled && config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "rotation timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates `[[mirror]]` entries: non-empty, unique tokens
fn validate_mirrors(entries: &[MirrorEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in entries {
        if entry.id.trim().is_empty() || entry.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "mirror entries need a non-empty id and name".to_string(),
            ));
        }

        if !seen.insert(entry.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate mirror id '{}'",
                entry.id
            )));
        }
    }

    Ok(())
}
