use crate::config::types::{
    Config, CrawlConfig, DelayRange, EvasionConfig, ExtractConfig, ProxyConfig, RetryConfig,
    TargetConfig, TimingConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Largest accepted backoff or delay factor
const MAX_FACTOR: f64 = 100.0;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_target_config(&config.target)?;
    validate_retry_config(&config.retry)?;
    validate_timing_config(&config.timing)?;
    validate_crawl_config(&config.crawl)?;
    validate_proxy_config(&config.proxy)?;
    validate_evasion_config(&config.evasion)?;
    validate_extract_config(&config.extract)?;
    Ok(())
}

/// Validates entry URLs and selectors
fn validate_target_config(config: &TargetConfig) -> Result<(), ConfigError> {
    validate_http_url("primary-url", &config.primary_url)?;

    for url in &config.fallback_urls {
        validate_http_url("fallback-urls", url)?;
    }

    for url in &config.warmup_urls {
        validate_http_url("warmup-urls", url)?;
    }

    validate_selector(&config.item_selector)?;
    validate_selector(&config.pagination_selector)?;

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    validate_factor("multiplier", config.multiplier, 1.0)?;

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-delay-ms ({}) must not be below base-delay-ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    for (code, factor) in &config.status_multipliers {
        let parsed: u16 = code.parse().map_err(|_| {
            ConfigError::Validation(format!("status-multipliers key '{}' is not a status code", code))
        })?;

        if !(100..=599).contains(&parsed) {
            return Err(ConfigError::Validation(format!(
                "status-multipliers key {} is outside 100..=599",
                parsed
            )));
        }

        if !factor.is_finite() || *factor <= 0.0 || *factor > MAX_FACTOR {
            return Err(ConfigError::Validation(format!(
                "status multiplier for {} must be within (0, {}], got {}",
                code, MAX_FACTOR, factor
            )));
        }
    }

    Ok(())
}

/// Validates timing ranges
fn validate_timing_config(config: &TimingConfig) -> Result<(), ConfigError> {
    validate_range("request-delay", &config.request_delay)?;
    validate_range("probe-gap", &config.probe_gap)?;
    validate_range("page-gap", &config.page_gap)?;
    validate_range("warmup-read", &config.warmup_read)?;

    validate_factor("retry-delay-factor", config.retry_delay_factor, 1.0)?;

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawl bounds
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.safety_ceiling < 1 {
        return Err(ConfigError::Validation(
            "safety-ceiling must be >= 1".to_string(),
        ));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation("batch-size must be >= 1".to_string()));
    }

    Ok(())
}

/// Validates proxy settings
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    validate_http_url("echo-url", &config.echo_url)?;

    if config.concurrency < 1 || config.concurrency > 50 {
        return Err(ConfigError::Validation(format!(
            "proxy concurrency must be between 1 and 50, got {}",
            config.concurrency
        )));
    }

    if config.test_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "test-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates evasion settings
fn validate_evasion_config(config: &EvasionConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&config.header_omit_probability) {
        return Err(ConfigError::Validation(format!(
            "header-omit-probability must be within 0.0..=1.0, got {}",
            config.header_omit_probability
        )));
    }

    if config.enable_curl && config.curl_binary.trim().is_empty() {
        return Err(ConfigError::Validation(
            "curl-binary cannot be empty when enable-curl is set".to_string(),
        ));
    }

    validate_http_url("search-engine", &config.search_engine)?;

    Ok(())
}

/// Validates extractor field selectors
fn validate_extract_config(config: &ExtractConfig) -> Result<(), ConfigError> {
    for (field, spec) in &config.fields {
        if field.is_empty() {
            return Err(ConfigError::Validation(
                "extract field names cannot be empty".to_string(),
            ));
        }

        let selector = spec.split_once('@').map(|(s, _)| s).unwrap_or(spec);
        validate_selector(selector)?;
    }

    for field in &config.required {
        if !config.fields.contains_key(field) {
            return Err(ConfigError::Validation(format!(
                "required field '{}' has no selector",
                field
            )));
        }
    }

    Ok(())
}

/// Rejects NaN, infinite and out-of-range factors
fn validate_factor(name: &str, value: f64, min: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > MAX_FACTOR {
        return Err(ConfigError::Validation(format!(
            "{} must be within {}..={}, got {}",
            name, min, MAX_FACTOR, value
        )));
    }
    Ok(())
}

fn validate_range(name: &str, range: &DelayRange) -> Result<(), ConfigError> {
    if range.min_ms > range.max_ms {
        return Err(ConfigError::Validation(format!(
            "{}: min-ms ({}) must not exceed max-ms ({})",
            name, range.min_ms, range.max_ms
        )));
    }
    Ok(())
}

fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("{} '{}': {}", name, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            name, value
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' has no host",
            name, value
        )));
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}
