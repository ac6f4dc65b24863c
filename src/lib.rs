//! Catalog-Harvest: resilient product catalog acquisition
//!
//! This crate fetches paginated listing pages from a rate-limited, bot-resistant
//! catalog. It layers adaptive retries, fallback transports, proxy rotation and
//! randomized human-like timing under a bounded breadth-first crawl, and hands
//! the raw item records to the caller's data pipeline.

pub mod config;
pub mod crawler;
pub mod evasion;
pub mod fetch;
pub mod memory;
pub mod output;
pub mod telemetry;
pub mod url;

use thiserror::Error;

/// Main error type for Catalog-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid CSS selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Record serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector in config: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Failure of a single escalation strategy
///
/// A strategy error never stops the escalation chain: it is logged and the
/// next strategy is tried.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("{strategy} could not be launched: {message}")]
    Launch {
        strategy: &'static str,
        message: String,
    },

    #[error("{strategy} transport error: {message}")]
    Transport {
        strategy: &'static str,
        message: String,
    },

    #[error("{strategy} produced an unreadable response: {message}")]
    Response {
        strategy: &'static str,
        message: String,
    },
}

/// Failure to turn a single item element into a record
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("Malformed item: {0}")]
    Malformed(String),
}

/// Result type alias for Catalog-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlManager, CrawlPhase, CrawlReport, Extractor, Record};
pub use fetch::{FetchOutcome, OutcomeKind, RetryPolicy};
pub use crate::url::{normalize_url, site_root};
