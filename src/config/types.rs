use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Catalog-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub evasion: EvasionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

/// What to crawl and how to find items and pagination on a page
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// First entry URL tried during probing
    #[serde(rename = "primary-url")]
    pub primary_url: String,

    /// Entry URLs tried in order when the primary fails
    #[serde(rename = "fallback-urls", default)]
    pub fallback_urls: Vec<String>,

    /// Low-suspicion pages visited before the real target.
    /// Empty means site root followed by the category overview.
    #[serde(rename = "warmup-urls", default)]
    pub warmup_urls: Vec<String>,

    /// CSS selector matching one listing item
    #[serde(rename = "item-selector", default = "default_item_selector")]
    pub item_selector: String,

    /// CSS selector matching pagination anchors
    #[serde(rename = "pagination-selector", default = "default_pagination_selector")]
    pub pagination_selector: String,

    /// Query used for the first request's search-engine referrer.
    /// Defaults to the target host name.
    #[serde(rename = "search-query", default)]
    pub search_query: Option<String>,
}

fn default_item_selector() -> String {
    ".product-item".to_string()
}

fn default_pagination_selector() -> String {
    ".pagination a".to_string()
}

/// Retry and backoff settings, converted into a `RetryPolicy`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,

    /// Minimum wait after an HTTP 429
    pub rate_limit_floor_ms: u64,

    /// Extra backoff factor per HTTP status code (keys are status codes)
    pub status_multipliers: BTreeMap<String, f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let mut status_multipliers = BTreeMap::new();
        status_multipliers.insert("403".to_string(), 3.0);

        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter: true,
            rate_limit_floor_ms: 30_000,
            status_multipliers,
        }
    }
}

/// An inclusive range of milliseconds a randomized delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// A range that never sleeps
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Draws a uniformly distributed delay from the range
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }

    /// Returns the range with both bounds multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        let factor = factor.max(0.0);
        Self {
            min_ms: (self.min_ms as f64 * factor).round() as u64,
            max_ms: (self.max_ms as f64 * factor).round() as u64,
        }
    }
}

/// Human-like timing between requests
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TimingConfig {
    /// Pause before every request attempt
    pub request_delay: DelayRange,

    /// How much longer the pre-request pause is on retries
    pub retry_delay_factor: f64,

    /// Gap between entry URL candidates while probing
    pub probe_gap: DelayRange,

    /// Gap between catalog pages while crawling
    pub page_gap: DelayRange,

    /// "Reading" pause after each successful warmup page
    pub warmup_read: DelayRange,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            request_delay: DelayRange::new(500, 2_000),
            retry_delay_factor: 2.0,
            probe_gap: DelayRange::new(5_000, 15_000),
            page_gap: DelayRange::new(2_000, 5_000),
            warmup_read: DelayRange::new(1_000, 3_000),
            request_timeout_secs: 30,
        }
    }
}

impl TimingConfig {
    /// Timing with every delay disabled, for tests and dry runs
    pub fn immediate() -> Self {
        Self {
            request_delay: DelayRange::zero(),
            retry_delay_factor: 1.0,
            probe_gap: DelayRange::zero(),
            page_gap: DelayRange::zero(),
            warmup_read: DelayRange::zero(),
            request_timeout_secs: 5,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Crawl bounds
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlConfig {
    /// Hard cap on pages fetched in one run
    pub safety_ceiling: usize,

    /// Item elements processed per batch on large pages
    pub batch_size: usize,

    /// Resident memory above which a reclaim pass runs between batches
    pub memory_threshold_mb: u64,

    /// Overall wall-clock budget for a run
    pub deadline_secs: Option<u64>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            safety_ceiling: 50,
            batch_size: 50,
            memory_threshold_mb: 512,
            deadline_secs: None,
        }
    }
}

/// Proxy candidates and liveness testing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProxyConfig {
    pub candidates: Vec<String>,

    /// File with one proxy address per line
    pub list_file: Option<String>,

    /// Read extra candidates from the PROXY_LIST environment variable
    pub use_env: bool,

    /// Neutral IP-echo endpoint used for liveness tests
    pub echo_url: String,

    pub test_timeout_secs: u64,

    /// Maximum liveness tests in flight
    pub concurrency: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            list_file: None,
            use_env: true,
            echo_url: "http://httpbin.org/ip".to_string(),
            test_timeout_secs: 10,
            concurrency: 5,
        }
    }
}

/// Fallback transports and fingerprint randomization
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EvasionConfig {
    /// Overrides environment detection of a constrained network (CI runners)
    pub constrained_network: Option<bool>,

    pub enable_curl: bool,
    pub curl_binary: String,
    pub enable_session: bool,
    pub enable_browser: bool,

    /// Chance that non-essential headers are left out of a request
    pub header_omit_probability: f64,

    /// Seed for every randomized decision; random when absent
    pub seed: Option<u64>,

    /// Search engine used for referrer sequencing
    pub search_engine: String,
}

impl Default for EvasionConfig {
    fn default() -> Self {
        Self {
            constrained_network: None,
            enable_curl: true,
            curl_binary: "curl".to_string(),
            enable_session: true,
            enable_browser: true,
            header_omit_probability: 0.15,
            seed: None,
            search_engine: "https://www.google.com".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputConfig {
    /// JSON-lines file receiving the records; stdout when absent
    pub records_path: Option<String>,
}

/// Field selectors for the command-line extractor
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExtractConfig {
    /// Record field name to CSS selector, optionally suffixed `@attr`
    pub fields: BTreeMap<String, String>,

    /// Fields an item must yield to become a record
    pub required: Vec<String>,
}
