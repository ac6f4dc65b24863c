//! Integration tests for Catalog-Harvest
//!
//! These tests use wiremock to stand in for the catalog and exercise the
//! executor, the fallback transports and full crawl runs end-to-end. Every
//! delay is zero and backoff is in milliseconds, so nothing sleeps for long.

mod crawl_tests;
mod fetch_tests;

use catalog_harvest::config::{parse_config, Config, TimingConfig};
use catalog_harvest::fetch::{build_http_client, HeaderProfileGenerator, RequestExecutor, RetryPolicy};
use catalog_harvest::telemetry::PerformanceRecorder;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Policy with millisecond backoff and no jitter
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        multiplier: 2.0,
        jitter_enabled: false,
        status_code_multipliers: HashMap::new(),
        rate_limit_floor: Duration::ZERO,
    }
}

pub fn test_headers(base_url: &str) -> HeaderProfileGenerator {
    HeaderProfileGenerator::new(format!("{}/", base_url), "https://www.google.com", "outdoor gear", 0.0)
}

pub fn test_executor(base_url: &str, recorder: Arc<PerformanceRecorder>) -> RequestExecutor {
    RequestExecutor::new(
        build_http_client(Duration::from_secs(5), None).expect("Failed to build client"),
        test_headers(base_url),
        TimingConfig::immediate(),
        recorder,
    )
}

/// Builds a validated config pointing at the mock server
///
/// Fallback transports are disabled and every delay is zero. `extra` is
/// appended verbatim, so tests can add `[crawl]` or `[extract]` sections.
pub fn harvest_config(base_url: &str, entry_paths: &[&str], extra: &str) -> Config {
    let primary = format!("{}{}", base_url, entry_paths[0]);
    let fallbacks = entry_paths[1..]
        .iter()
        .map(|p| format!("\"{}{}\"", base_url, p))
        .collect::<Vec<_>>()
        .join(", ");

    let toml = format!(
        r#"
[target]
primary-url = "{primary}"
fallback-urls = [{fallbacks}]
warmup-urls = ["{base_url}/"]
item-selector = ".product-item"
pagination-selector = ".pagination a"
search-query = "outdoor gear"

[retry]
max-attempts = 2
base-delay-ms = 1
max-delay-ms = 10
multiplier = 2.0
jitter = false
rate-limit-floor-ms = 0

[retry.status-multipliers]
"403" = 1.0

[timing]
request-delay = {{ min-ms = 0, max-ms = 0 }}
retry-delay-factor = 1.0
probe-gap = {{ min-ms = 0, max-ms = 0 }}
page-gap = {{ min-ms = 0, max-ms = 0 }}
warmup-read = {{ min-ms = 0, max-ms = 0 }}
request-timeout-secs = 5

[proxy]
use-env = false

[evasion]
constrained-network = true
enable-curl = false
enable-session = false
enable-browser = false
seed = 7

{extra}
"#
    );

    parse_config(&toml).expect("Test config should be valid")
}

/// Mounts the warmup landing page
pub async fn mount_landing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Welcome</body></html>"))
        .mount(server)
        .await;
}

/// A listing page with the given item names and pagination hrefs
pub fn listing_page(items: &[&str], pagination: &[&str]) -> String {
    let items: String = items
        .iter()
        .map(|name| {
            format!(
                r#"<div class="product-item"><a class="product-item__title" href="/products/{slug}">{name}</a><span class="price--highlight">$10.00</span></div>"#,
                slug = name.to_lowercase().replace(' ', "-"),
                name = name
            )
        })
        .collect();

    let links: String = pagination
        .iter()
        .map(|href| format!(r#"<a href="{}">page</a>"#, href))
        .collect();

    format!(
        r#"<html><body><div class="collection">{}</div><nav class="pagination">{}</nav></body></html>"#,
        items, links
    )
}
