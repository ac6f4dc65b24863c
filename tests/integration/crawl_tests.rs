//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the catalog and run the full
//! warmup, probe and pagination cycle end-to-end.

use crate::{harvest_config, listing_page, mount_landing, test_headers};
use async_trait::async_trait;
use catalog_harvest::crawler::{crawl, CrawlManager, CrawlPhase, SelectorExtractor};
use catalog_harvest::evasion::{EscalationChain, FetchStrategy, StrategyContext};
use catalog_harvest::fetch::{FetchOutcome, ProxyPool, Transport};
use catalog_harvest::telemetry::PerformanceRecorder;
use catalog_harvest::StrategyError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn default_extractor() -> SelectorExtractor {
    SelectorExtractor::from_config(&Default::default()).expect("Default extractor should build")
}

#[tokio::test]
async fn test_falls_back_to_second_entry_and_follows_pagination() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_landing(&mock_server).await;

    // Primary entry is down for both attempts
    Mock::given(method("GET"))
        .and(path("/collections/a"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    // Query-specific pages are mounted first so they win over the bare path
    Mock::given(method("GET"))
        .and(path("/collections/b"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page(&["Trail Tent", "Camp Stove"], &["?page=3", "/collections/b"])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/collections/b"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["Head Lamp"], &["?page=2"])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/collections/b"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page(&["Rain Jacket", "Wool Socks"], &["?page=2", "?page=3"])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = harvest_config(&base_url, &["/collections/a", "/collections/b"], "");
    let mut manager = CrawlManager::from_config(&config, Arc::new(PerformanceRecorder::new()))
        .expect("Manager should build");
    let report = manager.run(&default_extractor()).await;

    assert!(manager
        .phase_history()
        .ends_with(&[CrawlPhase::Crawling, CrawlPhase::Draining, CrawlPhase::Done]));
    assert!(report.pending.is_empty());

    assert_eq!(
        report.entry_url.as_deref(),
        Some(format!("{}/collections/b", base_url).as_str())
    );
    assert!(report.warmed_up);
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.visited.len(), 3);

    let unique: HashSet<&String> = report.visited.iter().collect();
    assert_eq!(unique.len(), 3, "a page was visited twice");

    let names: Vec<&str> = report
        .records
        .iter()
        .filter_map(|r| r.get("name").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(
        names,
        vec!["Rain Jacket", "Wool Socks", "Trail Tent", "Camp Stove", "Head Lamp"]
    );

    // Failed probe of A plus three successful pages
    assert_eq!(report.pages_attempted, 4);
    assert_eq!(report.pages_succeeded, 3);
    assert!(!report.ceiling_hit);
    assert!(!report.deadline_hit);
}

#[tokio::test]
async fn test_safety_ceiling_bounds_pages_fetched() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Only the warmup visits the landing page
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Welcome</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/collections/all"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["Second"], &[])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/collections/all"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &["First"],
            &["?page=2", "?page=3", "?page=4", "?page=5", "?page=6"],
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = harvest_config(
        &base_url,
        &["/collections/all"],
        "[crawl]\nsafety-ceiling = 2",
    );
    let report = crawl(&config, &default_extractor(), Arc::new(PerformanceRecorder::new()))
        .await
        .expect("Crawl should run");

    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.visited.len(), 2);
    assert!(report.ceiling_hit);
    assert_eq!(report.records.len(), 2);

    // Links beyond the ceiling stay queued rather than being dropped
    let expected_pending: Vec<String> = (3..=6)
        .map(|n| format!("{}/collections/all?page={}", base_url, n))
        .collect();
    assert_eq!(report.pending, expected_pending);
    assert!(report.pending.iter().all(|url| !report.visited.contains(url)));
}

#[tokio::test]
async fn test_all_entries_failing_returns_empty_report() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_landing(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/collections/a"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/collections/b"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = harvest_config(&base_url, &["/collections/a", "/collections/b"], "");
    let mut manager = CrawlManager::from_config(&config, Arc::new(PerformanceRecorder::new()))
        .expect("Manager should build");
    let report = manager.run(&default_extractor()).await;

    assert!(report.is_empty());
    assert_eq!(report.pages_fetched, 0);
    assert_eq!(report.pages_attempted, 2);
    assert_eq!(report.pages_succeeded, 0);
    assert!(report.entry_url.is_none());
    assert!(report.visited.is_empty());
    assert_eq!(manager.phase(), &CrawlPhase::Done);

    // A run with no entry page goes straight from probing to done
    let history = manager.phase_history();
    assert!(!history.contains(&CrawlPhase::Draining));
    assert_eq!(
        &history[history.len() - 2..],
        &[
            CrawlPhase::Probing(format!("{}/collections/b", base_url)),
            CrawlPhase::Done
        ]
    );
}

#[tokio::test]
async fn test_failed_item_does_not_drop_others() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_landing(&mock_server).await;

    let body = r#"<html><body>
        <div class="product-item"><a class="product-item__title">Trail Tent</a><span class="price--highlight">$199.00</span></div>
        <div class="product-item"><a class="product-item__title">Mystery Box</a></div>
        <div class="product-item"><a class="product-item__title">Camp Stove</a><span class="price--highlight">$49.00</span></div>
    </body></html>"#;

    Mock::given(method("GET"))
        .and(path("/collections/sale"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let config = harvest_config(
        &base_url,
        &["/collections/sale"],
        r#"[extract]
required = ["name", "price"]

[extract.fields]
name = ".product-item__title"
price = ".price--highlight"
"#,
    );
    let extractor = SelectorExtractor::from_config(&config.extract).expect("Extractor should build");
    let report = crawl(&config, &extractor, Arc::new(PerformanceRecorder::new()))
        .await
        .expect("Crawl should run");

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0]["name"], "Trail Tent");
    assert_eq!(report.records[0]["price"], "$199.00");
    assert_eq!(report.records[1]["name"], "Camp Stove");
}

/// Fallback transport that serves a fixed page
struct CannedStrategy {
    body: String,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl FetchStrategy for CannedStrategy {
    fn name(&self) -> &'static str {
        "canned"
    }

    fn transport(&self) -> Transport {
        Transport::Session
    }

    async fn attempt(&self, url: &str, _ctx: &StrategyContext) -> Result<FetchOutcome, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchOutcome::from_status(200, url.to_string(), self.body.clone(), None))
    }
}

#[tokio::test]
async fn test_escalates_when_direct_fetch_is_blocked() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_landing(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/collections/sale"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&mock_server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let chain = EscalationChain::new(
        vec![Box::new(CannedStrategy {
            body: listing_page(&["Rain Jacket"], &[]),
            calls: calls.clone(),
        })],
        test_headers(&base_url),
        ProxyPool::empty(),
        Duration::from_secs(5),
        Arc::new(PerformanceRecorder::new()),
    );

    let recorder = Arc::new(PerformanceRecorder::new());
    let config = harvest_config(&base_url, &["/collections/sale"], "");
    let mut manager = CrawlManager::from_config(&config, recorder.clone())
        .expect("Manager should build")
        .with_escalation_chain(chain);
    let report = manager.run(&default_extractor()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0]["name"], "Rain Jacket");
    assert_eq!(report.pages_succeeded, 1);
    assert!(manager.session().is_established());

    // Both direct attempts were refused before escalating
    let refused = recorder
        .events_for("fetch_attempt")
        .iter()
        .filter(|e| e.extra.get("status_code") == Some(&403.0))
        .count();
    assert_eq!(refused, 2);
}

#[tokio::test]
async fn test_zero_deadline_returns_partial_results() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_landing(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/collections/sale"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["Rain Jacket"], &[])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = harvest_config(&base_url, &["/collections/sale"], "[crawl]\ndeadline-secs = 0");
    let report = crawl(&config, &default_extractor(), Arc::new(PerformanceRecorder::new()))
        .await
        .expect("Crawl should run");

    assert!(report.deadline_hit);
    assert!(report.records.is_empty());
    assert_eq!(report.pages_fetched, 0);
}
