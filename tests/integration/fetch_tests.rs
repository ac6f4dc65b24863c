//! Executor, fallback transport and warmup tests against a mock catalog

use crate::{fast_policy, mount_landing, test_executor, test_headers};
use catalog_harvest::crawler::SessionWarmupSequencer;
use catalog_harvest::config::DelayRange;
use catalog_harvest::evasion::{FetchStrategy, SessionStrategy, StrategyContext};
use catalog_harvest::fetch::{CrawlSession, FetchOutcome, OutcomeKind};
use catalog_harvest::telemetry::PerformanceRecorder;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_transient_errors_retry_with_exponential_backoff() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/collections/sale"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let recorder = Arc::new(PerformanceRecorder::new());
    let executor = test_executor(&base_url, recorder.clone());
    let mut session = CrawlSession::new(Some(1));

    let outcome = executor
        .fetch(
            &format!("{}/collections/sale", base_url),
            &fast_policy(3),
            &mut session,
        )
        .await;

    assert_eq!(outcome, FetchOutcome::TransientError { status_code: 500 });

    // 1ms, 2ms, 4ms: doubling, and the final failure still waits
    let backoffs: Vec<f64> = recorder
        .events_for("fetch_attempt")
        .iter()
        .map(|e| e.extra["backoff_seconds"])
        .collect();
    assert_eq!(backoffs.len(), 3);
    for (actual, expected) in backoffs.iter().zip([0.001, 0.002, 0.004]) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "backoff {} != {}",
            actual,
            expected
        );
    }
}

#[tokio::test]
async fn test_recovers_after_transient_error() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/collections/sale"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/collections/sale"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>sale</html>"))
        .mount(&mock_server)
        .await;

    let recorder = Arc::new(PerformanceRecorder::new());
    let executor = test_executor(&base_url, recorder.clone());
    let mut session = CrawlSession::new(Some(2));

    let outcome = executor
        .fetch(
            &format!("{}/collections/sale", base_url),
            &fast_policy(3),
            &mut session,
        )
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.body(), Some("<html>sale</html>"));
    assert!(session.is_established());
    assert_eq!(session.requests_made(), 2);

    let summary = recorder.summary();
    assert_eq!(summary.operations["fetch_attempt"].count, 2);
    assert_eq!(summary.fetch_success_rate, Some(0.5));
}

#[tokio::test]
async fn test_forbidden_is_blocked() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/collections/sale"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&mock_server)
        .await;

    let executor = test_executor(&base_url, Arc::new(PerformanceRecorder::new()));
    let mut session = CrawlSession::new(Some(3));

    let outcome = executor
        .fetch(
            &format!("{}/collections/sale", base_url),
            &fast_policy(2),
            &mut session,
        )
        .await;

    assert_eq!(outcome.kind(), OutcomeKind::Blocked);
    assert!(!session.is_established());
}

#[tokio::test]
async fn test_rate_limited_carries_retry_after() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/collections/sale"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = test_executor(&base_url, Arc::new(PerformanceRecorder::new()));
    let mut session = CrawlSession::new(Some(4));

    let outcome = executor
        .fetch(
            &format!("{}/collections/sale", base_url),
            &fast_policy(1),
            &mut session,
        )
        .await;

    assert_eq!(outcome.kind(), OutcomeKind::RateLimited);
    assert_eq!(outcome.retry_after(), Some(Duration::ZERO));
}

#[tokio::test]
async fn test_requests_carry_browser_headers() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/collections/sale"))
        .and(header_exists("user-agent"))
        .and(header_exists("accept-language"))
        .and(header_exists("referer"))
        .and(header_exists("sec-fetch-mode"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = test_executor(&base_url, Arc::new(PerformanceRecorder::new()));
    let mut session = CrawlSession::new(Some(5));

    let outcome = executor
        .fetch(
            &format!("{}/collections/sale", base_url),
            &fast_policy(1),
            &mut session,
        )
        .await;

    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_connection_refused_is_transport_failure() {
    let executor = test_executor("http://127.0.0.1:9", Arc::new(PerformanceRecorder::new()));
    let mut session = CrawlSession::new(Some(6));

    let outcome = executor
        .fetch("http://127.0.0.1:9/collections/sale", &fast_policy(2), &mut session)
        .await;

    assert!(matches!(
        outcome,
        FetchOutcome::TransportFailure {
            permanent: false,
            ..
        }
    ));
    assert_eq!(session.requests_made(), 2);
}

#[tokio::test]
async fn test_session_strategy_keeps_cookies_and_retries() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/collections/sale"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/collections/sale"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "visitor=abc123; Path=/")
                .set_body_string("<html>sale</html>"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/collections/sale-2"))
        .and(header_exists("cookie"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>page 2</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let strategy = SessionStrategy::new(Duration::from_secs(5), fast_policy(3));
    let ctx = StrategyContext {
        profile: test_headers(&base_url).generate(3, true, &mut StdRng::seed_from_u64(7)),
        proxy: None,
        timeout: Duration::from_secs(5),
        seed: 7,
    };

    let first = strategy
        .attempt(&format!("{}/collections/sale", base_url), &ctx)
        .await
        .expect("Session strategy should run");
    assert!(first.is_success());

    let second = strategy
        .attempt(&format!("{}/collections/sale-2", base_url), &ctx)
        .await
        .expect("Session strategy should run");
    assert_eq!(second.body(), Some("<html>page 2</html>"));
}

#[tokio::test]
async fn test_warmup_result_follows_last_page() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_landing(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/collections"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let executor = test_executor(&base_url, Arc::new(PerformanceRecorder::new()));
    let policy = fast_policy(1);
    let sequencer = SessionWarmupSequencer::new(&executor, &policy, DelayRange::zero());
    let root = format!("{}/", base_url);
    let overview = format!("{}/collections", base_url);

    let mut session = CrawlSession::new(Some(8));
    assert!(!sequencer.warmup(&[root.clone(), overview.clone()], &mut session).await);
    // The failing first page did not stop the second from being visited
    assert_eq!(session.requests_made(), 2);

    let mut session = CrawlSession::new(Some(9));
    assert!(sequencer.warmup(&[overview, root], &mut session).await);
    assert_eq!(session.requests_made(), 2);
}
