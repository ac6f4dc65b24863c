//! Request executor: one logical fetch with adaptive retries
//!
//! Each attempt presents a fresh browser fingerprint, waits a human-like
//! pause first, and classifies the response. Failed attempts back off
//! according to the retry policy, with steeper waits after 403 and a floor
//! after 429.

use crate::config::TimingConfig;
use crate::fetch::backoff::{delay_for_outcome, should_retry, RetryPolicy};
use crate::fetch::headers::HeaderProfileGenerator;
use crate::fetch::outcome::{parse_retry_after, FetchAttempt, FetchOutcome, Transport};
use crate::fetch::session::CrawlSession;
use crate::telemetry::{PerfEvent, PerformanceSink};
use chrono::Utc;
use reqwest::{redirect::Policy, Client, Proxy};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Builds the default HTTP client
///
/// The client follows redirects, keeps cookies across requests (so warmup
/// visits build real session state), decompresses gzip/brotli and applies a
/// fixed per-request timeout.
///
/// # Arguments
///
/// * `timeout` - Per-request timeout
/// * `proxy` - Optional proxy URL every request is routed through
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client (e.g. invalid proxy URL)
pub fn build_http_client(timeout: Duration, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .redirect(Policy::limited(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

/// Classifies a reqwest error into a transport failure
pub(crate) fn classify_reqwest_error(error: &reqwest::Error) -> FetchOutcome {
    if error.is_builder() {
        FetchOutcome::permanent_failure(format!("Invalid request: {}", error))
    } else if error.is_timeout() {
        FetchOutcome::transport_failure("Request timeout")
    } else if error.is_connect() {
        FetchOutcome::transport_failure(format!("Connection failed: {}", error))
    } else {
        FetchOutcome::transport_failure(error.to_string())
    }
}

/// Performs logical fetches against the target with internal retries
pub struct RequestExecutor {
    client: Client,
    headers: HeaderProfileGenerator,
    timing: TimingConfig,
    sink: Arc<dyn PerformanceSink>,
}

impl RequestExecutor {
    pub fn new(
        client: Client,
        headers: HeaderProfileGenerator,
        timing: TimingConfig,
        sink: Arc<dyn PerformanceSink>,
    ) -> Self {
        Self {
            client,
            headers,
            timing,
            sink,
        }
    }

    pub fn headers(&self) -> &HeaderProfileGenerator {
        &self.headers
    }

    /// Fetches a URL, retrying per the policy
    ///
    /// # Attempt Flow
    ///
    /// 1. Generate a header profile for the session's next request
    /// 2. Sleep a jittered human-like pause (longer on retries)
    /// 3. Send a GET, following redirects
    /// 4. Classify the response
    ///
    /// | Condition | Outcome | Backoff |
    /// |-----------|---------|---------|
    /// | HTTP 200 | Success | none, returned |
    /// | HTTP 403 | Blocked | policy delay × status multiplier |
    /// | HTTP 429 | RateLimited | floor + policy delay, at least `Retry-After` |
    /// | other status | TransientError | policy delay |
    /// | connect/timeout | TransportFailure | policy delay |
    /// | invalid request | TransportFailure (permanent) | none, returned |
    ///
    /// When retrying is allowed the backoff is slept even after the last
    /// attempt, so an escalation that follows never hits the target right
    /// after a refusal.
    ///
    /// # Returns
    ///
    /// The success outcome, or the last failed outcome once retries are
    /// exhausted
    pub async fn fetch(
        &self,
        url: &str,
        policy: &RetryPolicy,
        session: &mut CrawlSession,
    ) -> FetchOutcome {
        let mut last = FetchOutcome::transport_failure("No attempt was made");

        for attempt in 0..policy.max_attempts.max(1) {
            let profile = self.headers.next_for(session);

            let pause_range = if attempt == 0 {
                self.timing.request_delay
            } else {
                self.timing
                    .request_delay
                    .scaled(self.timing.retry_delay_factor)
            };
            session.pause(&pause_range).await;

            let fetch_attempt = FetchAttempt {
                url: url.to_string(),
                attempt_number: attempt,
                transport: Transport::Direct,
                headers: profile.header_pairs(),
                proxy: None,
                started_at: Utc::now(),
            };

            tracing::debug!(
                "Fetching {} (attempt {}/{}, referer {})",
                url,
                attempt + 1,
                policy.max_attempts,
                profile.referer
            );

            let started = Instant::now();
            let outcome = self.send(&fetch_attempt, profile.to_header_map()).await;
            let elapsed = started.elapsed();

            let mut event = PerfEvent::new("fetch_attempt", elapsed)
                .with("attempt", f64::from(attempt + 1))
                .with("success", if outcome.is_success() { 1.0 } else { 0.0 });
            if let Some(code) = outcome.status_code() {
                event = event.with("status_code", f64::from(code));
            }

            if outcome.is_success() {
                self.sink.record(event);
                session.mark_established();
                tracing::info!("Fetched {} in {:.2}s", url, elapsed.as_secs_f64());
                return outcome;
            }

            if !should_retry(&outcome, attempt, policy) {
                self.sink.record(event);
                tracing::warn!("Giving up on {}: {}", url, outcome);
                return outcome;
            }

            let wait = delay_for_outcome(attempt, &outcome, policy, session.rng());
            self.sink
                .record(event.with("backoff_seconds", wait.as_secs_f64()));

            tracing::warn!(
                "Attempt {} for {} failed: {}. Retrying in {:.2}s",
                attempt + 1,
                url,
                outcome,
                wait.as_secs_f64()
            );

            tokio::time::sleep(wait).await;
            last = outcome;
        }

        tracing::warn!("Max retries exceeded for {}", url);
        last
    }

    /// Sends one GET and classifies the result
    async fn send(&self, attempt: &FetchAttempt, headers: reqwest::header::HeaderMap) -> FetchOutcome {
        let response = match self.client.get(&attempt.url).headers(headers).send().await {
            Ok(response) => response,
            Err(e) => return classify_reqwest_error(&e),
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        if status != 200 {
            return FetchOutcome::from_status(status, final_url, String::new(), retry_after);
        }

        match response.text().await {
            Ok(body) => FetchOutcome::from_status(status, final_url, body, retry_after),
            Err(e) => FetchOutcome::transport_failure(format!("Failed to read body: {}", e)),
        }
    }
}
