//! Persistent cookie-aware session strategy

use super::{FetchStrategy, StrategyContext};
use crate::fetch::{
    build_http_client, classify_reqwest_error, delay_for_outcome, parse_retry_after,
    should_retry, FetchOutcome, RetryPolicy, Transport,
};
use crate::StrategyError;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;

const NAME: &str = "session";

/// Fetches through one long-lived HTTP session
///
/// The client (and its cookie jar) is created on first use and kept for the
/// rest of the run, so cookies set by earlier pages travel with later ones.
/// Failed requests are retried by the session's own backoff adapter.
pub struct SessionStrategy {
    client: OnceCell<Client>,
    timeout: Duration,
    policy: RetryPolicy,
}

impl SessionStrategy {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            client: OnceCell::new(),
            timeout,
            policy,
        }
    }

    /// Backoff of the session adapter: three tries, 1s doubling, no extra
    /// penalty for 403 and no rate-limit floor
    pub fn adapter_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_enabled: true,
            status_code_multipliers: HashMap::new(),
            rate_limit_floor: Duration::ZERO,
        }
    }

    async fn client(&self, proxy: Option<&str>) -> Result<&Client, StrategyError> {
        self.client
            .get_or_try_init(|| async { build_http_client(self.timeout, proxy) })
            .await
            .map_err(|e| StrategyError::Launch {
                strategy: NAME,
                message: e.to_string(),
            })
    }

    async fn send_once(&self, client: &Client, url: &str, ctx: &StrategyContext) -> FetchOutcome {
        let response = match client
            .get(url)
            .headers(ctx.profile.to_header_map())
            .send()
            .await
        {
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

#[async_trait]
impl FetchStrategy for SessionStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn transport(&self) -> Transport {
        Transport::Session
    }

    async fn attempt(&self, url: &str, ctx: &StrategyContext) -> Result<FetchOutcome, StrategyError> {
        let client = self.client(ctx.proxy.as_deref()).await?;
        let mut rng = StdRng::seed_from_u64(ctx.seed);

        let mut attempt = 0;
        loop {
            let outcome = self.send_once(client, url, ctx).await;

            // The adapter does not sleep after its last try; the chain moves on
            if outcome.is_success()
                || attempt + 1 >= self.policy.max_attempts
                || !should_retry(&outcome, attempt, &self.policy)
            {
                return Ok(outcome);
            }

            let wait = delay_for_outcome(attempt, &outcome, &self.policy, &mut rng);
            tracing::debug!(
                "Session request to {} returned {}, retrying in {:.2}s",
                url,
                outcome,
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}
