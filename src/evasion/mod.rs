//! Evasion escalation chain
//!
//! Once the request executor has exhausted its retries, the chain tries
//! alternative transports in priority order until one returns the page:
//!
//! - a spoofed command-line client (`curl`) with full header impersonation
//! - a persistent cookie-aware session with its own backoff
//! - a headless browser performing full navigation (feature `browser`)
//!
//! Each strategy is isolated. An error in one is logged and the next one is
//! tried. On constrained networks (CI runners) the command-line client goes
//! first; interactive runs start with the browser.

mod curl;
mod session_client;

#[cfg(feature = "browser")]
mod browser;

#[cfg(feature = "browser")]
pub use browser::BrowserStrategy;
pub use curl::{parse_curl_output, CurlStrategy};
pub use session_client::SessionStrategy;

use crate::config::EvasionConfig;
use crate::fetch::{CrawlSession, FetchOutcome, HeaderProfile, HeaderProfileGenerator, ProxyPool, Transport};
use crate::telemetry::{PerfEvent, PerformanceSink};
use crate::StrategyError;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything a strategy needs for one attempt
#[derive(Debug, Clone)]
pub struct StrategyContext {
    /// Fingerprint headers to present
    pub profile: HeaderProfile,

    /// Working proxy, if the pool found one
    pub proxy: Option<String>,

    pub timeout: Duration,

    /// Seed for any randomized decision the strategy makes
    pub seed: u64,
}

/// An alternative way of fetching a page
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn transport(&self) -> Transport;

    /// Fetches the URL once through this transport
    ///
    /// `Err` means the transport itself could not run; an HTTP refusal is an
    /// `Ok` outcome.
    async fn attempt(&self, url: &str, ctx: &StrategyContext) -> Result<FetchOutcome, StrategyError>;
}

/// Strategy priority for the given network environment
pub fn strategy_order(constrained_network: bool) -> [Transport; 3] {
    if constrained_network {
        [Transport::CommandLine, Transport::Session, Transport::Browser]
    } else {
        [Transport::Browser, Transport::Session, Transport::CommandLine]
    }
}

/// Whether this run happens on a constrained network
///
/// `[evasion].constrained-network` wins; otherwise a truthy `GITHUB_ACTIONS`
/// or `CI` environment variable marks the run as constrained.
pub fn detect_constrained_network(config: &EvasionConfig) -> bool {
    config.constrained_network.unwrap_or_else(|| {
        ["GITHUB_ACTIONS", "CI"]
            .iter()
            .any(|name| std::env::var(name).map(|v| is_truthy(&v)).unwrap_or(false))
    })
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Builds the enabled strategies in priority order
pub fn build_strategies(
    config: &EvasionConfig,
    constrained_network: bool,
    timeout: Duration,
) -> Vec<Box<dyn FetchStrategy>> {
    let mut strategies: Vec<Box<dyn FetchStrategy>> = Vec::new();

    for transport in strategy_order(constrained_network) {
        match transport {
            Transport::CommandLine if config.enable_curl => {
                strategies.push(Box::new(CurlStrategy::new(config.curl_binary.clone())));
            }
            Transport::Session if config.enable_session => {
                strategies.push(Box::new(SessionStrategy::new(
                    timeout,
                    SessionStrategy::adapter_policy(),
                )));
            }
            Transport::Browser if config.enable_browser => {
                #[cfg(feature = "browser")]
                strategies.push(Box::new(BrowserStrategy::new()));

                #[cfg(not(feature = "browser"))]
                tracing::debug!("Browser strategy enabled in config but not compiled in");
            }
            _ => {}
        }
    }

    strategies
}

/// Ordered fallback transports tried after the request executor gives up
pub struct EscalationChain {
    strategies: Vec<Box<dyn FetchStrategy>>,
    headers: HeaderProfileGenerator,
    proxies: ProxyPool,
    timeout: Duration,
    sink: Arc<dyn PerformanceSink>,
}

impl EscalationChain {
    pub fn new(
        strategies: Vec<Box<dyn FetchStrategy>>,
        headers: HeaderProfileGenerator,
        proxies: ProxyPool,
        timeout: Duration,
        sink: Arc<dyn PerformanceSink>,
    ) -> Self {
        Self {
            strategies,
            headers,
            proxies,
            timeout,
            sink,
        }
    }

    /// Names of the strategies in the order they are tried
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Tries each strategy in order until one succeeds
    ///
    /// # Returns
    ///
    /// The first success, otherwise the last strategy's failure
    pub async fn escalate(&self, url: &str, session: &mut CrawlSession) -> FetchOutcome {
        if self.strategies.is_empty() {
            return FetchOutcome::transport_failure("No escalation strategies configured");
        }

        let mut proxy = self.proxies.working_proxy().await;
        let mut last = None;

        for (index, strategy) in self.strategies.iter().enumerate() {
            let ctx = StrategyContext {
                profile: self.headers.next_for(session),
                proxy: proxy.clone(),
                timeout: self.timeout,
                seed: session.rng().gen(),
            };

            tracing::info!("Escalating {} via {} strategy", url, strategy.name());

            let started = Instant::now();
            let (outcome, network_failure) = match strategy.attempt(url, &ctx).await {
                Ok(outcome) => {
                    let failed = matches!(outcome, FetchOutcome::TransportFailure { .. });
                    (outcome, failed)
                }
                Err(e) => {
                    tracing::warn!("{} strategy failed for {}: {}", strategy.name(), url, e);
                    let failed = matches!(e, StrategyError::Transport { .. });
                    (FetchOutcome::transport_failure(e.to_string()), failed)
                }
            };

            let mut event = PerfEvent::new("escalation_strategy", started.elapsed())
                .with("strategy_index", index as f64)
                .with("success", if outcome.is_success() { 1.0 } else { 0.0 });
            if let Some(code) = outcome.status_code() {
                event = event.with("status_code", f64::from(code));
            }
            self.sink.record(event);

            if outcome.is_success() {
                tracing::info!("{} strategy succeeded for {}", strategy.name(), url);
                session.mark_established();
                return outcome;
            }

            tracing::warn!("{} strategy did not get {}: {}", strategy.name(), url, outcome);

            // A network failure through a proxy condemns the proxy, not the strategy
            if network_failure {
                if let Some(failed) = &proxy {
                    proxy = self.proxies.rotate_from(failed);
                }
            }
            last = Some(outcome);
        }

        last.unwrap_or_else(|| FetchOutcome::transport_failure("All escalation strategies failed"))
    }
}
