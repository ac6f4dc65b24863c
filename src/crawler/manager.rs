//! Crawl manager - top-level crawl orchestration
//!
//! Drives one run through its phases:
//!
//! ```text
//! Idle -> Warming -> Probing(url) -> Crawling -> Draining -> Done
//!                         |
//!                         +-> Done (every entry URL failed)
//! ```
//!
//! Requests are strictly sequential; every gap between them is a randomized
//! human-like pause drawn from the run's seeded session.

use crate::config::{Config, CrawlConfig, TimingConfig};
use crate::crawler::extract::Extractor;
use crate::crawler::parser::{parse_listing, PageSelectors, ParsedPage};
use crate::crawler::report::CrawlReport;
use crate::crawler::state::{CrawlPhase, CrawlState};
use crate::crawler::warmup::SessionWarmupSequencer;
use crate::evasion::{build_strategies, detect_constrained_network, EscalationChain};
use crate::fetch::{
    build_http_client, CrawlSession, FetchOutcome, HeaderProfileGenerator, ProxyPool,
    RequestExecutor, RetryPolicy,
};
use crate::memory::{BatchMemoryManager, MemoryProbe, SysinfoProbe};
use crate::telemetry::{PerfEvent, PerformanceSink};
use crate::url::{default_warmup_chain, host_name, normalize_url, site_root};
use crate::HarvestError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// What a run would do, for dry runs
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub entry_urls: Vec<String>,
    pub warmup_urls: Vec<String>,
    pub strategies: Vec<&'static str>,
    pub constrained_network: bool,
    pub policy: RetryPolicy,
    pub safety_ceiling: usize,
    pub deadline: Option<Duration>,
}

/// The entry URL that won probing, with its already-fetched page
struct ProbeHit {
    key: String,
    entry_url: String,
    final_url: String,
    body: String,
}

/// Orchestrates warmup, probing and the bounded breadth-first crawl
pub struct CrawlManager {
    entry_urls: Vec<String>,
    warmup_urls: Vec<String>,
    selectors: PageSelectors,
    timing: TimingConfig,
    crawl: CrawlConfig,
    policy: RetryPolicy,
    executor: RequestExecutor,
    chain: EscalationChain,
    memory: BatchMemoryManager,
    sink: Arc<dyn PerformanceSink>,
    session: CrawlSession,
    constrained_network: bool,
    phase: CrawlPhase,
    phase_history: Vec<CrawlPhase>,
}

impl CrawlManager {
    /// Builds a manager and all of its collaborators from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `sink` - Receiver of performance events
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlManager)` - Ready to run
    /// * `Err(HarvestError)` - Bad URL or selector, or the HTTP client could not be built
    pub fn from_config(config: &Config, sink: Arc<dyn PerformanceSink>) -> Result<Self, HarvestError> {
        let target = &config.target;
        let timeout = config.timing.request_timeout();

        let root = site_root(&target.primary_url)?;
        let search_query = target
            .search_query
            .clone()
            .or_else(|| host_name(&target.primary_url))
            .unwrap_or_default();
        let headers = HeaderProfileGenerator::new(
            root,
            config.evasion.search_engine.clone(),
            search_query,
            config.evasion.header_omit_probability,
        );

        let executor = RequestExecutor::new(
            build_http_client(timeout, None)?,
            headers.clone(),
            config.timing.clone(),
            sink.clone(),
        );

        let constrained_network = detect_constrained_network(&config.evasion);
        let chain = EscalationChain::new(
            build_strategies(&config.evasion, constrained_network, timeout),
            headers,
            ProxyPool::from_config(&config.proxy),
            timeout,
            sink.clone(),
        );

        let warmup_urls = if target.warmup_urls.is_empty() {
            default_warmup_chain(&target.primary_url)?
        } else {
            target.warmup_urls.clone()
        };

        let mut entry_urls = vec![target.primary_url.clone()];
        entry_urls.extend(target.fallback_urls.iter().cloned());

        let memory = BatchMemoryManager::new(
            config.crawl.memory_threshold_mb.saturating_mul(1024 * 1024),
            Box::new(SysinfoProbe::new()),
            sink.clone(),
        );

        Ok(Self {
            entry_urls,
            warmup_urls,
            selectors: PageSelectors::new(&target.item_selector, &target.pagination_selector)?,
            timing: config.timing.clone(),
            crawl: config.crawl.clone(),
            policy: RetryPolicy::from_config(&config.retry),
            executor,
            chain,
            memory,
            sink,
            session: CrawlSession::new(config.evasion.seed),
            constrained_network,
            phase: CrawlPhase::Idle,
            phase_history: vec![CrawlPhase::Idle],
        })
    }

    /// Replaces the escalation chain
    pub fn with_escalation_chain(mut self, chain: EscalationChain) -> Self {
        self.chain = chain;
        self
    }

    /// Replaces the memory probe used between extraction batches
    pub fn with_memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.memory = BatchMemoryManager::new(
            self.crawl.memory_threshold_mb.saturating_mul(1024 * 1024),
            probe,
            self.sink.clone(),
        );
        self
    }

    pub fn phase(&self) -> &CrawlPhase {
        &self.phase
    }

    /// Every phase entered so far, starting with `Idle`
    pub fn phase_history(&self) -> &[CrawlPhase] {
        &self.phase_history
    }

    pub fn session(&self) -> &CrawlSession {
        &self.session
    }

    /// Describes the run without touching the network
    pub fn plan(&self) -> CrawlPlan {
        CrawlPlan {
            entry_urls: self.entry_urls.clone(),
            warmup_urls: self.warmup_urls.clone(),
            strategies: self.chain.strategy_names(),
            constrained_network: self.constrained_network,
            policy: self.policy.clone(),
            safety_ceiling: self.crawl.safety_ceiling,
            deadline: self.deadline(),
        }
    }

    fn deadline(&self) -> Option<Duration> {
        self.crawl.deadline_secs.map(Duration::from_secs)
    }

    fn set_phase(&mut self, phase: CrawlPhase) {
        tracing::debug!("Crawl phase: {} -> {}", self.phase, phase);
        self.phase_history.push(phase.clone());
        self.phase = phase;
    }

    /// Runs the crawl to completion
    ///
    /// Never fails: fetch failures become skipped pages, and a run whose
    /// entry URLs all fail returns an empty report. When the deadline
    /// passes, the page in flight is finished and everything collected so
    /// far is returned.
    ///
    /// # Arguments
    ///
    /// * `extractor` - Turns each item element into a record
    pub async fn run(&mut self, extractor: &dyn Extractor) -> CrawlReport {
        let started = Instant::now();
        let deadline = self.deadline().map(|d| started + d);
        let mut report = CrawlReport::default();
        let mut state = CrawlState::new(self.crawl.safety_ceiling);

        tracing::info!(
            "Starting crawl of {} ({} fallback entry URLs, safety ceiling {})",
            self.entry_urls.first().map(String::as_str).unwrap_or(""),
            self.entry_urls.len().saturating_sub(1),
            self.crawl.safety_ceiling
        );

        self.set_phase(CrawlPhase::Warming);
        let sequencer =
            SessionWarmupSequencer::new(&self.executor, &self.policy, self.timing.warmup_read);
        report.warmed_up = sequencer.warmup(&self.warmup_urls, &mut self.session).await;

        let Some(mut probe) = self.probe_entry_urls(&mut report, deadline).await else {
            tracing::error!("Every entry URL failed, nothing to crawl");
            return self.finish(report, &state, started, false);
        };

        report.entry_url = Some(probe.entry_url.clone());
        state.enqueue(probe.key.clone());
        self.set_phase(CrawlPhase::Crawling);

        // Limits are checked before dequeuing so unfetched URLs stay queued
        while !state.queue_is_empty() {
            if state.ceiling_reached() {
                tracing::warn!(
                    "Reached safety ceiling of {} pages, stopping pagination",
                    state.safety_ceiling()
                );
                report.ceiling_hit = true;
                break;
            }

            if is_past(deadline) {
                tracing::warn!("Deadline reached, returning partial results");
                report.deadline_hit = true;
                break;
            }

            let Some(url) = state.next_url() else {
                break;
            };
            if state.is_visited(&url) {
                continue;
            }

            state.mark_visited(&url);
            state.record_fetch();
            let page_started = Instant::now();

            // The probe winner's page is already in hand
            let page = if url == probe.key {
                Some((
                    std::mem::take(&mut probe.final_url),
                    std::mem::take(&mut probe.body),
                ))
            } else {
                report.pages_attempted += 1;
                match self.fetch_page(&url).await {
                    FetchOutcome::Success { final_url, body, .. } => {
                        report.pages_succeeded += 1;
                        Some((final_url, body))
                    }
                    outcome => {
                        tracing::warn!("Skipping page {}: {}", url, outcome);
                        report.pages_skipped += 1;
                        None
                    }
                }
            };

            let parsed = match &page {
                Some((final_url, body)) => self.parse_page(&url, final_url, body, extractor),
                None => ParsedPage::default(),
            };

            let mut enqueued = 0;
            for link in &parsed.pagination_links {
                if state.enqueue(link.clone()) {
                    enqueued += 1;
                }
            }

            tracing::info!(
                "Page {}/{} {}: {} records, {} new pages queued",
                state.pages_fetched(),
                state.safety_ceiling(),
                url,
                parsed.records.len(),
                enqueued
            );

            self.sink.record(
                PerfEvent::new("scrape_page", page_started.elapsed())
                    .with("records", parsed.records.len() as f64)
                    .with("items_failed", parsed.items_failed as f64)
                    .with("success", if page.is_some() { 1.0 } else { 0.0 }),
            );

            report.records.extend(parsed.records);

            if !state.queue_is_empty() && !state.ceiling_reached() && !is_past(deadline) {
                self.session.pause(&self.timing.page_gap).await;
            }
        }

        self.finish(report, &state, started, true)
    }

    /// Tries each entry URL in order until one loads
    async fn probe_entry_urls(
        &mut self,
        report: &mut CrawlReport,
        deadline: Option<Instant>,
    ) -> Option<ProbeHit> {
        let candidates = self.entry_urls.clone();

        for (index, candidate) in candidates.iter().enumerate() {
            if is_past(deadline) {
                tracing::warn!("Deadline reached while probing entry URLs");
                report.deadline_hit = true;
                return None;
            }

            if index > 0 {
                self.session.pause(&self.timing.probe_gap).await;
            }

            self.set_phase(CrawlPhase::Probing(candidate.clone()));

            let key = match normalize_url(candidate) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    tracing::warn!("Skipping invalid entry URL {}: {}", candidate, e);
                    continue;
                }
            };

            report.pages_attempted += 1;
            match self.fetch_page(candidate).await {
                FetchOutcome::Success { final_url, body, .. } => {
                    tracing::info!("Entry URL {} is reachable", candidate);
                    report.pages_succeeded += 1;
                    return Some(ProbeHit {
                        key,
                        entry_url: candidate.clone(),
                        final_url,
                        body,
                    });
                }
                outcome => tracing::warn!("Entry URL {} failed: {}", candidate, outcome),
            }
        }

        None
    }

    /// Fetches a page directly, escalating once retries are exhausted
    async fn fetch_page(&mut self, url: &str) -> FetchOutcome {
        let outcome = self.executor.fetch(url, &self.policy, &mut self.session).await;
        if outcome.is_success() || self.chain.is_empty() {
            return outcome;
        }

        tracing::warn!("Direct fetch of {} exhausted ({}), escalating", url, outcome);
        self.chain.escalate(url, &mut self.session).await
    }

    fn parse_page(&mut self, url: &str, final_url: &str, body: &str, extractor: &dyn Extractor) -> ParsedPage {
        let base = match Url::parse(final_url).or_else(|_| Url::parse(url)) {
            Ok(base) => base,
            Err(e) => {
                tracing::warn!("Cannot parse page URL {}: {}", url, e);
                return ParsedPage::default();
            }
        };

        parse_listing(
            body,
            &base,
            &self.selectors,
            extractor,
            &mut self.memory,
            self.crawl.batch_size,
        )
    }

    /// Closes the run; `crawled` is false when probing found no entry URL,
    /// which goes straight to `Done`
    fn finish(
        &mut self,
        mut report: CrawlReport,
        state: &CrawlState,
        started: Instant,
        crawled: bool,
    ) -> CrawlReport {
        if crawled {
            self.set_phase(CrawlPhase::Draining);
        }

        report.pages_fetched = state.pages_fetched();
        report.visited = state.visited().to_vec();
        report.pending = state.pending();
        report.memory = self.memory.stats();
        report.duration = started.elapsed();

        self.sink.record(
            PerfEvent::new("crawl", report.duration)
                .with("pages_attempted", report.pages_attempted as f64)
                .with("pages_succeeded", report.pages_succeeded as f64)
                .with("records", report.records.len() as f64),
        );

        tracing::info!(
            "Crawl finished: {} records from {} pages ({}/{} fetches succeeded) in {:.1}s",
            report.records.len(),
            report.pages_fetched,
            report.pages_succeeded,
            report.pages_attempted,
            report.duration.as_secs_f64()
        );

        self.set_phase(CrawlPhase::Done);
        report
    }
}

fn is_past(deadline: Option<Instant>) -> bool {
    deadline.map(|d| Instant::now() >= d).unwrap_or(false)
}
