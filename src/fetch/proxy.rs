//! Proxy candidate pool with liveness testing
//!
//! Candidates are tested against a neutral IP-echo endpoint, never against
//! the protected catalog, so the tests may run concurrently.

use crate::config::ProxyConfig;
use chrono::{DateTime, Utc};
use reqwest::{Client, Proxy};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A proxy candidate and its last liveness result
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRecord {
    pub address: String,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub is_working: bool,
}

impl ProxyRecord {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            last_tested_at: None,
            is_working: false,
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    records: Vec<ProxyRecord>,
    next_index: usize,
    /// Working proxy found by an earlier liveness sweep
    selected: Option<String>,
    sweep_done: bool,
}

/// Holds proxy candidates, rotates through them and finds a live one
#[derive(Debug, Clone)]
pub struct ProxyPool {
    state: Arc<Mutex<PoolState>>,
    echo_url: String,
    test_timeout: Duration,
    concurrency: usize,
}

impl ProxyPool {
    /// Creates a pool from explicit candidates
    pub fn new(
        candidates: Vec<String>,
        echo_url: impl Into<String>,
        test_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        let records = dedup_candidates(candidates)
            .into_iter()
            .map(ProxyRecord::new)
            .collect();

        Self {
            state: Arc::new(Mutex::new(PoolState {
                records,
                ..PoolState::default()
            })),
            echo_url: echo_url.into(),
            test_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// A pool without candidates; every lookup returns `None`
    pub fn empty() -> Self {
        Self::new(Vec::new(), "http://httpbin.org/ip", Duration::from_secs(10), 1)
    }

    /// Builds the pool from configured candidates, the list file and the
    /// `PROXY_LIST` environment variable, in that order
    ///
    /// An unreadable list file is logged and skipped; crawling without a
    /// proxy is always possible.
    pub fn from_config(config: &ProxyConfig) -> Self {
        let mut candidates = config.candidates.clone();

        if let Some(path) = &config.list_file {
            match read_proxy_list(Path::new(path)) {
                Ok(list) => {
                    tracing::info!("Loaded {} proxy candidates from {}", list.len(), path);
                    candidates.extend(list);
                }
                Err(e) => tracing::warn!("Could not read proxy list {}: {}", path, e),
            }
        }

        if config.use_env {
            if let Ok(value) = std::env::var("PROXY_LIST") {
                candidates.extend(parse_proxy_list(&value.replace(',', "\n")));
            }
        }

        Self::new(
            candidates,
            config.echo_url.clone(),
            Duration::from_secs(config.test_timeout_secs),
            config.concurrency,
        )
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all candidate records
    pub fn records(&self) -> Vec<ProxyRecord> {
        self.lock().records.clone()
    }

    /// Returns the next candidate in round-robin order
    pub fn next(&self) -> Option<String> {
        advance(&mut self.lock(), |_| true)
    }

    /// Marks a proxy dead and rotates to the next working one
    ///
    /// The replacement becomes the pool's working proxy; `None` means no
    /// working candidate is left and callers proceed without a proxy.
    pub fn rotate_from(&self, failed: &str) -> Option<String> {
        let mut state = self.lock();
        if let Some(record) = state.records.iter_mut().find(|r| r.address == failed) {
            record.is_working = false;
        }

        let replacement = advance(&mut state, |r| r.is_working);
        match &replacement {
            Some(address) => tracing::info!("Proxy {} failed, rotating to {}", failed, address),
            None => tracing::warn!("Proxy {} failed and no working proxy is left", failed),
        }

        state.selected = replacement.clone();
        replacement
    }

    /// Returns the first candidate (in pool order) that passes a liveness test
    ///
    /// The sweep runs once per pool; later calls return the cached answer.
    /// `None` means callers proceed without a proxy.
    pub async fn working_proxy(&self) -> Option<String> {
        let candidates = {
            let state = self.lock();
            if state.sweep_done {
                return state.selected.clone();
            }
            state
                .records
                .iter()
                .map(|r| r.address.clone())
                .collect::<Vec<_>>()
        };

        if candidates.is_empty() {
            self.lock().sweep_done = true;
            return None;
        }

        tracing::info!(
            "Testing {} proxy candidates against {}",
            candidates.len(),
            self.echo_url
        );

        let results = self.test_all(candidates).await;
        self.record_results(&results)
    }

    /// Stores liveness results and selects the first working candidate
    pub(crate) fn record_results(&self, results: &[(String, bool)]) -> Option<String> {
        let mut state = self.lock();
        let now = Utc::now();
        for (address, working) in results {
            if let Some(record) = state.records.iter_mut().find(|r| &r.address == address) {
                record.last_tested_at = Some(now);
                record.is_working = *working;
            }
        }

        let selected = state
            .records
            .iter()
            .find(|r| r.is_working)
            .map(|r| r.address.clone());

        match &selected {
            Some(address) => tracing::info!("Using proxy {}", address),
            None => tracing::warn!("No working proxy found, continuing without one"),
        }

        state.selected = selected.clone();
        state.sweep_done = true;
        selected
    }

    /// Tests every candidate with at most `concurrency` tests in flight
    async fn test_all(&self, candidates: Vec<String>) -> Vec<(String, bool)> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for address in candidates {
            let semaphore = semaphore.clone();
            let echo_url = self.echo_url.clone();
            let timeout = self.test_timeout;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let working = test_proxy(&address, &echo_url, timeout).await;
                (address, working)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!("Proxy liveness task failed: {}", e),
            }
        }
        results
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Walks the round-robin cursor to the next record `accept` allows
fn advance(state: &mut PoolState, accept: impl Fn(&ProxyRecord) -> bool) -> Option<String> {
    let len = state.records.len();
    for _ in 0..len {
        let index = state.next_index % len;
        state.next_index = (index + 1) % len;
        if accept(&state.records[index]) {
            return Some(state.records[index].address.clone());
        }
    }
    None
}

/// Sends one request through the proxy to the echo endpoint
async fn test_proxy(address: &str, echo_url: &str, timeout: Duration) -> bool {
    let proxy = match Proxy::all(address) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!("Invalid proxy address {}: {}", address, e);
            return false;
        }
    };

    let client = match Client::builder().proxy(proxy).timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!("Could not build client for proxy {}: {}", address, e);
            return false;
        }
    };

    match client.get(echo_url).send().await {
        Ok(response) if response.status().is_success() => {
            tracing::debug!("Proxy working: {}", address);
            true
        }
        Ok(response) => {
            tracing::debug!("Proxy {} answered HTTP {}", address, response.status());
            false
        }
        Err(e) => {
            tracing::debug!("Proxy test failed for {}: {}", address, e);
            false
        }
    }
}

/// Reads proxy addresses from a file, one per line
pub fn read_proxy_list(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_proxy_list(&content))
}

/// Parses proxy addresses, one per line; blank lines and `#` comments are
/// skipped and a missing scheme defaults to `http://`
pub fn parse_proxy_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            if line.contains("://") {
                line.to_string()
            } else {
                format!("http://{}", line)
            }
        })
        .collect()
}

fn dedup_candidates(candidates: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|c| {
            let c = c.trim().to_string();
            if c.contains("://") {
                c
            } else {
                format!("http://{}", c)
            }
        })
        .filter(|c| c.len() > "http://".len() && seen.insert(c.clone()))
        .collect()
}
