//! Result of one crawl run

use crate::crawler::extract::Record;
use crate::memory::BatchStats;
use std::time::Duration;

/// Everything a crawl run gathered, plus the counts needed to judge how
/// complete it was
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    /// Records across all visited pages, in visit order
    pub records: Vec<Record>,

    /// Fetches tried: every probed entry URL plus every follow-up page
    pub pages_attempted: usize,

    /// Fetches that returned a page
    pub pages_succeeded: usize,

    /// Follow-up pages that could not be fetched and yielded no records
    pub pages_skipped: usize,

    /// Pages counted against the safety ceiling (probe winner included)
    pub pages_fetched: usize,

    /// The entry URL that won probing
    pub entry_url: Option<String>,

    /// Visited URLs in visit order
    pub visited: Vec<String>,

    /// Queued URLs left unfetched when the run stopped, in queue order
    pub pending: Vec<String>,

    /// Whether the warmup sequence ended on a successful page
    pub warmed_up: bool,

    /// The run stopped because the wall-clock deadline passed
    pub deadline_hit: bool,

    /// The run stopped because the safety ceiling was reached
    pub ceiling_hit: bool,

    pub memory: BatchStats,

    pub duration: Duration,
}

impl CrawlReport {
    /// Share of attempted fetches that succeeded, 0.0 when nothing was tried
    pub fn success_rate(&self) -> f64 {
        if self.pages_attempted == 0 {
            return 0.0;
        }
        self.pages_succeeded as f64 / self.pages_attempted as f64
    }

    /// True if probing found no entry URL
    pub fn is_empty(&self) -> bool {
        self.entry_url.is_none() && self.records.is_empty()
    }
}
