//! Crawl state: frontier queue, visited set and page budget

use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Where a crawl run currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    Warming,
    /// Trying an entry URL candidate
    Probing(String),
    Crawling,
    Draining,
    Done,
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Warming => f.write_str("warming"),
            Self::Probing(url) => write!(f, "probing {}", url),
            Self::Crawling => f.write_str("crawling"),
            Self::Draining => f.write_str("draining"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// Breadth-first traversal state of one run
///
/// URLs are expected in normalized form. A URL is fetched at most once: it
/// cannot be enqueued while queued or after it was visited.
#[derive(Debug, Clone)]
pub struct CrawlState {
    visited: HashSet<String>,
    visit_order: Vec<String>,
    queue: VecDeque<String>,
    queued: HashSet<String>,
    pages_fetched: usize,
    safety_ceiling: usize,
}

impl CrawlState {
    pub fn new(safety_ceiling: usize) -> Self {
        Self {
            visited: HashSet::new(),
            visit_order: Vec::new(),
            queue: VecDeque::new(),
            queued: HashSet::new(),
            pages_fetched: 0,
            safety_ceiling,
        }
    }

    /// Adds a URL to the back of the queue
    ///
    /// Returns false if it was already visited or queued.
    pub fn enqueue(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.visited.contains(&url) || self.queued.contains(&url) {
            return false;
        }
        self.queued.insert(url.clone());
        self.queue.push_back(url);
        true
    }

    /// Takes the next URL from the front of the queue
    pub fn next_url(&mut self) -> Option<String> {
        let url = self.queue.pop_front()?;
        self.queued.remove(&url);
        Some(url)
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    /// Marks a URL visited; returns false if it already was
    pub fn mark_visited(&mut self, url: &str) -> bool {
        if !self.visited.insert(url.to_string()) {
            return false;
        }
        self.visit_order.push(url.to_string());
        true
    }

    /// Counts one page fetch against the safety ceiling
    pub fn record_fetch(&mut self) {
        self.pages_fetched += 1;
    }

    /// True once no further page may be fetched
    pub fn ceiling_reached(&self) -> bool {
        self.pages_fetched >= self.safety_ceiling
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn safety_ceiling(&self) -> usize {
        self.safety_ceiling
    }

    /// Visited URLs in visit order
    pub fn visited(&self) -> &[String] {
        &self.visit_order
    }

    /// URLs still waiting in the queue, front first
    pub fn pending(&self) -> Vec<String> {
        self.queue.iter().cloned().collect()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut state = CrawlState::new(10);
        state.enqueue("a");
        state.enqueue("b");
        state.enqueue("c");

        assert_eq!(state.next_url().as_deref(), Some("a"));
        assert_eq!(state.next_url().as_deref(), Some("b"));
        assert_eq!(state.next_url().as_deref(), Some("c"));
        assert_eq!(state.next_url(), None);
    }

    #[test]
    fn test_no_duplicate_enqueue() {
        let mut state = CrawlState::new(10);
        assert!(state.enqueue("a"));
        assert!(!state.enqueue("a"));
        assert_eq!(state.queue_len(), 1);

        let url = state.next_url().unwrap();
        assert!(state.mark_visited(&url));
        assert!(!state.enqueue("a"));
        assert!(!state.mark_visited("a"));
        assert_eq!(state.visited(), &["a".to_string()]);
    }

    #[test]
    fn test_ceiling() {
        let mut state = CrawlState::new(2);
        assert!(!state.ceiling_reached());
        state.record_fetch();
        assert!(!state.ceiling_reached());
        state.record_fetch();
        assert!(state.ceiling_reached());
        assert_eq!(state.pages_fetched(), 2);
    }

    #[test]
    fn test_pending_in_queue_order() {
        let mut state = CrawlState::new(10);
        state.enqueue("a");
        state.enqueue("b");
        state.enqueue("c");
        state.next_url();

        assert_eq!(state.pending(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(CrawlPhase::Probing("https://a/".into()).to_string(), "probing https://a/");
        assert_eq!(CrawlPhase::Draining.to_string(), "draining");
    }
}
