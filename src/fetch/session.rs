//! Per-run request session state

use crate::config::DelayRange;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

/// Session state threaded through every request of one crawl run
///
/// Holds the request counter and "session established" flag that drive
/// referrer sequencing, and the seedable RNG behind every randomized
/// decision (fingerprints, human-like delays, jitter). One session belongs
/// to one run and is passed explicitly, never shared globally.
#[derive(Debug)]
pub struct CrawlSession {
    requests_made: u32,
    established: bool,
    rng: StdRng,
}

impl CrawlSession {
    /// Creates a session, seeded for reproducible runs when `seed` is set
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            requests_made: 0,
            established: false,
            rng,
        }
    }

    /// Counts a new request and returns its 1-based index
    pub fn next_request_index(&mut self) -> u32 {
        self.requests_made = self.requests_made.saturating_add(1);
        self.requests_made
    }

    pub fn requests_made(&self) -> u32 {
        self.requests_made
    }

    /// True once a page of the target site has been fetched successfully
    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn mark_established(&mut self) {
        if !self.established {
            tracing::debug!(
                "Session established after {} requests",
                self.requests_made
            );
        }
        self.established = true;
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Draws a delay from the range using the session RNG
    pub fn sample_delay(&mut self, range: &DelayRange) -> Duration {
        range.sample(&mut self.rng)
    }

    /// Sleeps for a delay drawn from the range
    pub async fn pause(&mut self, range: &DelayRange) -> Duration {
        let wait = self.sample_delay(range);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_index_is_one_based() {
        let mut session = CrawlSession::new(Some(1));
        assert_eq!(session.requests_made(), 0);
        assert_eq!(session.next_request_index(), 1);
        assert_eq!(session.next_request_index(), 2);
        assert_eq!(session.requests_made(), 2);
    }

    #[test]
    fn test_seeded_sessions_agree() {
        let range = DelayRange::new(1_000, 3_000);
        let mut a = CrawlSession::new(Some(99));
        let mut b = CrawlSession::new(Some(99));

        for _ in 0..10 {
            assert_eq!(a.sample_delay(&range), b.sample_delay(&range));
        }
    }

    #[test]
    fn test_sample_delay_in_range() {
        let range = DelayRange::new(1_000, 3_000);
        let mut session = CrawlSession::new(Some(7));

        for _ in 0..100 {
            let d = session.sample_delay(&range);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(3));
        }
    }

    #[tokio::test]
    async fn test_zero_pause_returns_immediately() {
        let mut session = CrawlSession::new(Some(7));
        assert_eq!(session.pause(&DelayRange::zero()).await, Duration::ZERO);
    }
}
