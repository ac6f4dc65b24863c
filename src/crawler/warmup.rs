//! Session warmup before the real target

use crate::config::DelayRange;
use crate::fetch::{CrawlSession, RequestExecutor, RetryPolicy};

/// Visits low-suspicion pages in order to build cookies and history
pub struct SessionWarmupSequencer<'a> {
    executor: &'a RequestExecutor,
    policy: &'a RetryPolicy,
    read_delay: DelayRange,
}

impl<'a> SessionWarmupSequencer<'a> {
    pub fn new(executor: &'a RequestExecutor, policy: &'a RetryPolicy, read_delay: DelayRange) -> Self {
        Self {
            executor,
            policy,
            read_delay,
        }
    }

    /// Visits each URL, "reading" each page that loads
    ///
    /// A failure mid-sequence is logged and the sequence continues.
    ///
    /// # Returns
    ///
    /// True only if the last URL loaded; an empty sequence counts as warmed up
    pub async fn warmup(&self, urls: &[String], session: &mut CrawlSession) -> bool {
        if urls.is_empty() {
            return true;
        }

        tracing::info!("Warming up session with {} pages", urls.len());
        let mut last_succeeded = false;

        for url in urls {
            let outcome = self.executor.fetch(url, self.policy, session).await;
            last_succeeded = outcome.is_success();

            if last_succeeded {
                let read = session.pause(&self.read_delay).await;
                tracing::debug!("Warmup page {} read for {:.1}s", url, read.as_secs_f64());
            } else {
                tracing::warn!("Warmup page {} failed: {}", url, outcome);
            }
        }

        if last_succeeded {
            tracing::info!("Session warmup complete");
        } else {
            tracing::warn!("Session warmup incomplete, continuing to the target");
        }
        last_succeeded
    }
}
