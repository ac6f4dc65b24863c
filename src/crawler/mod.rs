//! Crawler module for catalog traversal
//!
//! This module contains the core crawling logic, including:
//! - Session warmup before the real target
//! - Entry URL probing with fallbacks
//! - Bounded breadth-first pagination traversal
//! - Item extraction through the caller's extractor

mod extract;
mod manager;
mod parser;
mod report;
mod state;
mod warmup;

pub use extract::{Extractor, Record, SelectorExtractor};
pub use manager::{CrawlManager, CrawlPlan};
pub use parser::{parse_listing, PageSelectors, ParsedPage};
pub use report::CrawlReport;
pub use state::{CrawlPhase, CrawlState};
pub use warmup::SessionWarmupSequencer;

use crate::config::Config;
use crate::telemetry::PerformanceSink;
use crate::HarvestError;
use std::sync::Arc;

/// Runs a complete crawl from configuration
///
/// This is the main entry point for a crawl. It will:
/// 1. Build the HTTP client, escalation chain and proxy pool
/// 2. Warm up the session
/// 3. Probe the entry URLs
/// 4. Follow pagination up to the safety ceiling
///
/// # Arguments
///
/// * `config` - The crawl configuration
/// * `extractor` - Turns each item element into a record
/// * `sink` - Receiver of performance events
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Records and page counts (possibly empty)
/// * `Err(HarvestError)` - The crawl could not be set up
pub async fn crawl(
    config: &Config,
    extractor: &dyn Extractor,
    sink: Arc<dyn PerformanceSink>,
) -> Result<CrawlReport, HarvestError> {
    let mut manager = CrawlManager::from_config(config, sink)?;
    Ok(manager.run(extractor).await)
}
