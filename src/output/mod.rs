//! Output module for crawl results
//!
//! This module handles:
//! - Writing records as JSON lines for the downstream pipeline
//! - Displaying the crawl report and performance summary

mod records;
mod stats;

pub use records::{write_records, write_records_to};
pub use stats::{print_report, render_report};
