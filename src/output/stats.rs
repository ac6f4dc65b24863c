//! Crawl report and performance summary display

use crate::crawler::CrawlReport;
use crate::telemetry::PerformanceSummary;
use std::fmt::Write;

/// Renders the crawl report and performance summary as text
pub fn render_report(report: &CrawlReport, performance: &PerformanceSummary) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = write_report(&mut out, report, performance);
    out
}

fn write_report(
    out: &mut String,
    report: &CrawlReport,
    performance: &PerformanceSummary,
) -> std::fmt::Result {
    writeln!(out, "=== Crawl Report ===\n")?;

    writeln!(out, "Overview:")?;
    writeln!(
        out,
        "  Entry URL: {}",
        report.entry_url.as_deref().unwrap_or("(none reachable)")
    )?;
    writeln!(out, "  Records: {}", report.records.len())?;
    writeln!(out, "  Pages fetched: {}", report.pages_fetched)?;
    writeln!(out, "  Pages skipped: {}", report.pages_skipped)?;
    writeln!(out, "  Session warmed up: {}", yes_no(report.warmed_up))?;
    writeln!(out, "  Duration: {:.1}s", report.duration.as_secs_f64())?;
    writeln!(out)?;

    if report.ceiling_hit || report.deadline_hit {
        writeln!(out, "Stopped Early:")?;
        if report.ceiling_hit {
            writeln!(out, "  - safety ceiling reached")?;
        }
        if report.deadline_hit {
            writeln!(out, "  - deadline reached")?;
        }
        if !report.pending.is_empty() {
            writeln!(out, "  - {} queued pages left unfetched", report.pending.len())?;
        }
        writeln!(out)?;
    }

    if !report.visited.is_empty() {
        writeln!(out, "Visited Pages ({}):", report.visited.len())?;
        for url in &report.visited {
            writeln!(out, "  - {}", url)?;
        }
        writeln!(out)?;
    }

    if report.memory.reclaims > 0 {
        writeln!(out, "Memory:")?;
        writeln!(out, "  Batches: {}", report.memory.batches)?;
        writeln!(out, "  Reclaim passes: {}", report.memory.reclaims)?;
        writeln!(
            out,
            "  Freed: {:.1} MB (peak {:.1} MB)",
            report.memory.bytes_freed as f64 / (1024.0 * 1024.0),
            report.memory.peak_bytes as f64 / (1024.0 * 1024.0)
        )?;
        writeln!(out)?;
    }

    if !performance.operations.is_empty() {
        writeln!(out, "Performance:")?;
        for (operation, summary) in &performance.operations {
            writeln!(
                out,
                "  {}: {} calls, mean {:.2}s, max {:.2}s",
                operation,
                summary.count,
                summary.mean.as_secs_f64(),
                summary.max.as_secs_f64()
            )?;
        }
        if let Some(rate) = performance.fetch_success_rate {
            writeln!(out, "  Fetch attempt success rate: {:.1}%", rate * 100.0)?;
        }
        writeln!(out)?;
    }

    writeln!(
        out,
        "Success Rate: {:.1}% ({} / {} fetches succeeded)",
        report.success_rate() * 100.0,
        report.pages_succeeded,
        report.pages_attempted
    )
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Prints the crawl report to stderr, keeping stdout free for records
pub fn print_report(report: &CrawlReport, performance: &PerformanceSummary) {
    eprint!("{}", render_report(report, performance));
}
