//! Performance telemetry
//!
//! Fetch attempts, escalation strategies, page scrapes and memory reclaim
//! passes report their timing to a `PerformanceSink`. Sinks are purely
//! observational: nothing they do feeds back into crawl control flow.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// One timed operation
#[derive(Debug, Clone, PartialEq)]
pub struct PerfEvent {
    /// Operation name, e.g. `fetch_attempt`
    pub operation: String,

    /// Wall-clock duration of the operation
    pub duration: Duration,

    /// Operation-specific numeric metrics
    pub extra: BTreeMap<String, f64>,
}

impl PerfEvent {
    pub fn new(operation: impl Into<String>, duration: Duration) -> Self {
        Self {
            operation: operation.into(),
            duration,
            extra: BTreeMap::new(),
        }
    }

    /// Adds a metric to the event
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// Receiver of performance events
pub trait PerformanceSink: Send + Sync {
    fn record(&self, event: PerfEvent);
}

/// Sink that writes each event to the debug log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl PerformanceSink for TracingSink {
    fn record(&self, event: PerfEvent) {
        tracing::debug!(
            operation = %event.operation,
            duration_seconds = event.duration_seconds(),
            extra = ?event.extra,
            "performance event"
        );
    }
}

/// Sink that keeps every event for later summarizing
#[derive(Debug, Default)]
pub struct PerformanceRecorder {
    events: Mutex<Vec<PerfEvent>>,
}

/// Aggregated timings of one operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSummary {
    pub count: usize,
    pub total: Duration,
    pub mean: Duration,
    pub max: Duration,
}

/// Aggregated timings across all operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceSummary {
    pub operations: BTreeMap<String, OperationSummary>,

    /// Share of `fetch_attempt` events that ended in a success
    pub fetch_success_rate: Option<f64>,
}

impl PerformanceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded events
    pub fn events(&self) -> Vec<PerfEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Returns the recorded events for one operation
    pub fn events_for(&self, operation: &str) -> Vec<PerfEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.operation == operation)
            .collect()
    }

    /// Summarizes recorded events per operation
    pub fn summary(&self) -> PerformanceSummary {
        let events = self.events();
        let mut operations: BTreeMap<String, OperationSummary> = BTreeMap::new();

        for event in &events {
            let entry = operations
                .entry(event.operation.clone())
                .or_insert(OperationSummary {
                    count: 0,
                    total: Duration::ZERO,
                    mean: Duration::ZERO,
                    max: Duration::ZERO,
                });
            entry.count += 1;
            entry.total += event.duration;
            entry.max = entry.max.max(event.duration);
        }

        for summary in operations.values_mut() {
            summary.mean = summary.total / summary.count as u32;
        }

        let attempts: Vec<&PerfEvent> = events
            .iter()
            .filter(|e| e.operation == "fetch_attempt")
            .collect();
        let fetch_success_rate = if attempts.is_empty() {
            None
        } else {
            let successes = attempts
                .iter()
                .filter(|e| e.extra.get("success").copied() == Some(1.0))
                .count();
            Some(successes as f64 / attempts.len() as f64)
        };

        PerformanceSummary {
            operations,
            fetch_success_rate,
        }
    }
}

impl PerformanceSink for PerformanceRecorder {
    fn record(&self, event: PerfEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Forwards every event to several sinks
pub struct FanOutSink {
    sinks: Vec<std::sync::Arc<dyn PerformanceSink>>,
}

impl FanOutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn PerformanceSink>>) -> Self {
        Self { sinks }
    }
}

impl PerformanceSink for FanOutSink {
    fn record(&self, event: PerfEvent) {
        for sink in &self.sinks {
            sink.record(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_summary() {
        let recorder = PerformanceRecorder::new();
        recorder.record(
            PerfEvent::new("fetch_attempt", Duration::from_millis(100)).with("success", 1.0),
        );
        recorder.record(
            PerfEvent::new("fetch_attempt", Duration::from_millis(300)).with("success", 0.0),
        );
        recorder.record(PerfEvent::new("scrape_page", Duration::from_millis(50)));

        let summary = recorder.summary();
        let fetch = &summary.operations["fetch_attempt"];

        assert_eq!(fetch.count, 2);
        assert_eq!(fetch.total, Duration::from_millis(400));
        assert_eq!(fetch.mean, Duration::from_millis(200));
        assert_eq!(fetch.max, Duration::from_millis(300));
        assert_eq!(summary.operations["scrape_page"].count, 1);
        assert_eq!(summary.fetch_success_rate, Some(0.5));
    }

    #[test]
    fn test_empty_summary() {
        let summary = PerformanceRecorder::new().summary();
        assert!(summary.operations.is_empty());
        assert_eq!(summary.fetch_success_rate, None);
    }

    #[test]
    fn test_fan_out_reaches_every_sink() {
        let a = std::sync::Arc::new(PerformanceRecorder::new());
        let b = std::sync::Arc::new(PerformanceRecorder::new());
        let fan = FanOutSink::new(vec![a.clone() as std::sync::Arc<dyn PerformanceSink>, b.clone()]);

        fan.record(PerfEvent::new("crawl", Duration::from_secs(1)));

        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events_for("crawl").len(), 1);
    }
}
