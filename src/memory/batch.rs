//! Memory-bounded batch processing

use super::probe::MemoryProbe;
use crate::telemetry::{PerfEvent, PerformanceSink};
use std::sync::Arc;
use std::time::Instant;

/// Counters accumulated across all batches of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub batches: usize,
    pub reclaims: usize,
    pub bytes_freed: u64,
    pub peak_bytes: u64,
}

/// Splits large item lists into chunks and keeps memory under a threshold
///
/// Before each chunk the process memory is measured; above the threshold a
/// reclaim pass releases spare capacity held by the accumulated results and
/// measures again.
pub struct BatchMemoryManager {
    threshold_bytes: u64,
    probe: Box<dyn MemoryProbe>,
    sink: Arc<dyn PerformanceSink>,
    stats: BatchStats,
}

impl BatchMemoryManager {
    pub fn new(
        threshold_bytes: u64,
        probe: Box<dyn MemoryProbe>,
        sink: Arc<dyn PerformanceSink>,
    ) -> Self {
        Self {
            threshold_bytes,
            probe,
            sink,
            stats: BatchStats::default(),
        }
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Processes `items` in consecutive chunks of `batch_size`
    ///
    /// A chunk error propagates and stops processing; `process` is expected
    /// to handle per-item failures itself.
    ///
    /// # Arguments
    ///
    /// * `items` - Items to process
    /// * `batch_size` - Chunk length (0 is treated as 1)
    /// * `process` - Called once per chunk, returning that chunk's results
    pub fn process_in_batches<T, R, E, F>(
        &mut self,
        items: &[T],
        batch_size: usize,
        mut process: F,
    ) -> Result<Vec<R>, E>
    where
        F: FnMut(&[T]) -> Result<Vec<R>, E>,
    {
        let mut results = Vec::with_capacity(items.len());

        for (index, chunk) in items.chunks(batch_size.max(1)).enumerate() {
            self.check_memory(&mut results);

            tracing::trace!("Processing batch {} ({} items)", index + 1, chunk.len());
            results.extend(process(chunk)?);
            self.stats.batches += 1;
        }

        Ok(results)
    }

    fn check_memory<R>(&mut self, results: &mut Vec<R>) {
        let Some(before) = self.probe.resident_bytes() else {
            return;
        };
        self.stats.peak_bytes = self.stats.peak_bytes.max(before);

        if before <= self.threshold_bytes {
            return;
        }

        let started = Instant::now();
        results.shrink_to_fit();
        let after = self.probe.resident_bytes().unwrap_or(before);
        let freed = before.saturating_sub(after);

        self.stats.reclaims += 1;
        self.stats.bytes_freed = self.stats.bytes_freed.saturating_add(freed);

        tracing::info!(
            "Memory {:.1} MB above threshold {:.1} MB, reclaimed {:.1} MB",
            mb(before),
            mb(self.threshold_bytes),
            mb(freed)
        );

        self.sink.record(
            PerfEvent::new("memory_reclaim", started.elapsed())
                .with("bytes_before", before as f64)
                .with("bytes_after", after as f64)
                .with("bytes_freed", freed as f64),
        );
    }
}

fn mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
