//! Batch processing under a memory threshold

mod batch;
mod probe;

pub use batch::{BatchMemoryManager, BatchStats};
pub use probe::{MemoryProbe, SysinfoProbe};
