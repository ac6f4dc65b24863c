//! Process memory measurement

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Reports the resident memory of the running process
pub trait MemoryProbe: Send {
    /// Current resident set size in bytes, `None` when it cannot be measured
    fn resident_bytes(&mut self) -> Option<u64>;
}

/// Measures the current process through `sysinfo`
pub struct SysinfoProbe {
    system: System,
    pid: Option<Pid>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Cannot determine own process id, memory checks disabled: {}", e);
                None
            }
        };

        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn resident_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map(|process| process.memory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysinfo_probe_measures_self() {
        let mut probe = SysinfoProbe::new();
        let bytes = probe.resident_bytes();
        assert!(bytes.map(|b| b > 0).unwrap_or(true));
    }
}
