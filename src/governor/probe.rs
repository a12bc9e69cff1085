use crate::{CrawlError, Result};
use parking_lot::Mutex;
use sysinfo::{Pid, System};

/// Source of the current process memory figure
pub trait MemoryProbe: Send + Sync {
    /// Resident memory of this process in bytes
    fn resident_bytes(&self) -> Result<u64>;
}

/// Reads resident memory through `sysinfo`
pub struct SysinfoProbe {
    pid: Pid,
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| CrawlError::Probe(e.to_string()))?;
        Ok(Self {
            pid,
            system: Mutex::new(System::new()),
        })
    }
}

impl MemoryProbe for SysinfoProbe {
    fn resident_bytes(&self) -> Result<u64> {
        let mut system = self.system.lock();
        system.refresh_process(self.pid);
        system
            .process(self.pid)
            .map(|p| p.memory())
            .ok_or_else(|| CrawlError::Probe(format!("process {} not found", self.pid)))
    }
}
