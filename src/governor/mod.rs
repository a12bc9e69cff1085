//! Resource governor
//!
//! Polled by the coordinator every few processed URLs. It never interrupts
//! work on its own; the caller decides how to react to the returned action.

mod probe;

pub use probe::{MemoryProbe, SysinfoProbe};

use crate::config::ResourceConfig;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const MIB: u64 = 1024 * 1024;

/// Outcome of a governor check, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GovernorAction {
    Continue,
    /// Shed concurrency and check again later
    Pause,
    /// Stop the crawl
    Abort,
}

/// Something that can give memory back when asked
pub trait Reclaim {
    fn reclaim(&self);
}

pub struct ResourceGovernor {
    probe: Box<dyn MemoryProbe>,
    hard_limit: u64,
    soft_limit: u64,
    cache_limit: u64,
    cache_soft_limit: u64,
    data_dir: PathBuf,
    last_memory: AtomicU64,
}

impl ResourceGovernor {
    /// Builds a governor that samples this process through `sysinfo`
    pub fn new(config: &ResourceConfig, data_dir: &Path) -> Result<Self> {
        Ok(Self::with_probe(
            config,
            data_dir,
            Box::new(SysinfoProbe::new()?),
        ))
    }

    pub fn with_probe(
        config: &ResourceConfig,
        data_dir: &Path,
        probe: Box<dyn MemoryProbe>,
    ) -> Self {
        let hard_limit = config.memory_limit_mb.saturating_mul(MIB);
        let cache_limit = config.cache_limit_mb.saturating_mul(MIB);
        Self {
            probe,
            hard_limit,
            soft_limit: (hard_limit as f64 * config.soft_memory_ratio) as u64,
            cache_limit,
            cache_soft_limit: (cache_limit as f64 * config.soft_memory_ratio) as u64,
            data_dir: data_dir.to_path_buf(),
            last_memory: AtomicU64::new(0),
        }
    }

    /// Memory figure from the most recent check
    pub fn last_memory_bytes(&self) -> u64 {
        self.last_memory.load(Ordering::Relaxed)
    }

    /// Samples process memory, forcing a reclamation before escalating
    ///
    /// Usage at or below the soft threshold is `Continue`. Otherwise
    /// `reclaimer` is asked to release memory and the probe is read again:
    /// still above the hard limit is `Abort`, still above the soft threshold
    /// is `Pause`.
    pub fn checkpoint(&self, reclaimer: &dyn Reclaim) -> Result<GovernorAction> {
        let used = self.sample()?;
        if used <= self.soft_limit {
            return Ok(GovernorAction::Continue);
        }

        reclaimer.reclaim();
        let used = self.sample()?;

        let action = if used > self.hard_limit {
            GovernorAction::Abort
        } else if used > self.soft_limit {
            GovernorAction::Pause
        } else {
            GovernorAction::Continue
        };

        if action != GovernorAction::Continue {
            tracing::warn!(
                "Memory pressure: {} MiB used (soft {} MiB, hard {} MiB) -> {:?}",
                used / MIB,
                self.soft_limit / MIB,
                self.hard_limit / MIB,
                action
            );
        }

        Ok(action)
    }

    /// Compares the size of the data directory against the cache budget
    pub fn cache_usage(&self) -> Result<GovernorAction> {
        let used = directory_size(&self.data_dir)?;

        let action = if used > self.cache_limit {
            GovernorAction::Abort
        } else if used > self.cache_soft_limit {
            GovernorAction::Pause
        } else {
            GovernorAction::Continue
        };

        if action != GovernorAction::Continue {
            tracing::warn!(
                "Data directory at {} MiB of {} MiB budget -> {:?}",
                used / MIB,
                self.cache_limit / MIB,
                action
            );
        }

        Ok(action)
    }

    fn sample(&self) -> Result<u64> {
        let used = self.probe.resident_bytes()?;
        self.last_memory.store(used, Ordering::Relaxed);
        Ok(used)
    }
}

/// Total size of regular files below `dir`; a missing directory counts as empty
fn directory_size(dir: &Path) -> Result<u64> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut total = 0;
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += directory_size(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
