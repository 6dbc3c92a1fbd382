//! Best-effort memory report for the current process.

use sysinfo::{ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1_048_576.0;

/// Memory figures in whole megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Resident set of this process.
    pub used: u64,
    /// Virtual size of this process.
    pub total: u64,
    /// Physical memory of the host.
    pub limit: u64,
}

impl MemoryUsage {
    /// `used` as a percentage of `limit`.
    #[must_use]
    pub fn percent_of_limit(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        self.used as f64 / self.limit as f64 * 100.0
    }
}

fn to_mb(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_PER_MB).round() as u64
}

/// Read memory figures from the host. `None` when the platform does not report them.
#[must_use]
pub fn get_memory_usage() -> Option<MemoryUsage> {
    if !sysinfo::IS_SUPPORTED_SYSTEM {
        return None;
    }

    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    let process = sys.process(pid)?;
    let limit = sys.total_memory();
    if limit == 0 {
        return None;
    }

    Some(MemoryUsage {
        used: to_mb(process.memory()),
        total: to_mb(process.virtual_memory()),
        limit: to_mb(limit),
    })
}

/// Log `used / limit` when a report is available.
pub fn log_memory_usage() {
    if let Some(memory) = get_memory_usage() {
        tracing::info!(
            used_mb = memory.used,
            limit_mb = memory.limit,
            "Memory: {}MB / {}MB ({:.1}%)",
            memory.used,
            memory.limit,
            memory.percent_of_limit()
        );
    }
}
