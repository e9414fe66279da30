//! OS counter sources.
//!
//! Samplers never touch the filesystem directly; they go through
//! [`SystemSource`] so the derivation logic can be driven by scripted
//! counters in tests.

pub mod procfs;

#[cfg(test)]
pub mod fake;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use procfs::ProcFs;

/// Static CPU layout, queried once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTopology {
    pub model_name: String,
    pub sockets: u32,
    pub cores_per_socket: u32,
    pub threads_per_core: u32,
}

impl CpuTopology {
    /// Schedulable thread contexts: physical cores times hardware threads.
    pub fn logical_processors(&self) -> u32 {
        (self.sockets * self.cores_per_socket * self.threads_per_core).max(1)
    }
}

/// Filesystem size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FsCapacity {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

/// Read-only access to the kernel's synthetic counter files.
pub trait SystemSource: Send + Sync {
    /// Aggregate CPU time-in-state table (`/proc/stat`).
    fn cpu_stat(&self) -> Result<String>;

    /// Memory counters (`/proc/meminfo`).
    fn meminfo(&self) -> Result<String>;

    /// Block device statistics (`/proc/diskstats`).
    fn diskstats(&self) -> Result<String>;

    /// Seconds since boot (`/proc/uptime`, first field).
    fn uptime_secs(&self) -> Result<f64>;

    fn cpu_topology(&self) -> Result<CpuTopology>;

    fn fs_capacity(&self, path: &Path) -> Result<FsCapacity>;

    /// Interface names in kernel index order.
    fn interfaces(&self) -> Result<Vec<String>>;

    /// Textual addresses bound to `iface`; IPv6 may carry a `%zone` suffix.
    fn interface_addresses(&self, iface: &str) -> Result<Vec<String>>;

    /// Cumulative interface statistic, e.g. `rx_bytes`.
    fn interface_counter(&self, iface: &str, counter: &str) -> Result<u64>;

    /// Live process IDs.
    fn pids(&self) -> Result<Vec<u32>>;

    /// Contents of a per-process file (`comm`, `stat`, `status`, `io`, `cmdline`).
    fn process_file(&self, pid: u32, file: &str) -> Result<String>;

    /// Kernel clock ticks per second used by per-process CPU times.
    fn clock_ticks_per_sec(&self) -> u64;
}
