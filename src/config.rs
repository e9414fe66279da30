//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default number of samples kept per chart (one minute at 1 Hz).
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// Which block device the disk sampler follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DiskSelector {
    /// First row that is a whole disk (not a partition, loop, ram or dm node)
    #[default]
    FirstWholeDevice,
    /// Exact device name, e.g. "vda" or "nvme0n1"
    Named(String),
}

impl DiskSelector {
    pub fn matches(&self, device: &str) -> bool {
        match self {
            DiskSelector::FirstWholeDevice => is_whole_device(device),
            DiskSelector::Named(name) => device == name,
        }
    }
}

impl fmt::Display for DiskSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskSelector::FirstWholeDevice => write!(f, "first whole device"),
            DiskSelector::Named(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for DiskSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            Ok(DiskSelector::FirstWholeDevice)
        } else {
            Ok(DiskSelector::Named(s.to_string()))
        }
    }
}

/// True for whole disks, false for partitions and virtual block nodes.
fn is_whole_device(device: &str) -> bool {
    if device.is_empty()
        || device.starts_with("loop")
        || device.starts_with("ram")
        || device.starts_with("dm-")
    {
        return false;
    }

    let ends_with_digit = device
        .chars()
        .last()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false);

    // nvme0n1 is a disk, nvme0n1p2 is a partition
    if device.starts_with("nvme") || device.starts_with("mmcblk") {
        !(device.contains('p') && ends_with_digit)
    } else {
        !ends_with_digit
    }
}

/// Settings shared by every sampler in an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tick period for CPU, memory, disk and network samplers
    pub interval: Duration,
    /// Tick period for the process sampler
    pub process_interval: Duration,
    /// Samples retained per chart
    pub history_capacity: usize,
    pub disk: DiskSelector,
    /// Mount point of procfs
    pub proc_root: PathBuf,
    /// Mount point of sysfs
    pub sys_root: PathBuf,
    /// Buffered events per subscriber before it starts lagging
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            process_interval: Duration::from_secs(1),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            disk: DiskSelector::default(),
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
            channel_capacity: 64,
        }
    }
}
