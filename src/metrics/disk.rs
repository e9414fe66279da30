//! Disk I/O metrics from /proc/diskstats for a single block device.

use crate::config::DiskSelector;
use crate::engine::Sampler;
use crate::error::{SampleError, SampleResult};
use crate::event::SamplerEvent;
use crate::format::{format_bytes, format_throughput};
use crate::history::{ChartSnapshot, ScaledHistory};
use crate::source::{FsCapacity, SystemSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// diskstats always reports 512-byte sectors regardless of the device
pub const SECTOR_SIZE: u64 = 512;

/// Charts never zoom in below 1 MiB/s
const CHART_FLOOR_BYTES_PER_SEC: f64 = 1024.0 * 1024.0;

/// Cumulative counters for one diskstats row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskCounters {
    pub device: String,
    pub reads_completed: u64,
    pub sectors_read: u64,
    pub writes_completed: u64,
    pub sectors_written: u64,
}

/// Published disk state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskUpdate {
    pub timestamp: DateTime<Utc>,
    /// Device name (e.g., "sda", "nvme0n1")
    pub device: String,
    /// Total reads completed since boot
    pub reads_completed: u64,
    /// Total writes completed since boot
    pub writes_completed: u64,
    /// Reads completed per second over the last tick
    pub read_iops: f64,
    /// Writes completed per second over the last tick
    pub write_iops: f64,
    /// Read throughput in bytes per second
    pub read_bytes_per_sec: f64,
    /// Write throughput in bytes per second
    pub write_bytes_per_sec: f64,
    /// Root filesystem size in bytes
    pub total_space_bytes: u64,
    /// Root filesystem space available to unprivileged users in bytes
    pub available_space_bytes: u64,
    pub read_chart: ChartSnapshot,
    pub write_chart: ChartSnapshot,
}

impl DiskUpdate {
    pub fn summary(&self) -> String {
        format!(
            "Reads Completed: {} Writes Completed: {}\n\
             Read Throughput: {} Write Throughput: {}\n\
             Available Disk Space: {}\n\
             Total Disk Space: {}",
            self.reads_completed,
            self.writes_completed,
            format_throughput(self.read_bytes_per_sec),
            format_throughput(self.write_bytes_per_sec),
            format_bytes(self.available_space_bytes),
            format_bytes(self.total_space_bytes),
        )
    }
}

/// Disk sampler with state for rate calculations
pub struct DiskSampler {
    source: Arc<dyn SystemSource>,
    selector: DiskSelector,
    capacity: FsCapacity,
    prev: Option<(DiskCounters, Instant)>,
    read_history: ScaledHistory,
    write_history: ScaledHistory,
}

impl DiskSampler {
    pub fn new(source: Arc<dyn SystemSource>, selector: DiskSelector, history_capacity: usize) -> Self {
        let capacity = match source.fs_capacity(Path::new("/")) {
            Ok(capacity) => capacity,
            Err(e) => {
                warn!("Root filesystem capacity unavailable: {:#}", e);
                FsCapacity::default()
            }
        };
        info!("Disk sampler following {}", selector);

        Self {
            source,
            selector,
            capacity,
            prev: None,
            read_history: ScaledHistory::new(history_capacity, 0.0, CHART_FLOOR_BYTES_PER_SEC),
            write_history: ScaledHistory::new(history_capacity, 0.0, CHART_FLOOR_BYTES_PER_SEC),
        }
    }

    pub fn capacity(&self) -> FsCapacity {
        self.capacity
    }

    pub fn read_history(&self) -> &ScaledHistory {
        &self.read_history
    }

    pub fn write_history(&self) -> &ScaledHistory {
        &self.write_history
    }

    /// Read counters and derive rates; `None` on the baseline tick.
    pub fn collect(&mut self, now: Instant) -> SampleResult<Option<DiskUpdate>> {
        let content = self
            .source
            .diskstats()
            .map_err(|e| SampleError::unavailable("diskstats", e))?;
        let counters = find_device(&content, &self.selector)?;

        // A different device (hot-plug under the auto policy) starts a new baseline
        let Some((prev, prev_time)) = self
            .prev
            .take()
            .filter(|(prev, _)| prev.device == counters.device)
        else {
            self.prev = Some((counters, now));
            return Ok(None);
        };

        let elapsed = now.saturating_duration_since(prev_time).as_secs_f64();
        if elapsed <= 0.0 {
            self.prev = Some((prev, prev_time));
            return Err(SampleError::ZeroElapsedTime);
        }

        let sectors_read_delta = counters.sectors_read.saturating_sub(prev.sectors_read);
        let sectors_written_delta = counters.sectors_written.saturating_sub(prev.sectors_written);
        let reads_delta = counters.reads_completed.saturating_sub(prev.reads_completed);
        let writes_delta = counters.writes_completed.saturating_sub(prev.writes_completed);

        let read_bytes_per_sec = (sectors_read_delta * SECTOR_SIZE) as f64 / elapsed;
        let write_bytes_per_sec = (sectors_written_delta * SECTOR_SIZE) as f64 / elapsed;

        self.read_history.push(read_bytes_per_sec);
        self.read_history.fit_to_peak(CHART_FLOOR_BYTES_PER_SEC);
        self.write_history.push(write_bytes_per_sec);
        self.write_history.fit_to_peak(CHART_FLOOR_BYTES_PER_SEC);

        let update = DiskUpdate {
            timestamp: Utc::now(),
            device: counters.device.clone(),
            reads_completed: counters.reads_completed,
            writes_completed: counters.writes_completed,
            read_iops: reads_delta as f64 / elapsed,
            write_iops: writes_delta as f64 / elapsed,
            read_bytes_per_sec,
            write_bytes_per_sec,
            total_space_bytes: self.capacity.total_bytes,
            available_space_bytes: self.capacity.available_bytes,
            read_chart: self.read_history.snapshot("B/s"),
            write_chart: self.write_history.snapshot("B/s"),
        };

        self.prev = Some((counters, now));
        Ok(Some(update))
    }
}

impl Sampler for DiskSampler {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn sample(&mut self, at: Instant) -> SampleResult<Vec<SamplerEvent>> {
        Ok(self.collect(at)?.map(SamplerEvent::Disk).into_iter().collect())
    }
}

/// Locate the first diskstats row accepted by `selector`.
pub fn find_device(content: &str, selector: &DiskSelector) -> SampleResult<DiskCounters> {
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 || !selector.matches(parts[2]) {
            continue;
        }

        let field = |idx: usize| -> SampleResult<u64> {
            parts[idx].parse().map_err(|_| {
                SampleError::malformed(format!("diskstats column {} for {}", idx, parts[2]))
            })
        };

        return Ok(DiskCounters {
            device: parts[2].to_string(),
            reads_completed: field(3)?,
            sectors_read: field(5)?,
            writes_completed: field(7)?,
            sectors_written: field(9)?,
        });
    }

    Err(SampleError::malformed(format!("no block device matching {}", selector)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fake::FakeSource;
    use std::time::Duration;

    fn diskstats(reads: u64, sectors_read: u64, writes: u64, sectors_written: u64) -> String {
        format!(
            "   7       0 loop0 10 0 80 0 0 0 0 0 0 0 0 0 0\n\
             \x20 8       0 sda {reads} 0 {sectors_read} 100 {writes} 0 {sectors_written} 200 0 300 300 0 0\n\
             \x20 8       1 sda1 5 0 40 0 1 0 8 0 0 0 0 0 0\n"
        )
    }

    fn sampler(source: &Arc<FakeSource>) -> DiskSampler {
        source.set_capacity(FsCapacity {
            total_bytes: 100 * 1024 * 1024 * 1024,
            available_bytes: 40 * 1024 * 1024 * 1024,
        });
        DiskSampler::new(source.clone(), DiskSelector::FirstWholeDevice, 60)
    }

    #[test]
    fn test_find_device_skips_partitions_and_loops() {
        let counters = find_device(&diskstats(1, 2, 3, 4), &DiskSelector::FirstWholeDevice).unwrap();
        assert_eq!(counters.device, "sda");
        assert_eq!(counters.reads_completed, 1);
        assert_eq!(counters.sectors_read, 2);
        assert_eq!(counters.writes_completed, 3);
        assert_eq!(counters.sectors_written, 4);
    }

    #[test]
    fn test_find_device_by_name() {
        let selector = DiskSelector::Named("sda1".to_string());
        let counters = find_device(&diskstats(1, 2, 3, 4), &selector).unwrap();
        assert_eq!(counters.device, "sda1");
        assert_eq!(counters.sectors_read, 40);
    }

    #[test]
    fn test_find_device_missing() {
        let selector = DiskSelector::Named("vda".to_string());
        let err = find_device(&diskstats(1, 2, 3, 4), &selector).unwrap_err();
        assert!(matches!(err, SampleError::MalformedSample(_)));
    }

    #[test]
    fn test_first_tick_is_baseline() {
        let source = Arc::new(FakeSource::new());
        source.set_diskstats(&diskstats(10, 1000, 5, 500));
        let mut disk = sampler(&source);

        assert!(disk.sample(Instant::now()).unwrap().is_empty());
        assert!(disk.prev.is_some());
    }

    #[test]
    fn test_throughput_uses_elapsed_time() {
        let source = Arc::new(FakeSource::new());
        source.set_diskstats(&diskstats(10, 1000, 5, 500));
        let mut disk = sampler(&source);
        let start = Instant::now();
        disk.collect(start).unwrap();

        source.set_diskstats(&diskstats(30, 1100, 9, 700));
        let update = disk.collect(start + Duration::from_secs(2)).unwrap().unwrap();

        assert_eq!(update.read_bytes_per_sec, 25_600.0);
        assert_eq!(update.write_bytes_per_sec, 51_200.0);
        assert_eq!(update.read_iops, 10.0);
        assert_eq!(update.write_iops, 2.0);
        assert_eq!(update.reads_completed, 30);
        assert_eq!(update.writes_completed, 9);
        assert_eq!(update.total_space_bytes, 100 * 1024 * 1024 * 1024);
        assert_eq!(update.read_chart.raw, vec![25_600.0]);
        assert!(update.summary().contains("Reads Completed: 30 Writes Completed: 9"));
    }

    #[test]
    fn test_zero_elapsed_keeps_baseline() {
        let source = Arc::new(FakeSource::new());
        source.set_diskstats(&diskstats(10, 1000, 5, 500));
        let mut disk = sampler(&source);
        let start = Instant::now();
        disk.collect(start).unwrap();

        source.set_diskstats(&diskstats(20, 1200, 5, 500));
        let err = disk.collect(start).unwrap_err();
        assert!(matches!(err, SampleError::ZeroElapsedTime));

        let update = disk.collect(start + Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(update.read_bytes_per_sec, 200.0 * 512.0);
    }

    #[test]
    fn test_capacity_failure_degrades_to_zero() {
        let source = Arc::new(FakeSource::new());
        let disk = DiskSampler::new(source, DiskSelector::FirstWholeDevice, 60);
        assert_eq!(disk.capacity(), FsCapacity::default());
    }
}
