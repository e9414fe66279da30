//! Per-process metrics from /proc/[pid]/ files.

use crate::engine::Sampler;
use crate::error::{SampleError, SampleResult};
use crate::event::SamplerEvent;
use crate::source::SystemSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// One process as seen on one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    /// Short command name
    pub name: String,
    /// Share of all logical processors since the previous tick
    pub cpu_percent: f64,
    /// Resident Set Size in bytes
    pub resident_bytes: u64,
    /// Resident Set Size in MB
    pub memory_mb: f64,
    /// Bytes fetched from storage since process start
    pub bytes_read: u64,
    /// Bytes sent to storage since process start
    pub bytes_written: u64,
}

/// All live processes from one tick, sorted by PID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessBatch {
    pub timestamp: DateTime<Utc>,
    pub processes: Vec<ProcessRecord>,
}

/// Raw per-process counters read on one tick
#[derive(Debug, Clone, PartialEq)]
struct ProcessSnapshot {
    name: String,
    utime: u64,
    stime: u64,
    resident_bytes: u64,
    bytes_read: u64,
    bytes_written: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CpuBaseline {
    utime: u64,
    stime: u64,
    uptime_secs: f64,
}

impl CpuBaseline {
    fn cpu_ticks(&self) -> u64 {
        self.utime + self.stime
    }
}

/// Process sampler with per-PID CPU baselines
pub struct ProcessSampler {
    source: Arc<dyn SystemSource>,
    baselines: HashMap<u32, CpuBaseline>,
    logical_processors: u32,
    clock_ticks: u64,
}

impl ProcessSampler {
    pub fn new(source: Arc<dyn SystemSource>) -> Self {
        let logical_processors = match source.cpu_topology() {
            Ok(topology) => topology.logical_processors(),
            Err(e) => {
                let fallback = std::thread::available_parallelism()
                    .map(|n| n.get() as u32)
                    .unwrap_or(1);
                warn!("CPU topology unavailable, assuming {} CPUs: {:#}", fallback, e);
                fallback
            }
        };
        let clock_ticks = source.clock_ticks_per_sec().max(1);

        Self {
            source,
            baselines: HashMap::new(),
            logical_processors,
            clock_ticks,
        }
    }

    /// Number of PIDs with a stored CPU baseline.
    pub fn tracked_pids(&self) -> usize {
        self.baselines.len()
    }

    /// Enumerate every live process and build this tick's batch.
    pub fn collect(&mut self) -> SampleResult<ProcessBatch> {
        let uptime_secs = self
            .source
            .uptime_secs()
            .map_err(|e| SampleError::unavailable("uptime", e))?;
        let pids = self
            .source
            .pids()
            .map_err(|e| SampleError::unavailable("process listing", e))?;

        let mut baselines = HashMap::with_capacity(pids.len());
        let mut processes = Vec::with_capacity(pids.len());

        for pid in pids {
            let Some(snapshot) = read_process(self.source.as_ref(), pid) else {
                continue;
            };

            let current = CpuBaseline {
                utime: snapshot.utime,
                stime: snapshot.stime,
                uptime_secs,
            };

            let (cpu, baseline) = match self.baselines.get(&pid) {
                // Counters going backwards means the PID was reused
                Some(prev) if current.cpu_ticks() >= prev.cpu_ticks() => {
                    let wall_secs = uptime_secs - prev.uptime_secs;
                    if wall_secs > 0.0 {
                        let cpu = cpu_percent(
                            current.cpu_ticks() - prev.cpu_ticks(),
                            self.clock_ticks,
                            wall_secs,
                            self.logical_processors,
                        );
                        (cpu, current)
                    } else {
                        (0.0, *prev)
                    }
                }
                _ => (0.0, current),
            };
            baselines.insert(pid, baseline);

            processes.push(ProcessRecord {
                pid,
                name: snapshot.name,
                cpu_percent: cpu,
                resident_bytes: snapshot.resident_bytes,
                memory_mb: snapshot.resident_bytes as f64 / (1024.0 * 1024.0),
                bytes_read: snapshot.bytes_read,
                bytes_written: snapshot.bytes_written,
            });
        }

        // Only PIDs seen this tick keep a baseline
        self.baselines = baselines;
        processes.sort_by_key(|p| p.pid);

        Ok(ProcessBatch {
            timestamp: Utc::now(),
            processes,
        })
    }
}

impl Sampler for ProcessSampler {
    fn name(&self) -> &'static str {
        "processes"
    }

    fn sample(&mut self, _at: Instant) -> SampleResult<Vec<SamplerEvent>> {
        Ok(vec![SamplerEvent::Processes(self.collect()?)])
    }
}

/// CPU share of `cpu_ticks` over `wall_secs`, normalized across all logical processors.
pub fn cpu_percent(cpu_ticks: u64, clock_ticks: u64, wall_secs: f64, logical_processors: u32) -> f64 {
    if wall_secs <= 0.0 || clock_ticks == 0 || logical_processors == 0 {
        return 0.0;
    }
    100.0 * cpu_ticks as f64 / (clock_ticks as f64 * wall_secs * logical_processors as f64)
}

/// Read one process; `None` for kernel threads, zombies, or PIDs that just exited.
fn read_process(source: &dyn SystemSource, pid: u32) -> Option<ProcessSnapshot> {
    let cmdline = source.process_file(pid, "cmdline").ok()?;
    if cmdline.trim_matches(|c: char| c == '\0' || c.is_whitespace()).is_empty() {
        return None;
    }

    let stat = match source.process_file(pid, "stat") {
        Ok(stat) => stat,
        Err(e) => {
            debug!("Process {} vanished: {:#}", pid, e);
            return None;
        }
    };
    let (stat_name, utime, stime) = parse_stat(&stat)?;

    let name = source
        .process_file(pid, "comm")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or(stat_name);

    let resident_bytes = source
        .process_file(pid, "status")
        .map(|status| parse_vm_rss(&status))
        .unwrap_or(0);

    // /proc/[pid]/io needs ptrace access for other users' processes
    let (bytes_read, bytes_written) = source
        .process_file(pid, "io")
        .map(|io| parse_io(&io))
        .unwrap_or((0, 0));

    Some(ProcessSnapshot {
        name,
        utime,
        stime,
        resident_bytes,
        bytes_read,
        bytes_written,
    })
}

/// Extract `(comm, utime, stime)` from a stat line.
///
/// The comm field can contain spaces and parentheses, so fields are counted
/// from the last ')'. utime and stime are fields 14 and 15 overall.
fn parse_stat(stat: &str) -> Option<(String, u64, u64)> {
    let comm_start = stat.find('(')?;
    let comm_end = stat.rfind(')')?;
    if comm_end < comm_start {
        return None;
    }

    let name = stat[comm_start + 1..comm_end].to_string();
    let fields: Vec<&str> = stat.get(comm_end + 1..)?.split_whitespace().collect();

    let utime = fields.get(11)?.parse().ok()?;
    let stime = fields.get(12)?.parse().ok()?;
    Some((name, utime, stime))
}

/// Resident memory from the `VmRSS:` line, in bytes
fn parse_vm_rss(status: &str) -> u64 {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .and_then(|kb| kb.checked_mul(1024))
        .unwrap_or(0)
}

/// `(read_bytes, write_bytes)` from I/O accounting
fn parse_io(io: &str) -> (u64, u64) {
    let mut read_bytes: u64 = 0;
    let mut write_bytes: u64 = 0;

    for line in io.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let value: u64 = parts[1].parse().unwrap_or(0);

        match parts[0] {
            "read_bytes:" => read_bytes = value,
            "write_bytes:" => write_bytes = value,
            _ => {}
        }
    }

    (read_bytes, write_bytes)
}
