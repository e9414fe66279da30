//! CPU utilization from /proc/stat, plus topology, task counts and uptime.

use crate::engine::Sampler;
use crate::error::{SampleError, SampleResult};
use crate::event::SamplerEvent;
use crate::format::format_uptime;
use crate::history::{ChartSnapshot, ScaledHistory};
use crate::source::{CpuTopology, SystemSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Raw CPU time values from the aggregate `cpu` line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user + self.nice + self.system + self.idle
    }
}

/// Published CPU state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuUpdate {
    pub timestamp: DateTime<Utc>,
    /// Busy share of all CPU time since the previous tick
    pub usage_percent: f64,
    pub model_name: String,
    pub sockets: u32,
    pub cores_per_socket: u32,
    pub logical_processors: u32,
    pub process_count: u64,
    pub thread_count: u64,
    /// `HH:MM:SS` since boot
    pub uptime: String,
    pub chart: ChartSnapshot,
}

impl CpuUpdate {
    pub fn summary(&self) -> String {
        format!("CPU Usage: {:.1}%", self.usage_percent)
    }
}

/// CPU sampler with state for delta calculations
pub struct CpuSampler {
    source: Arc<dyn SystemSource>,
    prev_times: Option<CpuTimes>,
    usage_percent: f64,
    topology: Option<CpuTopology>,
    process_count: u64,
    thread_count: u64,
    uptime: String,
    history: ScaledHistory,
}

impl CpuSampler {
    pub fn new(source: Arc<dyn SystemSource>, history_capacity: usize) -> Self {
        Self {
            source,
            prev_times: None,
            usage_percent: 0.0,
            topology: None,
            process_count: 0,
            thread_count: 0,
            uptime: format_uptime(0.0),
            history: ScaledHistory::new(history_capacity, 0.0, 100.0),
        }
    }

    pub fn usage_percent(&self) -> f64 {
        self.usage_percent
    }

    pub fn history(&self) -> &ScaledHistory {
        &self.history
    }

    /// Read the aggregate counters and update utilization.
    ///
    /// Returns `None` on the baseline tick.
    pub fn update_usage(&mut self) -> SampleResult<Option<f64>> {
        let stat = self
            .source
            .cpu_stat()
            .map_err(|e| SampleError::unavailable("cpu stat", e))?;
        let times = parse_cpu_line(stat.lines().next().unwrap_or_default())?;

        let Some(prev) = self.prev_times.replace(times) else {
            return Ok(None);
        };

        if let Some(usage) = calculate_utilization(&prev, &times) {
            self.usage_percent = usage;
        }
        Ok(Some(self.usage_percent))
    }

    fn refresh_system_info(&mut self) {
        if self.topology.is_none() {
            match self.source.cpu_topology() {
                Ok(topology) => self.topology = Some(topology),
                Err(e) => debug!("CPU topology unavailable: {:#}", e),
            }
        }

        match count_tasks(self.source.as_ref()) {
            Ok((processes, threads)) => {
                self.process_count = processes;
                self.thread_count = threads;
            }
            Err(e) => debug!("Process listing unavailable: {:#}", e),
        }

        match self.source.uptime_secs() {
            Ok(secs) => self.uptime = format_uptime(secs),
            Err(e) => debug!("Uptime unavailable: {:#}", e),
        }
    }

    fn snapshot(&self) -> CpuUpdate {
        let (model_name, sockets, cores_per_socket, logical_processors) = match &self.topology {
            Some(t) => (
                t.model_name.clone(),
                t.sockets,
                t.cores_per_socket,
                t.logical_processors(),
            ),
            None => ("Unknown".to_string(), 0, 0, 0),
        };

        CpuUpdate {
            timestamp: Utc::now(),
            usage_percent: self.usage_percent,
            model_name,
            sockets,
            cores_per_socket,
            logical_processors,
            process_count: self.process_count,
            thread_count: self.thread_count,
            uptime: self.uptime.clone(),
            chart: self.history.snapshot("%"),
        }
    }
}

impl Sampler for CpuSampler {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn sample(&mut self, _at: Instant) -> SampleResult<Vec<SamplerEvent>> {
        let usage = self.update_usage()?;
        self.refresh_system_info();

        match usage {
            Some(usage) => {
                self.history.push(usage);
                Ok(vec![SamplerEvent::Cpu(self.snapshot())])
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Parse `cpu user nice system idle ...`; only the first four counters matter.
pub fn parse_cpu_line(line: &str) -> SampleResult<CpuTimes> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some(label) if label.starts_with("cpu") => {}
        _ => return Err(SampleError::malformed("first stat line is not a cpu line")),
    }

    let values: Vec<u64> = parts
        .take(4)
        .map(|s| s.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|e| SampleError::malformed(format!("cpu counter: {}", e)))?;

    if values.len() < 4 {
        return Err(SampleError::malformed(format!(
            "cpu line has {} counters, need 4",
            values.len()
        )));
    }

    Ok(CpuTimes {
        user: values[0],
        nice: values[1],
        system: values[2],
        idle: values[3],
    })
}

/// Busy percentage between two readings; `None` when no ticks elapsed.
pub fn calculate_utilization(prev: &CpuTimes, curr: &CpuTimes) -> Option<f64> {
    let total_delta = curr.total().saturating_sub(prev.total());
    if total_delta == 0 {
        return None;
    }

    let idle_delta = curr.idle.saturating_sub(prev.idle).min(total_delta);
    Some(100.0 * (total_delta - idle_delta) as f64 / total_delta as f64)
}

/// Live process count and the sum of their thread-group sizes.
fn count_tasks(source: &dyn SystemSource) -> anyhow::Result<(u64, u64)> {
    let pids = source.pids()?;
    let mut threads: u64 = 0;

    for pid in &pids {
        // Processes may exit between listing and reading
        let Ok(status) = source.process_file(*pid, "status") else {
            continue;
        };
        threads += status
            .lines()
            .find_map(|line| line.strip_prefix("Threads:"))
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
    }

    Ok((pids.len() as u64, threads))
}
