//! Memory usage from /proc/meminfo.

use crate::engine::Sampler;
use crate::error::{SampleError, SampleResult};
use crate::event::SamplerEvent;
use crate::history::{ChartSnapshot, ScaledHistory};
use crate::source::SystemSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Only the head of meminfo carries the fields we need.
const MEMINFO_SCAN_LINES: usize = 10;

/// Parsed meminfo fields in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total: Option<u64>,
    pub free: Option<u64>,
    pub available: Option<u64>,
    pub buffers: Option<u64>,
    pub cached: Option<u64>,
}

/// Published memory state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub timestamp: DateTime<Utc>,
    /// Total system RAM in bytes
    pub total: u64,
    /// total - available, in bytes
    pub used: u64,
    pub available: u64,
    pub free: u64,
    pub buffers: u64,
    /// File-backed page cache in bytes
    pub cached: u64,
    pub used_percent: f64,
    pub available_percent: f64,
    pub cached_percent: f64,
    pub chart: ChartSnapshot,
}

impl MemoryUpdate {
    pub fn summary(&self) -> String {
        const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
        format!(
            "Memory Used: {:.1} GB / {:.1} GB",
            self.used as f64 / GIB,
            self.total as f64 / GIB
        )
    }
}

/// Memory sampler; no deltas, only a chart whose range follows MemTotal
pub struct MemorySampler {
    source: Arc<dyn SystemSource>,
    history: ScaledHistory,
}

impl MemorySampler {
    pub fn new(source: Arc<dyn SystemSource>, history_capacity: usize) -> Self {
        Self {
            source,
            history: ScaledHistory::new(history_capacity, 0.0, 0.0),
        }
    }

    pub fn history(&self) -> &ScaledHistory {
        &self.history
    }

    /// Read and derive the current memory state.
    pub fn collect(&mut self) -> SampleResult<MemoryUpdate> {
        let content = self
            .source
            .meminfo()
            .map_err(|e| SampleError::unavailable("meminfo", e))?;
        let info = parse_meminfo(&content);

        let total = match info.total {
            Some(total) if total > 0 => total,
            _ => return Err(SampleError::malformed("MemTotal missing or zero")),
        };
        let free = info.free.unwrap_or(0);
        let buffers = info.buffers.unwrap_or(0);
        let cached = info.cached.unwrap_or(0);
        // Kernels before 3.14 have no MemAvailable
        let available = info
            .available
            .unwrap_or_else(|| (free + buffers + cached).min(total));
        let used = total.saturating_sub(available);

        if self.history.range() != (0.0, total as f64) {
            self.history.set_range(0.0, total as f64);
        }
        self.history.push(used as f64);

        let percent = |v: u64| 100.0 * v as f64 / total as f64;
        Ok(MemoryUpdate {
            timestamp: Utc::now(),
            total,
            used,
            available,
            free,
            buffers,
            cached,
            used_percent: percent(used),
            available_percent: percent(available),
            cached_percent: percent(cached),
            chart: self.history.snapshot("B"),
        })
    }
}

impl Sampler for MemorySampler {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn sample(&mut self, _at: Instant) -> SampleResult<Vec<SamplerEvent>> {
        Ok(vec![SamplerEvent::Memory(self.collect()?)])
    }
}

/// Parse the recognized keys from the first lines of meminfo.
///
/// The first occurrence of each key wins; values are kB and returned as bytes.
pub fn parse_meminfo(content: &str) -> MemInfo {
    let mut info = MemInfo::default();

    for line in content.lines().take(MEMINFO_SCAN_LINES) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let Ok(kb) = parts[1].parse::<u64>() else {
            continue;
        };
        // Values that do not fit in bytes are treated as unparsed
        let Some(bytes) = kb.checked_mul(1024) else {
            continue;
        };
        let value = Some(bytes);

        let slot = match parts[0] {
            "MemTotal:" => &mut info.total,
            "MemFree:" => &mut info.free,
            "MemAvailable:" => &mut info.available,
            "Buffers:" => &mut info.buffers,
            "Cached:" => &mut info.cached,
            _ => continue,
        };
        if slot.is_none() {
            *slot = value;
        }
    }

    info
}
