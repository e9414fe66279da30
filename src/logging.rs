//! Event output for the driver: JSON Lines or human-readable text.

use crate::event::SamplerEvent;
use crate::format::{format_bytes, format_throughput, truncate_str};
use crate::metrics::{CpuUpdate, DiskUpdate, InterfaceInfo, MemoryUpdate};
use crate::process::ProcessBatch;
use anyhow::{Context, Result};
use std::io::Write;

/// How events are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One serialized event per line
    Json,
    /// Timestamped summary lines
    Text,
}

/// Writes sampler events to any `io::Write`
pub struct EventWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    /// Processes listed per batch in text mode; 0 hides batches
    top: usize,
    last_interface: Option<InterfaceInfo>,
    events_written: u64,
}

impl<W: Write> EventWriter<W> {
    pub fn new(writer: W, format: OutputFormat, top: usize) -> Self {
        Self {
            writer,
            format,
            top,
            last_interface: None,
            events_written: 0,
        }
    }

    /// Render one event and flush, so output is visible per tick.
    pub fn write(&mut self, event: &SamplerEvent) -> Result<()> {
        let wrote = match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string(event).context("Failed to serialize event")?;
                writeln!(self.writer, "{}", json)?;
                true
            }
            OutputFormat::Text => self.write_text(event)?,
        };

        if wrote {
            self.events_written += 1;
            self.writer.flush()?;
        }
        Ok(())
    }

    fn write_text(&mut self, event: &SamplerEvent) -> Result<bool> {
        match event {
            SamplerEvent::Cpu(cpu) => writeln!(self.writer, "{}", cpu_line(cpu))?,
            SamplerEvent::Memory(mem) => writeln!(self.writer, "{}", memory_line(mem))?,
            SamplerEvent::Disk(disk) => writeln!(self.writer, "{}", disk_line(disk))?,
            SamplerEvent::Interface(info) => {
                // Interface identity is republished every tick; only print changes
                if self.last_interface.as_ref() == Some(info) {
                    return Ok(false);
                }
                writeln!(self.writer, "{}", interface_line(info))?;
                self.last_interface = Some(info.clone());
            }
            SamplerEvent::Network(net) => writeln!(
                self.writer,
                "[{}] net    {} {}",
                net.timestamp.format("%H:%M:%S"),
                net.interface,
                net.summary()
            )?,
            SamplerEvent::Processes(batch) => {
                if self.top == 0 {
                    return Ok(false);
                }
                self.write_processes(batch)?;
            }
        }
        Ok(true)
    }

    fn write_processes(&mut self, batch: &ProcessBatch) -> Result<()> {
        writeln!(
            self.writer,
            "[{}] procs  {} running, top {} by CPU:",
            batch.timestamp.format("%H:%M:%S"),
            batch.processes.len(),
            self.top.min(batch.processes.len())
        )?;

        let mut busiest: Vec<_> = batch.processes.iter().collect();
        busiest.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent).then(a.pid.cmp(&b.pid)));

        for proc in busiest.into_iter().take(self.top) {
            writeln!(
                self.writer,
                "  {:>7} {:<16} {:>5.1}% {:>10} R {:>10} W {:>10}",
                proc.pid,
                truncate_str(&proc.name, 16),
                proc.cpu_percent,
                format_bytes(proc.resident_bytes),
                format_bytes(proc.bytes_read),
                format_bytes(proc.bytes_written),
            )?;
        }
        Ok(())
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn cpu_line(cpu: &CpuUpdate) -> String {
    format!(
        "[{}] cpu    {} | {} ({} CPUs) | {} processes, {} threads | up {}",
        cpu.timestamp.format("%H:%M:%S"),
        cpu.summary(),
        cpu.model_name,
        cpu.logical_processors,
        cpu.process_count,
        cpu.thread_count,
        cpu.uptime
    )
}

fn memory_line(mem: &MemoryUpdate) -> String {
    format!(
        "[{}] mem    {} ({:.1}%) | available {} | cached {}",
        mem.timestamp.format("%H:%M:%S"),
        mem.summary(),
        mem.used_percent,
        format_bytes(mem.available),
        format_bytes(mem.cached)
    )
}

fn disk_line(disk: &DiskUpdate) -> String {
    format!(
        "[{}] disk   {} R {} W {} | {:.1} r/s {:.1} w/s | {} free of {}",
        disk.timestamp.format("%H:%M:%S"),
        disk.device,
        format_throughput(disk.read_bytes_per_sec),
        format_throughput(disk.write_bytes_per_sec),
        disk.read_iops,
        disk.write_iops,
        format_bytes(disk.available_space_bytes),
        format_bytes(disk.total_space_bytes)
    )
}

fn interface_line(info: &InterfaceInfo) -> String {
    let ipv4 = info.ipv4.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string());
    let ipv6 = info.ipv6.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string());
    format!("iface  {} ({}) IPv4 {} IPv6 {}", info.name, info.connection_type, ipv4, ipv6)
}
