//! Scripted in-memory counter source for tests.

use super::{CpuTopology, FsCapacity, SystemSource};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

#[derive(Default)]
struct FakeState {
    stat: Option<String>,
    meminfo: Option<String>,
    diskstats: Option<String>,
    uptime: Option<f64>,
    topology: Option<CpuTopology>,
    capacity: Option<FsCapacity>,
    interfaces: Vec<String>,
    addresses: HashMap<String, Vec<String>>,
    counters: HashMap<(String, String), u64>,
    processes: BTreeMap<u32, HashMap<String, String>>,
}

/// Scriptable counter source used in tests. Unset sources fail to read.
pub struct FakeSource {
    state: Mutex<FakeState>,
    clock_ticks: u64,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            clock_ticks: 100,
        }
    }

    fn with_state(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn set_stat(&self, content: &str) {
        self.with_state(|s| s.stat = Some(content.to_string()));
    }

    pub fn clear_stat(&self) {
        self.with_state(|s| s.stat = None);
    }

    pub fn set_meminfo(&self, content: &str) {
        self.with_state(|s| s.meminfo = Some(content.to_string()));
    }

    pub fn set_diskstats(&self, content: &str) {
        self.with_state(|s| s.diskstats = Some(content.to_string()));
    }

    pub fn set_uptime(&self, secs: f64) {
        self.with_state(|s| s.uptime = Some(secs));
    }

    pub fn clear_uptime(&self) {
        self.with_state(|s| s.uptime = None);
    }

    pub fn set_topology(&self, topology: CpuTopology) {
        self.with_state(|s| s.topology = Some(topology));
    }

    pub fn set_capacity(&self, capacity: FsCapacity) {
        self.with_state(|s| s.capacity = Some(capacity));
    }

    pub fn set_interfaces(&self, names: &[&str]) {
        self.with_state(|s| s.interfaces = names.iter().map(|n| n.to_string()).collect());
    }

    pub fn set_addresses(&self, iface: &str, addresses: &[&str]) {
        self.with_state(|s| {
            s.addresses.insert(
                iface.to_string(),
                addresses.iter().map(|a| a.to_string()).collect(),
            );
        });
    }

    pub fn set_counter(&self, iface: &str, counter: &str, value: u64) {
        self.with_state(|s| {
            s.counters
                .insert((iface.to_string(), counter.to_string()), value);
        });
    }

    pub fn set_process_file(&self, pid: u32, file: &str, content: &str) {
        self.with_state(|s| {
            s.processes
                .entry(pid)
                .or_default()
                .insert(file.to_string(), content.to_string());
        });
    }

    /// Register a process with the files the process sampler reads.
    pub fn add_process(&self, pid: u32, name: &str, utime: u64, stime: u64, rss_kb: u64) {
        let stat = format!(
            "{pid} ({name}) S 1 {pid} {pid} 0 -1 4194560 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 100 1000000 {rss} 18446744073709551615"
        , rss = rss_kb / 4);
        self.set_process_file(pid, "comm", &format!("{name}\n"));
        self.set_process_file(pid, "cmdline", &format!("/usr/bin/{name}\0--flag\0"));
        self.set_process_file(pid, "stat", &stat);
        self.set_process_file(
            pid,
            "status",
            &format!("Name:\t{name}\nVmRSS:\t{rss_kb} kB\nThreads:\t1\n"),
        );
    }

    pub fn remove_process(&self, pid: u32) {
        self.with_state(|s| {
            s.processes.remove(&pid);
        });
    }
}

impl Default for FakeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSource for FakeSource {
    fn cpu_stat(&self) -> Result<String> {
        self.state.lock().unwrap().stat.clone().ok_or_else(|| anyhow!("stat not set"))
    }

    fn meminfo(&self) -> Result<String> {
        self.state.lock().unwrap().meminfo.clone().ok_or_else(|| anyhow!("meminfo not set"))
    }

    fn diskstats(&self) -> Result<String> {
        self.state.lock().unwrap().diskstats.clone().ok_or_else(|| anyhow!("diskstats not set"))
    }

    fn uptime_secs(&self) -> Result<f64> {
        self.state.lock().unwrap().uptime.ok_or_else(|| anyhow!("uptime not set"))
    }

    fn cpu_topology(&self) -> Result<CpuTopology> {
        self.state.lock().unwrap().topology.clone().ok_or_else(|| anyhow!("topology not set"))
    }

    fn fs_capacity(&self, _path: &Path) -> Result<FsCapacity> {
        self.state.lock().unwrap().capacity.ok_or_else(|| anyhow!("capacity not set"))
    }

    fn interfaces(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().interfaces.clone())
    }

    fn interface_addresses(&self, iface: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .addresses
            .get(iface)
            .cloned()
            .unwrap_or_default())
    }

    fn interface_counter(&self, iface: &str, counter: &str) -> Result<u64> {
        self.state
            .lock()
            .unwrap()
            .counters
            .get(&(iface.to_string(), counter.to_string()))
            .copied()
            .ok_or_else(|| anyhow!("{iface}/{counter} not set"))
    }

    fn pids(&self) -> Result<Vec<u32>> {
        Ok(self.state.lock().unwrap().processes.keys().copied().collect())
    }

    fn process_file(&self, pid: u32, file: &str) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .processes
            .get(&pid)
            .and_then(|files| files.get(file))
            .cloned()
            .ok_or_else(|| anyhow!("/proc/{pid}/{file} not set"))
    }

    fn clock_ticks_per_sec(&self) -> u64 {
        self.clock_ticks
    }
}
