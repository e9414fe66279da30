//! Linux implementation of [`SystemSource`] over procfs and sysfs.

use super::{CpuTopology, FsCapacity, SystemSource};
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::ffi::{CStr, CString};
use std::fs;
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

/// Reads counters from a procfs and a sysfs mount.
#[derive(Debug, Clone)]
pub struct ProcFs {
    proc_root: PathBuf,
    sys_root: PathBuf,
    clock_ticks: u64,
}

impl ProcFs {
    pub fn new(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
            clock_ticks: if ticks > 0 { ticks as u64 } else { 100 },
        }
    }

    fn read_proc(&self, name: &str) -> Result<String> {
        let path = self.proc_root.join(name);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn net_class(&self) -> PathBuf {
        self.sys_root.join("class").join("net")
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc", "/sys")
    }
}

impl SystemSource for ProcFs {
    fn cpu_stat(&self) -> Result<String> {
        self.read_proc("stat")
    }

    fn meminfo(&self) -> Result<String> {
        self.read_proc("meminfo")
    }

    fn diskstats(&self) -> Result<String> {
        self.read_proc("diskstats")
    }

    fn uptime_secs(&self) -> Result<f64> {
        let content = self.read_proc("uptime")?;
        content
            .split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .context("Invalid uptime format")
    }

    fn cpu_topology(&self) -> Result<CpuTopology> {
        parse_cpuinfo(&self.read_proc("cpuinfo")?)
    }

    fn fs_capacity(&self, path: &Path) -> Result<FsCapacity> {
        let c_path = CString::new(path.to_string_lossy().as_bytes())
            .context("Path contains a NUL byte")?;
        let mut statvfs = MaybeUninit::<libc::statvfs>::uninit();

        let result = unsafe { libc::statvfs(c_path.as_ptr(), statvfs.as_mut_ptr()) };
        if result != 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("statvfs failed for {}", path.display()));
        }

        let statvfs = unsafe { statvfs.assume_init() };
        let block_size = statvfs.f_frsize as u64;
        Ok(FsCapacity {
            total_bytes: statvfs.f_blocks as u64 * block_size,
            available_bytes: statvfs.f_bavail as u64 * block_size,
        })
    }

    fn interfaces(&self) -> Result<Vec<String>> {
        let dir = self.net_class();
        let entries =
            fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))?;

        let mut indexed: Vec<(u32, String)> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let index = fs::read_to_string(entry.path().join("ifindex"))
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(u32::MAX);
                Some((index, name))
            })
            .collect();
        indexed.sort();

        Ok(indexed.into_iter().map(|(_, name)| name).collect())
    }

    fn interface_addresses(&self, iface: &str) -> Result<Vec<String>> {
        let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
        if unsafe { libc::getifaddrs(&mut head) } != 0 {
            return Err(std::io::Error::last_os_error()).context("getifaddrs failed");
        }

        let mut addresses = Vec::new();
        let mut cursor = head;
        while !cursor.is_null() {
            let entry = unsafe { &*cursor };
            cursor = entry.ifa_next;

            if entry.ifa_addr.is_null() || entry.ifa_name.is_null() {
                continue;
            }
            let name = unsafe { CStr::from_ptr(entry.ifa_name) }.to_string_lossy();
            if name != iface {
                continue;
            }

            let family = unsafe { (*entry.ifa_addr).sa_family } as i32;
            match family {
                libc::AF_INET => {
                    let sin = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in) };
                    let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
                    addresses.push(ip.to_string());
                }
                libc::AF_INET6 => {
                    let sin6 = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in6) };
                    let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                    if sin6.sin6_scope_id != 0 {
                        addresses.push(format!("{}%{}", ip, iface));
                    } else {
                        addresses.push(ip.to_string());
                    }
                }
                _ => {}
            }
        }

        unsafe { libc::freeifaddrs(head) };
        Ok(addresses)
    }

    fn interface_counter(&self, iface: &str, counter: &str) -> Result<u64> {
        let path = self.net_class().join(iface).join("statistics").join(counter);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        content
            .trim()
            .parse()
            .with_context(|| format!("Invalid counter in {}", path.display()))
    }

    fn pids(&self) -> Result<Vec<u32>> {
        let entries = fs::read_dir(&self.proc_root)
            .with_context(|| format!("Failed to list {}", self.proc_root.display()))?;

        Ok(entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .collect())
    }

    fn process_file(&self, pid: u32, file: &str) -> Result<String> {
        let path = self.proc_root.join(pid.to_string()).join(file);
        // cmdline is NUL separated and not guaranteed to be UTF-8
        let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn clock_ticks_per_sec(&self) -> u64 {
        self.clock_ticks
    }
}

/// Derive socket/core/thread layout from `/proc/cpuinfo`.
pub fn parse_cpuinfo(content: &str) -> Result<CpuTopology> {
    let mut model_name: Option<String> = None;
    let mut physical_ids: BTreeSet<String> = BTreeSet::new();
    let mut cpu_cores: Option<u32> = None;
    let mut siblings: Option<u32> = None;
    let mut processors: u32 = 0;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "processor" => processors += 1,
            "model name" | "Model" if model_name.is_none() => {
                model_name = Some(value.to_string());
            }
            "physical id" => {
                physical_ids.insert(value.to_string());
            }
            "cpu cores" if cpu_cores.is_none() => cpu_cores = value.parse().ok(),
            "siblings" if siblings.is_none() => siblings = value.parse().ok(),
            _ => {}
        }
    }

    if processors == 0 {
        bail!("No processor entries in cpuinfo");
    }

    let sockets = (physical_ids.len() as u32).max(1);
    let (cores_per_socket, threads_per_core) = match (cpu_cores, siblings) {
        (Some(cores), Some(sibs)) if cores > 0 && sibs >= cores => (cores, sibs / cores),
        (Some(cores), _) if cores > 0 => (cores, 1),
        _ => ((processors / sockets).max(1), 1),
    };

    Ok(CpuTopology {
        model_name: model_name.unwrap_or_else(|| "Unknown".to_string()),
        sockets,
        cores_per_socket,
        threads_per_core,
    })
}
