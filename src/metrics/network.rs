//! Network throughput for one interface from sysfs byte counters.

use crate::engine::Sampler;
use crate::error::{SampleError, SampleResult};
use crate::event::SamplerEvent;
use crate::history::{ChartSnapshot, ScaledHistory};
use crate::source::SystemSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const LOOPBACK: &str = "lo";

/// Display unit for a kilobyte-per-second rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateUnit {
    #[serde(rename = "KB")]
    Kilo,
    #[serde(rename = "MB")]
    Mega,
    #[serde(rename = "GB")]
    Giga,
}

impl RateUnit {
    /// Largest KB/s value the unit displays before switching up.
    pub fn ceiling(&self) -> f64 {
        match self {
            RateUnit::Kilo => 1_000.0,
            RateUnit::Mega => 1_000_000.0,
            RateUnit::Giga => 1_000_000_000.0,
        }
    }
}

impl fmt::Display for RateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateUnit::Kilo => write!(f, "KB"),
            RateUnit::Mega => write!(f, "MB"),
            RateUnit::Giga => write!(f, "GB"),
        }
    }
}

/// Scale a KB/s rate into the largest unit that keeps it at or above 1.
pub fn scale_rate(rate: f64) -> (f64, RateUnit) {
    if rate >= 1_000_000.0 {
        (rate / 1_000_000.0, RateUnit::Giga)
    } else if rate >= 1_000.0 {
        (rate / 1_000.0, RateUnit::Mega)
    } else {
        (rate, RateUnit::Kilo)
    }
}

/// Connection type guessed from predictable interface naming.
pub fn classify_interface(name: &str) -> &'static str {
    const PREFIXES: [(&str, &str); 6] = [
        ("enp", "Ethernet (PCIE)"),
        ("ens", "Ethernet (Hot-plug)"),
        ("eno", "Ethernet (Onboard)"),
        ("wl", "Wireless"),
        ("ww", "Cellular"),
        ("en", "Ethernet"),
    ];

    if is_loopback(name) {
        return "Loopback";
    }
    PREFIXES
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix))
        .map(|(_, kind)| *kind)
        .unwrap_or("Unknown")
}

pub fn is_loopback(name: &str) -> bool {
    name.starts_with(LOOPBACK)
}

/// First non-loopback interface, or loopback when nothing else exists.
pub fn select_interface(names: &[String]) -> String {
    names
        .iter()
        .find(|name| !is_loopback(name))
        .cloned()
        .unwrap_or_else(|| LOOPBACK.to_string())
}

/// Drop an IPv6 zone index such as `%eth0`.
pub fn strip_zone(addr: &str) -> &str {
    addr.split_once('%').map(|(ip, _)| ip).unwrap_or(addr)
}

/// Identity of the sampled interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    /// Connection type, e.g. "Wireless"
    pub connection_type: String,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

/// Published throughput for the sampled interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkUpdate {
    pub timestamp: DateTime<Utc>,
    pub interface: String,
    pub rx_value: f64,
    pub rx_unit: RateUnit,
    pub tx_value: f64,
    pub tx_unit: RateUnit,
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
    /// Receive history in KB/s
    pub rx_chart: ChartSnapshot,
    /// Transmit history in KB/s
    pub tx_chart: ChartSnapshot,
}

impl NetworkUpdate {
    pub fn summary(&self) -> String {
        format!(
            "Receive: {:.1} {}/s Send: {:.1} {}/s",
            self.rx_value, self.rx_unit, self.tx_value, self.tx_unit
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct ByteCounters {
    rx: u64,
    tx: u64,
    at: Instant,
}

/// One direction's chart plus the unit it is currently drawn in
struct DirectionChart {
    history: ScaledHistory,
    unit: RateUnit,
}

impl DirectionChart {
    fn new(capacity: usize) -> Self {
        Self {
            history: ScaledHistory::new(capacity, 0.0, RateUnit::Kilo.ceiling()),
            unit: RateUnit::Kilo,
        }
    }

    fn push(&mut self, kb_per_sec: f64, unit: RateUnit) {
        if unit != self.unit {
            self.unit = unit;
            self.history.set_range(0.0, unit.ceiling());
        }
        self.history.push(kb_per_sec);
    }
}

/// Network sampler bound to the interface chosen at construction
pub struct NetworkSampler {
    source: Arc<dyn SystemSource>,
    interface: String,
    prev: Option<ByteCounters>,
    rx: DirectionChart,
    tx: DirectionChart,
}

impl NetworkSampler {
    pub fn new(source: Arc<dyn SystemSource>, history_capacity: usize) -> Self {
        let interface = match source.interfaces() {
            Ok(names) => select_interface(&names),
            Err(e) => {
                warn!("Interface listing unavailable, using loopback: {:#}", e);
                LOOPBACK.to_string()
            }
        };
        info!("Network sampler following {}", interface);

        Self {
            source,
            interface,
            prev: None,
            rx: DirectionChart::new(history_capacity),
            tx: DirectionChart::new(history_capacity),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn rx_history(&self) -> &ScaledHistory {
        &self.rx.history
    }

    pub fn tx_history(&self) -> &ScaledHistory {
        &self.tx.history
    }

    /// Resolve the interface type and its current addresses.
    pub fn interface_info(&self) -> InterfaceInfo {
        let mut info = InterfaceInfo {
            name: self.interface.clone(),
            connection_type: classify_interface(&self.interface).to_string(),
            ipv4: None,
            ipv6: None,
        };

        let addresses = match self.source.interface_addresses(&self.interface) {
            Ok(addresses) => addresses,
            Err(e) => {
                debug!("Addresses for {} unavailable: {:#}", self.interface, e);
                return info;
            }
        };

        for addr in &addresses {
            match strip_zone(addr).parse::<IpAddr>() {
                Ok(IpAddr::V4(v4)) if info.ipv4.is_none() => info.ipv4 = Some(v4),
                Ok(IpAddr::V6(v6)) if info.ipv6.is_none() => info.ipv6 = Some(v6),
                _ => {}
            }
        }
        info
    }

    /// Read byte counters and derive rates; `None` on the baseline tick.
    pub fn collect(&mut self, now: Instant) -> SampleResult<Option<NetworkUpdate>> {
        let read = |counter: &str| {
            self.source
                .interface_counter(&self.interface, counter)
                .map_err(|e| SampleError::unavailable(format!("{} {}", self.interface, counter), e))
        };
        let current = ByteCounters {
            rx: read("rx_bytes")?,
            tx: read("tx_bytes")?,
            at: now,
        };

        let Some(prev) = self.prev else {
            self.prev = Some(current);
            return Ok(None);
        };

        let elapsed = now.saturating_duration_since(prev.at).as_secs_f64();
        if elapsed <= 0.0 {
            return Err(SampleError::ZeroElapsedTime);
        }
        self.prev = Some(current);

        let rx_bytes_per_sec = current.rx.saturating_sub(prev.rx) as f64 / elapsed;
        let tx_bytes_per_sec = current.tx.saturating_sub(prev.tx) as f64 / elapsed;
        let (rx_value, rx_unit) = scale_rate(rx_bytes_per_sec / 1000.0);
        let (tx_value, tx_unit) = scale_rate(tx_bytes_per_sec / 1000.0);

        self.rx.push(rx_bytes_per_sec / 1000.0, rx_unit);
        self.tx.push(tx_bytes_per_sec / 1000.0, tx_unit);

        Ok(Some(NetworkUpdate {
            timestamp: Utc::now(),
            interface: self.interface.clone(),
            rx_value,
            rx_unit,
            tx_value,
            tx_unit,
            rx_bytes_per_sec,
            tx_bytes_per_sec,
            rx_chart: self.rx.history.snapshot("KB/s"),
            tx_chart: self.tx.history.snapshot("KB/s"),
        }))
    }
}

impl Sampler for NetworkSampler {
    fn name(&self) -> &'static str {
        "network"
    }

    fn sample(&mut self, at: Instant) -> SampleResult<Vec<SamplerEvent>> {
        let mut events = vec![SamplerEvent::Interface(self.interface_info())];
        if let Some(update) = self.collect(at)? {
            events.push(SamplerEvent::Network(update));
        }
        Ok(events)
    }
}
