//! Typed updates published by samplers.

use crate::metrics::{CpuUpdate, DiskUpdate, InterfaceInfo, MemoryUpdate, NetworkUpdate};
use crate::process::ProcessBatch;
use serde::{Deserialize, Serialize};

/// One immutable snapshot from one sampler tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplerEvent {
    Cpu(CpuUpdate),
    Memory(MemoryUpdate),
    Disk(DiskUpdate),
    Interface(InterfaceInfo),
    Network(NetworkUpdate),
    Processes(ProcessBatch),
}

impl SamplerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SamplerEvent::Cpu(_) => "cpu",
            SamplerEvent::Memory(_) => "memory",
            SamplerEvent::Disk(_) => "disk",
            SamplerEvent::Interface(_) => "interface",
            SamplerEvent::Network(_) => "network",
            SamplerEvent::Processes(_) => "processes",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ChartSnapshot, ScaledHistory};
    use crate::metrics::RateUnit;
    use crate::process::ProcessRecord;
    use chrono::Utc;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn chart(unit: &str) -> ChartSnapshot {
        let mut history = ScaledHistory::new(4, 0.0, 100.0);
        history.push(25.0);
        history.push(50.0);
        history.snapshot(unit)
    }

    fn every_variant() -> Vec<SamplerEvent> {
        let now = Utc::now();
        vec![
            SamplerEvent::Cpu(CpuUpdate {
                timestamp: now,
                usage_percent: 12.5,
                model_name: "Test CPU".to_string(),
                sockets: 1,
                cores_per_socket: 4,
                logical_processors: 8,
                process_count: 120,
                thread_count: 480,
                uptime: "01:02:05".to_string(),
                chart: chart("%"),
            }),
            SamplerEvent::Memory(MemoryUpdate {
                timestamp: now,
                total: 8192,
                used: 2048,
                available: 6144,
                free: 1024,
                buffers: 256,
                cached: 512,
                used_percent: 25.0,
                available_percent: 75.0,
                cached_percent: 6.25,
                chart: chart("B"),
            }),
            SamplerEvent::Disk(DiskUpdate {
                timestamp: now,
                device: "sda".to_string(),
                reads_completed: 10,
                writes_completed: 4,
                read_iops: 2.0,
                write_iops: 0.5,
                read_bytes_per_sec: 4096.0,
                write_bytes_per_sec: 1024.0,
                total_space_bytes: 1 << 30,
                available_space_bytes: 1 << 29,
                read_chart: chart("B/s"),
                write_chart: chart("B/s"),
            }),
            SamplerEvent::Interface(InterfaceInfo {
                name: "wlan0".to_string(),
                connection_type: "Wireless".to_string(),
                ipv4: Some(Ipv4Addr::new(192, 168, 1, 20)),
                ipv6: Some(Ipv6Addr::LOCALHOST),
            }),
            SamplerEvent::Network(NetworkUpdate {
                timestamp: now,
                interface: "wlan0".to_string(),
                rx_value: 1.5,
                rx_unit: RateUnit::Mega,
                tx_value: 12.0,
                tx_unit: RateUnit::Kilo,
                rx_bytes_per_sec: 1_500_000.0,
                tx_bytes_per_sec: 12_000.0,
                rx_chart: chart("KB/s"),
                tx_chart: chart("KB/s"),
            }),
            SamplerEvent::Processes(ProcessBatch {
                timestamp: now,
                processes: vec![ProcessRecord {
                    pid: 42,
                    name: "compiler".to_string(),
                    cpu_percent: 80.0,
                    resident_bytes: 1024 * 1024,
                    memory_mb: 1.0,
                    bytes_read: 4096,
                    bytes_written: 0,
                }],
            }),
        ]
    }

    #[test]
    fn test_every_variant_round_trips() {
        let events = every_variant();
        assert_eq!(events.len(), 6);

        for event in events {
            let encoded = serde_json::to_value(&event).unwrap();
            assert_eq!(encoded["kind"], event.kind());

            let decoded: SamplerEvent = serde_json::from_value(encoded.clone()).unwrap();
            assert_eq!(decoded.kind(), event.kind());
            assert_eq!(serde_json::to_value(&decoded).unwrap(), encoded);
        }
    }

    #[test]
    fn test_interface_fields_do_not_collide_with_tag() {
        let event = SamplerEvent::Interface(InterfaceInfo {
            name: "eth0".to_string(),
            connection_type: "Ethernet".to_string(),
            ipv4: None,
            ipv6: None,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json.matches("\"kind\"").count(), 1, "{}", json);

        let decoded: SamplerEvent = serde_json::from_str(&json).unwrap();
        match decoded {
            SamplerEvent::Interface(info) => assert_eq!(info.connection_type, "Ethernet"),
            other => panic!("unexpected variant {}", other.kind()),
        }
    }
}
