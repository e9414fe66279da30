//! System-wide samplers.

pub mod cpu;
pub mod disk;
pub mod memory;
pub mod network;

pub use cpu::{CpuSampler, CpuUpdate};
pub use disk::{DiskSampler, DiskUpdate};
pub use memory::{MemorySampler, MemoryUpdate};
pub use network::{InterfaceInfo, NetworkSampler, NetworkUpdate, RateUnit};
