//! perfsampler - tick-driven Linux counter sampling.
//!
//! Independent samplers read cumulative OS counters (CPU, memory, one block
//! device, one network interface, every process), turn deltas into rates,
//! keep a bounded chart history per metric and publish immutable snapshots
//! on a broadcast channel. Presentation is left to subscribers.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod format;
pub mod history;
pub mod logging;
pub mod metrics;
pub mod process;
pub mod source;

pub use config::{DiskSelector, EngineConfig, DEFAULT_HISTORY_CAPACITY};
pub use engine::{Engine, EngineHandle, Sampler};
pub use error::{SampleError, SampleResult};
pub use event::SamplerEvent;
pub use history::{ChartSnapshot, RollingHistory, ScaledHistory};
pub use logging::{EventWriter, OutputFormat};
pub use process::{ProcessBatch, ProcessRecord, ProcessSampler};
pub use source::{ProcFs, SystemSource};
