//! Sampler scheduling and the event bus.
//!
//! Every sampler runs as its own task on its own interval and publishes
//! immutable snapshots on a broadcast channel. Samplers never share state, so
//! a slow or failing source only delays its own metric.

use crate::config::EngineConfig;
use crate::error::SampleResult;
use crate::event::SamplerEvent;
use crate::metrics::{CpuSampler, DiskSampler, MemorySampler, NetworkSampler};
use crate::process::ProcessSampler;
use crate::source::{ProcFs, SystemSource};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

/// A periodic poller with private previous-sample state.
pub trait Sampler: Send {
    fn name(&self) -> &'static str;

    /// Take one sample at `at`. An empty result is a baseline tick.
    fn sample(&mut self, at: Instant) -> SampleResult<Vec<SamplerEvent>>;
}

/// Builds samplers from a config and wires them to the event bus
pub struct Engine {
    config: EngineConfig,
    source: Arc<dyn SystemSource>,
    sender: Sender<SamplerEvent>,
}

impl Engine {
    pub fn new(config: EngineConfig, source: Arc<dyn SystemSource>) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            config,
            source,
            sender,
        }
    }

    /// Engine reading the live system through procfs and sysfs.
    pub fn with_procfs(config: EngineConfig) -> Self {
        let source = Arc::new(ProcFs::new(&config.proc_root, &config.sys_root));
        Self::new(config, source)
    }

    /// Subscribe before `start` to see the first tick's events.
    pub fn subscribe(&self) -> Receiver<SamplerEvent> {
        self.sender.subscribe()
    }

    fn samplers(&self) -> Vec<(Box<dyn Sampler>, Duration)> {
        let cap = self.config.history_capacity;
        let interval = self.config.interval;

        vec![
            (Box::new(CpuSampler::new(self.source.clone(), cap)) as Box<dyn Sampler>, interval),
            (Box::new(MemorySampler::new(self.source.clone(), cap)) as Box<dyn Sampler>, interval),
            (
                Box::new(DiskSampler::new(self.source.clone(), self.config.disk.clone(), cap))
                    as Box<dyn Sampler>,
                interval,
            ),
            (Box::new(NetworkSampler::new(self.source.clone(), cap)) as Box<dyn Sampler>, interval),
            (
                Box::new(ProcessSampler::new(self.source.clone())) as Box<dyn Sampler>,
                self.config.process_interval,
            ),
        ]
    }

    /// Spawn one task per sampler. Must be called inside a tokio runtime.
    pub fn start(self) -> EngineHandle {
        let tasks = self
            .samplers()
            .into_iter()
            .map(|(sampler, period)| spawn_sampler(sampler, period, self.sender.clone()))
            .collect();

        info!(
            "Sampling every {:?} (processes every {:?})",
            self.config.interval, self.config.process_interval
        );

        EngineHandle {
            tasks,
            sender: self.sender,
        }
    }
}

/// Running engine; dropping it stops every sampler
pub struct EngineHandle {
    tasks: Vec<JoinHandle<()>>,
    sender: Sender<SamplerEvent>,
}

impl EngineHandle {
    pub fn subscribe(&self) -> Receiver<SamplerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop all samplers and close the channel once they have exited.
    pub async fn shutdown(mut self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        debug!("All samplers stopped");
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Run `sampler` every `period`, publishing on `sender`.
pub fn spawn_sampler(
    mut sampler: Box<dyn Sampler>,
    period: Duration,
    sender: Sender<SamplerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match sampler.sample(Instant::now()) {
                Ok(events) if events.is_empty() => {
                    debug!("{}: baseline recorded", sampler.name());
                }
                Ok(events) => {
                    for event in events {
                        // No subscribers is not an error
                        let _ = sender.send(event);
                    }
                }
                Err(e) => {
                    debug!("{}: skipping tick: {}", sampler.name(), e);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SampleError;
    use crate::source::fake::FakeSource;
    use crate::source::{CpuTopology, FsCapacity};
    use std::collections::HashSet;
    use tokio::sync::broadcast::error::RecvError;

    fn scripted_source() -> Arc<FakeSource> {
        let source = Arc::new(FakeSource::new());
        source.set_stat("cpu  100 0 50 850 0 0 0 0 0 0\n");
        source.set_meminfo(
            "MemTotal:       8000000 kB\nMemFree:        1000000 kB\nMemAvailable:   4000000 kB\n\
             Buffers:         100000 kB\nCached:         2000000 kB\n",
        );
        source.set_diskstats("   8       0 sda 10 0 100 0 5 0 50 0 0 0 0 0 0\n");
        source.set_uptime(500.0);
        source.set_topology(CpuTopology {
            model_name: "Test CPU".to_string(),
            sockets: 1,
            cores_per_socket: 2,
            threads_per_core: 1,
        });
        source.set_capacity(FsCapacity {
            total_bytes: 1 << 30,
            available_bytes: 1 << 29,
        });
        source.set_interfaces(&["lo", "eth0"]);
        source.set_counter("eth0", "rx_bytes", 1000);
        source.set_counter("eth0", "tx_bytes", 2000);
        source.add_process(1, "init", 10, 10, 4096);
        source
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            interval: Duration::from_millis(10),
            process_interval: Duration::from_millis(10),
            ..EngineConfig::default()
        }
    }

    /// Fails every other tick
    struct Flaky {
        ticks: u32,
    }

    impl Sampler for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn sample(&mut self, _at: Instant) -> SampleResult<Vec<SamplerEvent>> {
            self.ticks += 1;
            if self.ticks % 2 == 1 {
                return Err(SampleError::malformed("odd tick"));
            }
            Ok(vec![SamplerEvent::Interface(crate::metrics::InterfaceInfo {
                name: format!("tick{}", self.ticks),
                connection_type: "Unknown".to_string(),
                ipv4: None,
                ipv6: None,
            })])
        }
    }

    #[tokio::test]
    async fn test_engine_publishes_every_kind() {
        let engine = Engine::new(fast_config(), scripted_source());
        let mut rx = engine.subscribe();
        let handle = engine.start();
        assert_eq!(handle.task_count(), 5);

        let mut seen = HashSet::new();
        let wanted = ["cpu", "memory", "disk", "interface", "network", "processes"];

        let result = time::timeout(Duration::from_secs(5), async {
            while seen.len() < wanted.len() {
                match rx.recv().await {
                    Ok(event) => {
                        seen.insert(event.kind());
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
        .await;

        assert!(result.is_ok(), "timed out, saw {:?}", seen);
        for kind in wanted {
            assert!(seen.contains(kind), "missing {}", kind);
        }

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_channel() {
        let engine = Engine::new(fast_config(), scripted_source());
        let handle = engine.start();
        let mut rx = handle.subscribe();
        handle.shutdown().await;

        let closed = time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Err(RecvError::Closed) => return true,
                    _ => continue,
                }
            }
        })
        .await;
        assert!(matches!(closed, Ok(true)));
    }

    #[tokio::test]
    async fn test_failed_tick_does_not_stop_sampler() {
        let (sender, mut rx) = broadcast::channel(16);
        let task = spawn_sampler(Box::new(Flaky { ticks: 0 }), Duration::from_millis(5), sender);

        let first = time::timeout(Duration::from_secs(5), rx.recv()).await;
        match first {
            Ok(Ok(SamplerEvent::Interface(info))) => assert_eq!(info.name, "tick2"),
            other => panic!("unexpected {:?}", other),
        }

        let second = time::timeout(Duration::from_secs(5), rx.recv()).await;
        match second {
            Ok(Ok(SamplerEvent::Interface(info))) => assert_eq!(info.name, "tick4"),
            other => panic!("unexpected {:?}", other),
        }

        task.abort();
    }

    #[tokio::test]
    async fn test_sampling_without_subscribers() {
        let engine = Engine::new(fast_config(), scripted_source());
        let handle = engine.start();
        assert_eq!(handle.subscriber_count(), 0);
        time::sleep(Duration::from_millis(30)).await;
        handle.shutdown().await;
    }
}
