//! perfsampler - headless driver for the sampling engine.
//!
//! Runs every sampler against the live system and prints each published
//! event to stdout, either as JSON Lines or as summary text.

use anyhow::{ensure, Result};
use clap::Parser;
use perfsampler::{
    DiskSelector, Engine, EngineConfig, EventWriter, OutputFormat, DEFAULT_HISTORY_CAPACITY,
};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Sample CPU, memory, disk, network and process counters
#[derive(Parser, Debug)]
#[command(name = "perfsampler")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sampling interval in seconds
    #[arg(short = 'i', long, default_value = "1")]
    interval: f64,

    /// Process sampling interval in seconds
    #[arg(long, default_value = "1")]
    process_interval: f64,

    /// Block device to follow ("auto" picks the first whole disk)
    #[arg(short, long, default_value = "auto")]
    disk: DiskSelector,

    /// Samples kept per chart
    #[arg(long, default_value_t = DEFAULT_HISTORY_CAPACITY)]
    history: usize,

    /// Run for specified duration (seconds), then exit
    #[arg(short = 't', long)]
    duration: Option<u64>,

    /// Output JSON Lines instead of text
    #[arg(long)]
    json: bool,

    /// Log level for diagnostics on stderr (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Processes listed per batch in text mode (0 hides them)
    #[arg(long, default_value = "5")]
    top: usize,

    /// procfs mount point
    #[arg(long, default_value = "/proc")]
    proc_root: PathBuf,

    /// sysfs mount point
    #[arg(long, default_value = "/sys")]
    sys_root: PathBuf,
}

impl Args {
    fn engine_config(&self) -> Result<EngineConfig> {
        ensure!(
            self.interval.is_finite() && self.interval > 0.0,
            "--interval must be a positive number of seconds"
        );
        ensure!(
            self.process_interval.is_finite() && self.process_interval > 0.0,
            "--process-interval must be a positive number of seconds"
        );

        Ok(EngineConfig {
            interval: Duration::from_secs_f64(self.interval),
            process_interval: Duration::from_secs_f64(self.process_interval),
            history_capacity: self.history,
            disk: self.disk.clone(),
            proc_root: self.proc_root.clone(),
            sys_root: self.sys_root.clone(),
            ..EngineConfig::default()
        })
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries events, diagnostics go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let config = args.engine_config()?;
    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let engine = Engine::with_procfs(config);
    let mut events = engine.subscribe();
    let handle = engine.start();
    let mut writer = EventWriter::new(io::stdout(), format, args.top);

    let duration = args.duration.map(Duration::from_secs);
    let deadline = async {
        match duration {
            Some(d) => time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Duration elapsed, stopping");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => writer.write(&event)?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Output fell behind, dropped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await;
    writer.flush()?;
    info!("Wrote {} events", writer.events_written());

    Ok(())
}
