//! # Run Subcommand
//!
//! Replays an observation stream (one tick per line, see
//! [`ReplaySource`]) through the presence tracker and appends the emitted
//! records to a CSV attendance log.
//!
//! Configuration precedence, lowest to highest: built-in defaults, the
//! `--config` YAML file, the `PRESENCE_MAX_MISSES` environment variable,
//! then command-line flags.
//!
//! Ctrl-C raises the tracker's stop signal; the tick in progress completes
//! and queued records get one final delivery attempt. A second Ctrl-C
//! exits immediately.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use presence_core::{Clock, ManualClock, SystemClock, Timestamp};
use presence_tracker::{
    CsvIntervalLog, ObservationSource, PresenceConfig, PresenceTracker, ReplaySource, RunReport,
    StopReason, StopSignal, TickLoop,
};

/// Environment variable overriding `tracker.max_miss_threshold`.
pub const MAX_MISSES_ENV: &str = "PRESENCE_MAX_MISSES";

/// Exit code when the run ended with records the log never acknowledged.
pub const EXIT_UNDELIVERED: u8 = 2;

/// Exit code for a second interrupt.
const EXIT_INTERRUPTED: i32 = 130;

/// Arguments for the `presence run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Observation stream, one tick per line. `-` reads stdin.
    #[arg(long, default_value = "-")]
    pub observations: PathBuf,

    /// Attendance log to append to. Created if absent.
    #[arg(long, default_value = "attendance.csv")]
    pub log: PathBuf,

    /// Consecutive missed ticks that close an interval.
    #[arg(long)]
    pub max_misses: Option<u32>,

    /// Pause between ticks, in milliseconds.
    #[arg(long)]
    pub tick_interval_ms: Option<u64>,

    /// Records held while the log is failing before ticks pause.
    #[arg(long)]
    pub outbox_capacity: Option<usize>,

    /// Close every open interval when the run ends.
    #[arg(long)]
    pub close_on_exit: bool,

    /// Replay on simulated time starting here instead of the wall clock.
    #[arg(long, value_parser = Timestamp::parse)]
    pub start: Option<Timestamp>,

    /// Simulated seconds per tick. Ignored without `--start`.
    #[arg(long, default_value_t = 1)]
    pub tick_secs: i64,
}

/// Merge file, environment and flag settings into one validated config.
pub fn resolve_config(
    args: &RunArgs,
    config_path: Option<&Path>,
    env_max_misses: Option<&str>,
) -> Result<PresenceConfig> {
    let mut config = match config_path {
        Some(path) => PresenceConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PresenceConfig::default(),
    };

    if let Some(raw) = env_max_misses {
        config.tracker.max_miss_threshold = raw
            .trim()
            .parse()
            .with_context(|| format!("{MAX_MISSES_ENV}={raw:?} is not a positive integer"))?;
    }
    if let Some(threshold) = args.max_misses {
        config.tracker.max_miss_threshold = threshold;
    }
    if let Some(interval) = args.tick_interval_ms {
        config.runtime.tick_interval_ms = interval;
    }
    if let Some(capacity) = args.outbox_capacity {
        config.runtime.outbox_capacity = capacity;
    }
    if args.close_on_exit {
        config.runtime.close_open_on_stop = true;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Execute `presence run`.
pub fn run_tracker(args: &RunArgs, config_path: Option<&Path>) -> Result<u8> {
    let env = std::env::var(MAX_MISSES_ENV).ok();
    let config = resolve_config(args, config_path, env.as_deref())?;
    let report = execute(args, &config)?;

    println!(
        "ticks={} opened={} closed={} adapter_failures={} append_failures={} undelivered={} stop={}",
        report.ticks,
        report.opened,
        report.closed,
        report.adapter_failures,
        report.append_failures,
        report.undelivered.len(),
        match report.stop_reason {
            StopReason::Requested => "requested",
            StopReason::SourceExhausted => "exhausted",
        }
    );

    if report.fully_delivered() {
        Ok(0)
    } else {
        for record in &report.undelivered {
            eprintln!("undelivered: {}", record.to_line());
        }
        Ok(EXIT_UNDELIVERED)
    }
}

/// Run the tick loop to completion with Ctrl-C wired to its stop signal.
pub fn execute(args: &RunArgs, config: &PresenceConfig) -> Result<RunReport> {
    let source = open_source(&args.observations)?;
    let log = CsvIntervalLog::open(&args.log)
        .with_context(|| format!("opening attendance log {}", args.log.display()))?;

    let clock: Box<dyn Clock> = match args.start {
        Some(start) => {
            tracing::info!(start = %start, tick_secs = args.tick_secs, "using simulated clock");
            Box::new(ManualClock::starting_at(start).with_auto_advance(args.tick_secs))
        }
        None => Box::new(SystemClock::new()),
    };
    let tracker = PresenceTracker::new(config.tracker, clock)?;
    let tick_loop = TickLoop::new(tracker, config.runtime)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(drive(tick_loop, source, log))
}

async fn drive(
    mut tick_loop: TickLoop,
    source: Box<dyn ObservationSource + Send>,
    log: CsvIntervalLog,
) -> Result<RunReport> {
    let stop = StopSignal::new();

    let watcher = {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("could not install Ctrl-C handler");
                return;
            }
            tracing::info!("interrupt received; stopping after the current tick");
            stop.request_stop();
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("second interrupt; exiting without final delivery");
                std::process::exit(EXIT_INTERRUPTED);
            }
        })
    };

    let result = tokio::task::spawn_blocking(move || tick_loop.run(source, log, &stop))
        .await
        .context("tick loop task failed")?;
    watcher.abort();

    Ok(result?)
}

fn open_source(path: &Path) -> Result<Box<dyn ObservationSource + Send>> {
    if path == Path::new("-") {
        tracing::debug!("reading observations from stdin");
        return Ok(Box::new(ReplaySource::new(BufReader::new(std::io::stdin()))));
    }
    let file = File::open(path)
        .with_context(|| format!("opening observations {}", path.display()))?;
    Ok(Box::new(ReplaySource::new(BufReader::new(file))))
}
