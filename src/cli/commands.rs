use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::buffer::Buffer;
use crate::codec::{Codec, Decoder, DelimitedCodec, JsonCodec, SyslogCodec};
use crate::environment::{Environment, EnvironmentConfig, CONFIG_ENV_VAR};
use crate::event::Event;
use crate::reactor::Reactor;
use crate::routing::Consumer;
use crate::selector::Selector;
use crate::telemetry::{init_logging_with_config, LogConfig};

/// Bytes pulled from the input per decode step
const READ_CHUNK: usize = 8 * 1024;

/// How long `bench` waits for queued events after the last notify
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Command-line interface for BRRTReactor
///
/// Inspects dispatcher configurations, measures dispatch throughput and runs
/// the codecs over files or stdin.
#[derive(Parser)]
#[command(name = "brrtreactor")]
#[command(about = "BRRTReactor CLI", long_about = None)]
pub struct Cli {
    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Configuration file for this invocation: `--config`, else `BRRTR_CONFIG`
    #[must_use]
    pub fn config_path(&self) -> Option<PathBuf> {
        let explicit = match &self.command {
            Commands::Dispatchers { config } | Commands::Bench { config, .. } => config.clone(),
            Commands::Decode { .. } => None,
        };
        explicit.or_else(|| {
            std::env::var(CONFIG_ENV_VAR)
                .ok()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        })
    }

    /// Logging for this invocation: `--log-level`, then `BRRTR_LOG_*`, then
    /// the configuration file's `log.*` properties.
    ///
    /// A configuration file that fails to load is ignored here; the command
    /// itself reports the error once logging is up.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        let mut config = match self.config_path().map(|p| EnvironmentConfig::load(&p)) {
            Some(Ok(env_config)) => env_config.log_config(),
            _ => LogConfig::from_env(),
        };
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config
    }
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List the dispatchers an environment configuration defines
    Dispatchers {
        /// Configuration file (.yaml, .yml, .toml or .properties);
        /// falls back to BRRTR_CONFIG, then the built-in set
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Publish events through one dispatcher and report throughput
    Bench {
        /// Dispatcher name from the configuration
        #[arg(short, long, default_value = "ringBuffer")]
        dispatcher: String,

        /// Number of events to publish
        #[arg(short, long, default_value_t = 100_000)]
        events: u64,

        /// Consumers subscribed to the bench key
        #[arg(short = 'n', long, default_value_t = 1)]
        consumers: usize,

        /// Configuration file; same lookup as `dispatchers`
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Decode a file (or stdin) and print one JSON document per value
    Decode {
        #[arg(short, long, value_enum)]
        codec: CodecName,

        /// Input file; stdin when omitted
        file: Option<PathBuf>,
    },
}

/// Codecs selectable from the command line
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CodecName {
    /// RFC 3164 syslog lines
    Syslog,
    /// A single JSON document
    Json,
    /// Newline-delimited text
    Lines,
}

/// One row of `brrtreactor dispatchers`
#[derive(Debug, Serialize)]
struct DispatcherRow {
    name: String,
    kind: String,
    workers: usize,
    backlog: Option<usize>,
    default: bool,
}

/// Parse the process arguments and execute the command
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the input cannot
/// be read, or a codec rejects it.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // Keep the guard alive so buffered log lines are flushed on exit
    let _guard = init_logging_with_config(&cli.log_config())?;
    run(cli)
}

/// Execute an already parsed command line
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Commands::Dispatchers { config } => {
            let env = environment(config.as_deref())?;
            list_dispatchers(&env, &mut out)?;
            env.shutdown();
            Ok(())
        }
        Commands::Bench {
            dispatcher,
            events,
            consumers,
            config,
        } => {
            let env = environment(config.as_deref())?;
            let report = bench(&env, &dispatcher, events, consumers);
            env.shutdown();
            let report = report?;
            writeln!(out, "{}", serde_json::to_string(&report)?)?;
            Ok(())
        }
        Commands::Decode { codec, file } => {
            let mut input: Box<dyn Read> = match &file {
                Some(path) => Box::new(
                    File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
                ),
                None => Box::new(io::stdin()),
            };
            let count = decode(codec, &mut input, &mut out)?;
            info!(codec = ?codec, values = count, "Decode finished");
            Ok(())
        }
    }
}

fn environment(config: Option<&Path>) -> anyhow::Result<Environment> {
    let env = match config {
        Some(path) => Environment::from_config(EnvironmentConfig::load(path)?)?,
        None => Environment::from_env()?,
    };
    Ok(env)
}

/// Write one JSON line per configured dispatcher, in name order
pub fn list_dispatchers(env: &Environment, out: &mut impl Write) -> anyhow::Result<()> {
    for (name, dispatcher) in env.dispatchers() {
        let row = DispatcherRow {
            default: name == env.default_dispatcher_name(),
            name,
            kind: dispatcher.kind().to_string(),
            workers: dispatcher.workers(),
            backlog: dispatcher.backlog(),
        };
        writeln!(out, "{}", serde_json::to_string(&row)?)?;
    }
    Ok(())
}

/// Throughput measurement produced by `bench`
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub dispatcher: String,
    pub kind: String,
    pub events: u64,
    pub consumers: usize,
    /// Consumer invocations observed; `events * consumers` on a clean run
    pub deliveries: u64,
    pub elapsed_ms: u128,
    pub events_per_sec: f64,
}

/// Notify `events` events on one key with `consumers` subscribers and wait
/// for every delivery.
pub fn bench(
    env: &Environment,
    dispatcher: &str,
    events: u64,
    consumers: usize,
) -> anyhow::Result<BenchReport> {
    let reactor = Reactor::builder(env).dispatcher_name(dispatcher).build()?;
    let delivered = Arc::new(AtomicU64::new(0));
    for _ in 0..consumers {
        let counter = Arc::clone(&delivered);
        reactor.on(
            Selector::exact("bench"),
            Consumer::event(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }),
        );
    }

    let expected = events.saturating_mul(consumers as u64);
    let started = Instant::now();
    for i in 0..events {
        reactor.notify("bench", Event::wrap(i))?;
    }
    let deadline = started + DRAIN_TIMEOUT;
    while delivered.load(Ordering::Relaxed) < expected {
        if Instant::now() >= deadline {
            bail!(
                "timed out after {:?} with {} of {} deliveries",
                DRAIN_TIMEOUT,
                delivered.load(Ordering::Relaxed),
                expected
            );
        }
        std::thread::sleep(Duration::from_micros(200));
    }
    let elapsed = started.elapsed();

    let report = BenchReport {
        dispatcher: dispatcher.to_string(),
        kind: reactor.dispatcher().kind().to_string(),
        events,
        consumers,
        deliveries: delivered.load(Ordering::Relaxed),
        elapsed_ms: elapsed.as_millis(),
        events_per_sec: events as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
    };
    info!(
        dispatcher = %report.dispatcher,
        events = report.events,
        elapsed_ms = report.elapsed_ms,
        "Bench finished"
    );
    Ok(report)
}

/// Decode `input` with the named codec, writing each value as a JSON line.
/// Returns the number of values written.
pub fn decode(codec: CodecName, input: &mut impl Read, out: &mut impl Write) -> anyhow::Result<usize> {
    match codec {
        CodecName::Syslog => decode_stream(SyslogCodec::new().decoder(None), input, out),
        CodecName::Lines => decode_stream(DelimitedCodec::default().decoder(None), input, out),
        CodecName::Json => {
            // A JSON document has no frame boundary, so it is read whole
            let mut buf = Buffer::new();
            while buf.fill_from(input, READ_CHUNK)? > 0 {}
            let mut decoder = JsonCodec::<serde_json::Value>::new().decoder(None);
            let mut count = 0;
            if let Some(value) = decoder.decode(&mut buf)? {
                writeln!(out, "{}", value)?;
                count += 1;
            }
            Ok(count)
        }
    }
}

fn decode_stream<T: Serialize>(
    mut decoder: Box<dyn Decoder<Output = T>>,
    input: &mut impl Read,
    out: &mut impl Write,
) -> anyhow::Result<usize> {
    let mut count = 0;
    loop {
        let mut buf = Buffer::with_capacity(READ_CHUNK, false);
        if buf.fill_from(input, READ_CHUNK)? == 0 {
            break;
        }
        while let Some(value) = decoder.decode(&mut buf)? {
            writeln!(out, "{}", serde_json::to_string(&value)?)?;
            count += 1;
        }
    }
    if let Some(value) = decoder.finish()? {
        writeln!(out, "{}", serde_json::to_string(&value)?)?;
        count += 1;
    }
    Ok(count)
}
