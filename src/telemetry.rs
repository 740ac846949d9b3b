//! Structured logging setup
//!
//! Dispatchers, the environment and the router log through `tracing` with
//! structured fields (`dispatcher`, `key`, `registration`, ...). This module
//! installs the subscriber that renders them to stderr, as JSON or
//! pretty-printed, optionally sampled and optionally through a
//! `tracing-appender` background writer.
//!
//! | Variable | Property | Default |
//! |----------|----------|---------|
//! | `BRRTR_LOG_LEVEL` | `log.level` | `info` |
//! | `BRRTR_LOG_FORMAT` | `log.format` | `json` |
//! | `BRRTR_LOG_SAMPLING_MODE` | `log.sampling-mode` | `all` |
//! | `BRRTR_LOG_SAMPLING_RATE` | `log.sampling-rate` | `1.0` |
//! | `BRRTR_LOG_ASYNC` | `log.async` | `false` |
//! | `BRRTR_LOG_TARGET_FILTER` | `log.target-filter` | none |
//! | `BRRTR_LOG_INCLUDE_LOCATION` | `log.include-location` | `false` |

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{warn, Level, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Anything but `pretty` means JSON
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("pretty") {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

/// Which events reach the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    All,
    /// WARN and ERROR only
    ErrorOnly,
    /// Every WARN/ERROR plus one in `1 / rate` of the rest
    Sampled,
}

impl SamplingMode {
    /// Unknown names mean [`SamplingMode::All`]
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let normalized = s.to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "error-only" => SamplingMode::ErrorOnly,
            "sampled" => SamplingMode::Sampled,
            _ => SamplingMode::All,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    pub sampling_mode: SamplingMode,
    /// Fraction (0.0-1.0) of non-severe events kept in `Sampled` mode
    pub sampling_rate: f64,
    /// Write through a background thread instead of blocking the logging thread
    pub async_logging: bool,
    /// Extra `target=level` directives, comma-separated
    pub target_filter: Option<String>,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl LogConfig {
    /// Read the `BRRTR_LOG_*` variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(env_value)
    }

    /// Read `log.*` keys, e.g. from [`Environment`](crate::Environment) properties
    #[must_use]
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Self {
        Self::from_lookup(|name| property_value(properties, name))
    }

    /// `BRRTR_LOG_*` variables, falling back to `log.*` properties for anything unset
    #[must_use]
    pub fn from_env_and_properties(properties: &BTreeMap<String, String>) -> Self {
        Self::from_lookup(|name| env_value(name).or_else(|| property_value(properties, name)))
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(raw: Option<String>, default: T) -> T {
            raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        }
        Self {
            log_level: get("LEVEL").unwrap_or_else(|| "info".to_string()),
            format: get("FORMAT").map_or(LogFormat::Json, |v| LogFormat::parse(&v)),
            sampling_mode: get("SAMPLING_MODE").map_or(SamplingMode::All, |v| SamplingMode::parse(&v)),
            sampling_rate: parsed(get("SAMPLING_RATE"), 1.0),
            async_logging: parsed(get("ASYNC"), false),
            target_filter: get("TARGET_FILTER").filter(|v| !v.trim().is_empty()),
            include_location: parsed(get("INCLUDE_LOCATION"), false),
        }
    }

    /// Verbose, pretty, synchronous
    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            include_location: true,
            ..Self::default()
        }
    }

    /// JSON at info, written from a background thread
    #[must_use]
    pub fn default_prod() -> Self {
        Self {
            async_logging: true,
            ..Self::default()
        }
    }

    fn level(&self) -> Level {
        self.log_level.trim().parse().unwrap_or(Level::INFO)
    }

    /// Parsed `target_filter` directives, plus the ones that failed to parse
    fn directives(&self) -> (Vec<Directive>, Vec<String>) {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        let raw = self.target_filter.as_deref().unwrap_or_default();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.parse() {
                Ok(directive) => valid.push(directive),
                Err(_) => invalid.push(item.to_string()),
            }
        }
        (valid, invalid)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(format!("BRRTR_LOG_{}", name)).ok()
}

fn property_value(properties: &BTreeMap<String, String>, name: &str) -> Option<String> {
    let key = format!("log.{}", name.to_ascii_lowercase().replace('_', "-"));
    properties.get(&key).cloned()
}

/// Drops events according to a [`SamplingMode`]. Spans always pass.
pub struct SamplingLayer {
    mode: SamplingMode,
    sampling_rate: f64,
    counter: AtomicU64,
}

impl SamplingLayer {
    #[must_use]
    pub fn new(mode: SamplingMode, sampling_rate: f64) -> Self {
        Self {
            mode,
            sampling_rate: sampling_rate.clamp(0.0, 1.0),
            counter: AtomicU64::new(0),
        }
    }

    fn keep(&self, level: Level) -> bool {
        let severe = level <= Level::WARN;
        match self.mode {
            SamplingMode::All => true,
            SamplingMode::ErrorOnly => severe,
            SamplingMode::Sampled if severe => true,
            SamplingMode::Sampled => {
                if self.sampling_rate <= 0.0 {
                    return false;
                }
                let every = (1.0 / self.sampling_rate).round() as u64;
                self.counter.fetch_add(1, Ordering::Relaxed) % every.max(1) == 0
            }
        }
    }
}

impl<S> Layer<S> for SamplingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: LayerContext<'_, S>) -> bool {
        metadata.is_span() || self.keep(*metadata.level())
    }
}

/// Install the global subscriber.
///
/// With `async_logging` the returned guard owns the background writer; keep
/// it alive until exit or buffered lines are lost.
///
/// ```no_run
/// use brrtreactor::telemetry::{init_logging_with_config, LogConfig};
///
/// let _guard = init_logging_with_config(&LogConfig::from_env())
///     .expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    // RUST_LOG wins over the configured level
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level().as_str()));
    let (directives, rejected) = config.directives();
    for directive in directives {
        filter = filter.add_directive(directive);
    }

    let (writer, guard) = if config.async_logging {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
        (BoxMakeWriter::new(non_blocking), Some(guard))
    } else {
        (BoxMakeWriter::new(std::io::stderr), None)
    };

    let output = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_thread_names(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_thread_names(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(SamplingLayer::new(config.sampling_mode, config.sampling_rate))
        .with(output)
        .try_init()
        .context("Failed to initialize logging")?;

    for directive in rejected {
        warn!(directive = %directive, "Ignoring invalid log filter directive");
    }
    Ok(guard)
}
