//! Environment configuration: dispatcher specs plus free-form properties.
//!
//! Three file formats are accepted, chosen by extension:
//!
//! ```yaml
//! # reactor.yaml
//! default_dispatcher: ringBuffer
//! dispatchers:
//!   - name: ringBuffer
//!     type: ringBuffer
//!     backlog: 1024
//!     wait_strategy: blocking
//! properties:
//!   app.name: demo
//! ```
//!
//! ```properties
//! # reactor.properties
//! reactor.dispatchers.default = workers
//! reactor.dispatchers.workers.type = threadPoolExecutor
//! reactor.dispatchers.workers.size = 4
//! reactor.dispatchers.workers.backlog = 256
//! app.name = demo
//! ```
//!
//! TOML mirrors the YAML layout (`[[dispatchers]]` tables).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::dispatcher::{
    BackpressureMode, BlockingQueueDispatcher, Dispatcher, DispatcherKind, RingBufferDispatcher,
    SynchronousDispatcher, ThreadPoolConfig, ThreadPoolDispatcher, WaitStrategy,
};
use crate::error::{ReactorError, Result};
use crate::telemetry::LogConfig;

/// Name of the built-in event-loop dispatcher
pub const EVENT_LOOP: &str = "eventLoop";
/// Name of the built-in ring-buffer dispatcher
pub const RING_BUFFER: &str = "ringBuffer";
/// Name of the built-in thread-pool dispatcher
pub const THREAD_POOL: &str = "threadPoolExecutor";
/// Name of the built-in synchronous dispatcher
pub const SYNC: &str = "sync";

const PROPERTY_PREFIX: &str = "reactor.dispatchers.";

/// One named dispatcher to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DispatcherKind,
    /// Worker count; below 1 means available parallelism
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    /// Queue or ring capacity; the strategy default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlog: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backpressure: Option<BackpressureMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backpressure_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_strategy: Option<WaitStrategy>,
}

impl DispatcherSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: DispatcherKind) -> Self {
        Self {
            name: name.into(),
            kind,
            size: None,
            backlog: None,
            backpressure: None,
            backpressure_timeout_ms: None,
            wait_strategy: None,
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_backlog(mut self, backlog: usize) -> Self {
        self.backlog = Some(backlog);
        self
    }

    /// Backlog after applying the strategy default
    #[must_use]
    pub fn effective_backlog(&self) -> Option<usize> {
        self.backlog.or_else(|| self.kind.default_backlog())
    }

    /// Create the dispatcher this spec describes
    pub fn build(&self) -> Result<Arc<dyn Dispatcher>> {
        let backlog = self.effective_backlog().unwrap_or(1);
        let dispatcher: Arc<dyn Dispatcher> = match self.kind {
            DispatcherKind::Synchronous => Arc::new(SynchronousDispatcher::new(&self.name)),
            DispatcherKind::BlockingQueue => {
                Arc::new(BlockingQueueDispatcher::new(&self.name, backlog)?)
            }
            DispatcherKind::ThreadPool => {
                let config = ThreadPoolConfig::new(self.size.unwrap_or(0), backlog).with_backpressure(
                    self.backpressure.unwrap_or_default(),
                    self.backpressure_timeout_ms.unwrap_or(0),
                );
                Arc::new(ThreadPoolDispatcher::new(&self.name, config)?)
            }
            DispatcherKind::RingBuffer => Arc::new(RingBufferDispatcher::new(
                &self.name,
                backlog,
                self.wait_strategy.unwrap_or_default(),
            )?),
        };
        Ok(dispatcher)
    }
}

/// Everything an [`Environment`](super::Environment) is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_dispatcher_name")]
    pub default_dispatcher: String,
    #[serde(default = "default_dispatchers")]
    pub dispatchers: Vec<DispatcherSpec>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_dispatcher_name() -> String {
    RING_BUFFER.to_string()
}

fn default_dispatchers() -> Vec<DispatcherSpec> {
    vec![
        DispatcherSpec::new(SYNC, DispatcherKind::Synchronous),
        DispatcherSpec::new(EVENT_LOOP, DispatcherKind::BlockingQueue),
        DispatcherSpec::new(THREAD_POOL, DispatcherKind::ThreadPool).with_size(0),
        DispatcherSpec::new(RING_BUFFER, DispatcherKind::RingBuffer),
    ]
}

impl Default for EnvironmentConfig {
    /// `sync`, `eventLoop`, `threadPoolExecutor` and `ringBuffer`, defaulting to `ringBuffer`
    fn default() -> Self {
        Self {
            default_dispatcher: default_dispatcher_name(),
            dispatchers: default_dispatchers(),
            properties: BTreeMap::new(),
        }
    }
}

impl EnvironmentConfig {
    /// No dispatchers at all; add them with [`super::Environment::add_dispatcher`]
    #[must_use]
    pub fn empty(default_dispatcher: impl Into<String>) -> Self {
        Self {
            default_dispatcher: default_dispatcher.into(),
            dispatchers: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Logging settings: `BRRTR_LOG_*` variables over this file's `log.*` properties
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig::from_env_and_properties(&self.properties)
    }

    /// Load from a `.yaml`/`.yml`, `.toml` or `.properties` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReactorError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&content),
            "toml" => Self::from_toml_str(&content),
            "properties" => Self::from_properties_str(&content),
            other => Err(ReactorError::configuration(format!(
                "unsupported configuration format '{}' for {}",
                other,
                path.display()
            ))),
        }
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s)
            .map_err(|e| ReactorError::configuration(format!("invalid YAML configuration: {}", e)))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| ReactorError::configuration(format!("invalid TOML configuration: {}", e)))
    }

    /// Parse `key = value` lines. Keys under `reactor.dispatchers.` describe
    /// dispatchers in order of first appearance; every other key is a property.
    /// Without any dispatcher keys the built-in dispatchers are used.
    pub fn from_properties_str(s: &str) -> Result<Self> {
        let mut default_dispatcher = None;
        let mut entries: Vec<(String, BTreeMap<String, String>)> = Vec::new();
        let mut properties = BTreeMap::new();

        for (line_no, raw) in s.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some(split) = line.find(|c| c == '=' || c == ':') else {
                return Err(ReactorError::configuration(format!(
                    "line {}: expected 'key = value', got '{}'",
                    line_no + 1,
                    line
                )));
            };
            let key = line[..split].trim();
            let value = line[split + 1..].trim().to_string();

            let Some(rest) = key.strip_prefix(PROPERTY_PREFIX) else {
                properties.insert(key.to_string(), value);
                continue;
            };
            if rest == "default" {
                default_dispatcher = Some(value);
                continue;
            }
            let Some((name, attribute)) = rest.rsplit_once('.') else {
                return Err(ReactorError::configuration(format!(
                    "line {}: '{}' is not reactor.dispatchers.<name>.<attribute>",
                    line_no + 1,
                    key
                )));
            };
            let index = match entries.iter().position(|(n, _)| n == name) {
                Some(i) => i,
                None => {
                    entries.push((name.to_string(), BTreeMap::new()));
                    entries.len() - 1
                }
            };
            entries[index].1.insert(attribute.to_string(), value);
        }

        let dispatchers = if entries.is_empty() {
            default_dispatchers()
        } else {
            entries
                .into_iter()
                .map(|(name, attributes)| spec_from_properties(name, &attributes))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            default_dispatcher: default_dispatcher.unwrap_or_else(default_dispatcher_name),
            dispatchers,
            properties,
        })
    }
}

fn spec_from_properties(name: String, attributes: &BTreeMap<String, String>) -> Result<DispatcherSpec> {
    let kind: DispatcherKind = attributes
        .get("type")
        .ok_or_else(|| {
            ReactorError::configuration(format!("dispatcher '{}' has no type", name))
        })?
        .parse()?;

    let number = |attribute: &str| -> Result<Option<i64>> {
        attributes
            .get(attribute)
            .map(|v| {
                v.parse::<i64>().map_err(|_| {
                    ReactorError::configuration(format!(
                        "dispatcher '{}': {} must be an integer, got '{}'",
                        name, attribute, v
                    ))
                })
            })
            .transpose()
    };

    let backlog = number("backlog")?
        .map(|b| {
            usize::try_from(b).map_err(|_| {
                ReactorError::configuration(format!("dispatcher '{}': backlog must not be negative", name))
            })
        })
        .transpose()?;
    let backpressure_timeout_ms = number("backpressureTimeoutMs")?
        .map(|t| u64::try_from(t).unwrap_or(0));

    let backpressure = match attributes.get("backpressure") {
        Some(v) => Some(BackpressureMode::parse(v).ok_or_else(|| {
            ReactorError::configuration(format!("dispatcher '{}': unknown backpressure '{}'", name, v))
        })?),
        None => None,
    };
    let wait_strategy = match attributes.get("waitStrategy") {
        Some(v) => Some(WaitStrategy::parse(v).ok_or_else(|| {
            ReactorError::configuration(format!("dispatcher '{}': unknown wait strategy '{}'", name, v))
        })?),
        None => None,
    };

    Ok(DispatcherSpec {
        size: number("size")?,
        backlog,
        backpressure,
        backpressure_timeout_ms,
        wait_strategy,
        kind,
        name,
    })
}
