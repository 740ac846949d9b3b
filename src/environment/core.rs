use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::config::EnvironmentConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ReactorError, Result};
use crate::ids::ReactorId;
use crate::reactor::Reactor;
use crate::registry::{Registration, Registry};
use crate::routing::Filter;
use crate::runtime_config::RuntimeConfig;
use crate::selector::{Key, Selector};

/// Internal pool name mirroring the configured default dispatcher
pub const DEFAULT_DISPATCHER_NAME: &str = "__default-dispatcher";

/// Environment variable naming a configuration file for [`Environment::from_env`]
pub const CONFIG_ENV_VAR: &str = "BRRTR_CONFIG";

/// Named dispatcher pools, properties, the root reactor and a reactor directory.
///
/// An `Environment` is an ordinary value: construct it, pass it around, call
/// [`Environment::shutdown`] when done. Nothing about it is global.
pub struct Environment {
    default_dispatcher: String,
    properties: std::collections::BTreeMap<String, String>,
    dispatchers: DashMap<String, Vec<Arc<dyn Dispatcher>>>,
    selection: Filter,
    root: OnceCell<Reactor>,
    reactors: Registry<Reactor>,
}

impl Environment {
    /// The built-in dispatchers (see [`EnvironmentConfig::default`])
    pub fn new() -> Result<Self> {
        Self::from_config(EnvironmentConfig::default())
    }

    /// Load the file named by `BRRTR_CONFIG`, or use the built-in dispatchers
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => {
                info!(path = %path, "Loading environment configuration");
                Self::from_config(EnvironmentConfig::load(std::path::Path::new(path.trim()))?)
            }
            _ => Self::new(),
        }
    }

    /// Build every dispatcher the configuration lists
    pub fn from_config(config: EnvironmentConfig) -> Result<Self> {
        RuntimeConfig::from_env().apply();

        let env = Self {
            default_dispatcher: config.default_dispatcher,
            properties: config.properties,
            dispatchers: DashMap::new(),
            selection: Filter::round_robin(),
            root: OnceCell::new(),
            reactors: Registry::new(),
        };

        for spec in &config.dispatchers {
            let dispatcher = spec.build()?;
            debug!(
                dispatcher = %spec.name,
                kind = %spec.kind,
                backlog = ?dispatcher.backlog(),
                workers = dispatcher.workers(),
                "Dispatcher configured"
            );
            env.add_dispatcher(&spec.name, dispatcher);
        }

        info!(
            default_dispatcher = %env.default_dispatcher,
            dispatchers = config.dispatchers.len(),
            properties = env.properties.len(),
            "Environment ready"
        );
        Ok(env)
    }

    /// Name of the configured default pool
    #[must_use]
    pub fn default_dispatcher_name(&self) -> &str {
        &self.default_dispatcher
    }

    /// Append `dispatcher` to the pool called `name`. Adding to the default
    /// pool also adds it under [`DEFAULT_DISPATCHER_NAME`].
    pub fn add_dispatcher(&self, name: &str, dispatcher: Arc<dyn Dispatcher>) -> &Self {
        if name == self.default_dispatcher {
            self.dispatchers
                .entry(DEFAULT_DISPATCHER_NAME.to_string())
                .or_default()
                .push(Arc::clone(&dispatcher));
        }
        self.dispatchers
            .entry(name.to_string())
            .or_default()
            .push(dispatcher);
        self
    }

    /// Remove the pool called `name`. Returns whether it existed.
    pub fn remove_dispatcher(&self, name: &str) -> bool {
        self.dispatchers.remove(name).is_some()
    }

    /// One dispatcher from the pool `name`, rotating among its members
    pub fn dispatcher(&self, name: &str) -> Result<Arc<dyn Dispatcher>> {
        let pool = self.dispatchers.get(name);
        let members = pool.as_deref().map(Vec::as_slice).unwrap_or_default();
        self.selection
            .apply(&Key::from(name), members)
            .first()
            .cloned()
            .ok_or_else(|| ReactorError::DispatcherNotFound {
                name: name.to_string(),
            })
    }

    pub fn default_dispatcher(&self) -> Result<Arc<dyn Dispatcher>> {
        self.dispatcher(DEFAULT_DISPATCHER_NAME)
    }

    /// `(pool name, dispatcher)` for every configured dispatcher, sorted by name.
    /// The internal default mirror is left out.
    #[must_use]
    pub fn dispatchers(&self) -> Vec<(String, Arc<dyn Dispatcher>)> {
        let mut all: Vec<_> = self
            .dispatchers
            .iter()
            .filter(|pool| pool.key().as_str() != DEFAULT_DISPATCHER_NAME)
            .flat_map(|pool| {
                let name = pool.key().clone();
                pool.value()
                    .iter()
                    .map(|d| (name.clone(), Arc::clone(d)))
                    .collect::<Vec<_>>()
            })
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// The reactor on the default dispatcher, created on first use.
    /// Concurrent first callers all observe the same instance.
    pub fn root_reactor(&self) -> Result<&Reactor> {
        self.root.get_or_try_init(|| {
            let reactor = Reactor::with_dispatcher(self.default_dispatcher()?);
            info!(reactor_id = %reactor.id(), "Root reactor created");
            Ok(reactor)
        })
    }

    #[must_use]
    pub fn property(&self, key: &str, default: &str) -> String {
        self.properties
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Property converted with `FromStr`; `default` when absent or unparseable
    pub fn property_as<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.properties.get(key) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(key = %key, value = %raw, "Property could not be converted, using default");
                default
            }),
            None => default,
        }
    }

    /// Register `reactor` in the directory under its own id
    pub fn register(&self, reactor: &Reactor) -> Arc<Registration<Reactor>> {
        self.register_with_id(&reactor.id().to_string(), reactor)
    }

    /// Register `reactor` under `id`; an empty id means the reactor's own id
    pub fn register_with_id(&self, id: &str, reactor: &Reactor) -> Arc<Registration<Reactor>> {
        let id = if id.is_empty() {
            reactor.id().to_string()
        } else {
            id.to_string()
        };
        self.reactors.register(Selector::exact(id), reactor.clone())
    }

    /// The most recently registered reactor under `id`
    #[must_use]
    pub fn find(&self, id: &str) -> Option<Reactor> {
        self.reactors
            .select(&Key::from(id))
            .last()
            .map(|m| m.registration.object().clone())
    }

    #[must_use]
    pub fn find_by_id(&self, id: ReactorId) -> Option<Reactor> {
        self.find(&id.to_string())
    }

    /// Remove every reactor registered under `id`
    pub fn unregister(&self, id: &str) -> bool {
        self.reactors.unregister(&Key::from(id))
    }

    /// Shut every distinct dispatcher down once
    pub fn shutdown(&self) {
        let mut seen: Vec<Arc<dyn Dispatcher>> = Vec::new();
        for pool in self.dispatchers.iter() {
            for dispatcher in pool.value() {
                if !seen.iter().any(|d| Arc::ptr_eq(d, dispatcher)) {
                    seen.push(Arc::clone(dispatcher));
                }
            }
        }
        info!(dispatchers = seen.len(), "Shutting down environment");
        for dispatcher in seen {
            dispatcher.shutdown();
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.dispatchers.iter().map(|p| p.key().clone()).collect();
        names.sort();
        f.debug_struct("Environment")
            .field("default_dispatcher", &self.default_dispatcher)
            .field("dispatchers", &names)
            .field("properties", &self.properties.len())
            .field("root_reactor", &self.root.get().map(Reactor::id))
            .finish()
    }
}
