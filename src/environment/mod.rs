//! # Environment Module
//!
//! Named dispatcher pools built from configuration, typed properties, a
//! lazily created root [`Reactor`](crate::reactor::Reactor) and a directory of
//! reactors addressable by id.
//!
//! ## Dispatcher Pools
//!
//! Each name maps to a list of dispatchers. Lookups rotate round-robin over
//! the list, so registering several single-threaded dispatchers under one name
//! spreads reactors across them. The pool named by `default_dispatcher` is
//! mirrored under [`DEFAULT_DISPATCHER_NAME`].
//!
//! ## Configuration Sources
//!
//! | Source | Loader |
//! |--------|--------|
//! | built-in | [`EnvironmentConfig::default`] |
//! | `.yaml` / `.yml` | `serde_yaml` |
//! | `.toml` | `toml` |
//! | `.properties` | line parser, `reactor.dispatchers.<name>.<attribute>` |
//! | `BRRTR_CONFIG` | [`Environment::from_env`] picks the file by extension |

mod config;
mod core;

pub use config::{
    DispatcherSpec, EnvironmentConfig, EVENT_LOOP, RING_BUFFER, SYNC, THREAD_POOL,
};
pub use core::{Environment, CONFIG_ENV_VAR, DEFAULT_DISPATCHER_NAME};
