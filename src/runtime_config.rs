//! # Runtime Configuration Module
//!
//! Environment-driven tuning for the coroutine runtime that backs the
//! thread-pool dispatcher.
//!
//! ## Environment Variables
//!
//! ### `BRRTR_STACK_SIZE`
//!
//! Stack size for each thread-pool worker coroutine. Accepts decimal
//! (`65536`) or hexadecimal (`0x10000`). Default: `0x10000` (64 KB).
//!
//! Consumers run on this stack, so deep call chains inside a consumer need a
//! larger value. Memory cost is `stack_size × workers` per pool.
//!
//! ### `BRRTR_COROUTINE_WORKERS`
//!
//! Number of OS threads the `may` scheduler multiplexes coroutines onto.
//! Unset leaves the `may` default in place.
//!
//! ## Usage
//!
//! ```rust
//! use brrtreactor::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! config.apply();
//! println!("Stack size: {} bytes", config.stack_size);
//! ```

use std::env;
use std::sync::Once;

/// Default coroutine stack size (64 KB)
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

static APPLY: Once = Once::new();

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for worker coroutines in bytes
    pub stack_size: usize,
    /// Scheduler threads for the `may` runtime (`None` keeps the runtime default)
    pub coroutine_workers: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            coroutine_workers: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = env::var("BRRTR_STACK_SIZE")
            .ok()
            .and_then(|val| parse_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);
        let coroutine_workers = env::var("BRRTR_COROUTINE_WORKERS")
            .ok()
            .and_then(|val| val.trim().parse::<usize>().ok())
            .filter(|&n| n > 0);
        RuntimeConfig {
            stack_size,
            coroutine_workers,
        }
    }

    /// Push the settings into the global `may` configuration.
    ///
    /// Only the first call in a process has any effect; the scheduler cannot
    /// be resized once coroutines have been spawned.
    pub fn apply(&self) {
        let config = *self;
        APPLY.call_once(|| {
            let may_config = may::config();
            may_config.set_stack_size(config.stack_size);
            if let Some(workers) = config.coroutine_workers {
                may_config.set_workers(workers);
            }
            tracing::debug!(
                stack_size = config.stack_size,
                coroutine_workers = ?config.coroutine_workers,
                "Applied coroutine runtime configuration"
            );
        });
    }
}

/// Parse a byte size given in decimal or `0x`-prefixed hexadecimal.
#[must_use]
pub fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}
