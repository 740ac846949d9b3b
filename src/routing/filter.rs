use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::selector::Key;

/// Keys whose rotation position a round-robin filter remembers. The least
/// recently notified key is forgotten first and restarts at the first match.
pub const ROUND_ROBIN_KEYS: usize = 4096;

/// Which of the matched subscriptions actually receive a notification
#[derive(Clone, Debug, Default)]
pub enum Filter {
    /// Every match, in registration order
    #[default]
    PassThrough,
    /// Exactly one match per notification, rotating per key
    RoundRobin(Arc<Mutex<LruCache<Key, usize>>>),
    /// Only the earliest registration
    First,
}

impl Filter {
    #[must_use]
    pub fn round_robin() -> Self {
        Self::round_robin_with_capacity(ROUND_ROBIN_KEYS)
    }

    /// Round-robin that tracks at most `keys` distinct keys
    #[must_use]
    pub fn round_robin_with_capacity(keys: usize) -> Self {
        let capacity = NonZeroUsize::new(keys).unwrap_or(NonZeroUsize::MIN);
        Filter::RoundRobin(Arc::new(Mutex::new(LruCache::new(capacity))))
    }

    /// Parse a filter name as used in configuration (`pass-through`, `round-robin`, `first`)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('_', "-").as_str() {
            "pass-through" | "passthrough" | "broadcast" => Some(Filter::PassThrough),
            "round-robin" | "roundrobin" => Some(Filter::round_robin()),
            "first" => Some(Filter::First),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Filter::PassThrough => "pass-through",
            Filter::RoundRobin(_) => "round-robin",
            Filter::First => "first",
        }
    }

    /// The sub-slice of `items` selected for `key`
    pub fn apply<'a, M>(&self, key: &Key, items: &'a [M]) -> &'a [M] {
        if items.is_empty() {
            return items;
        }
        match self {
            Filter::PassThrough => items,
            Filter::First => &items[..1],
            Filter::RoundRobin(counters) => {
                let mut counters = counters.lock();
                let n = match counters.get_mut(key) {
                    Some(next) => {
                        let n = *next;
                        *next = n.wrapping_add(1);
                        n
                    }
                    None => {
                        counters.put(key.clone(), 1);
                        0
                    }
                };
                let i = n % items.len();
                &items[i..=i]
            }
        }
    }
}
