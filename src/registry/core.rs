use arc_swap::ArcSwap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::registration::Registration;
use crate::selector::{Key, ParamVec, Selector};

/// Hot keys remembered by each registry
pub const DEFAULT_MATCH_CACHE_SIZE: usize = 1024;

/// One registration matched by a key, with the variables its selector captured
#[derive(Debug)]
pub struct Match<T> {
    pub registration: Arc<Registration<T>>,
    pub vars: ParamVec,
}

impl<T> Clone for Match<T> {
    fn clone(&self) -> Self {
        Self {
            registration: Arc::clone(&self.registration),
            vars: self.vars.clone(),
        }
    }
}

struct Snapshot<T> {
    generation: u64,
    registrations: Vec<Arc<Registration<T>>>,
}

struct Cached<T> {
    generation: u64,
    matches: Vec<Match<T>>,
}

pub(crate) struct Shared<T> {
    snapshot: ArcSwap<Snapshot<T>>,
    write_lock: Mutex<()>,
    cache: Mutex<LruCache<Key, Cached<T>>>,
    next_id: AtomicU64,
}

impl<T> Shared<T> {
    /// Publish a snapshot without the registrations `remove_if` selects. Returns the removed ones.
    fn retain<F>(&self, mut remove_if: F) -> Vec<Arc<Registration<T>>>
    where
        F: FnMut(&Registration<T>) -> bool,
    {
        let _guard = self.write_lock.lock();
        let current = self.snapshot.load_full();
        let (removed, kept): (Vec<_>, Vec<_>) = current
            .registrations
            .iter()
            .cloned()
            .partition(|r| remove_if(r.as_ref()));
        if removed.is_empty() {
            return removed;
        }
        self.snapshot.store(Arc::new(Snapshot {
            generation: current.generation + 1,
            registrations: kept,
        }));
        self.cache.lock().clear();
        removed
    }

    pub(crate) fn remove(&self, id: u64) {
        let removed = self.retain(|r| r.id() == id);
        if !removed.is_empty() {
            debug!(registration = id, "Registration cancelled");
        }
    }
}

/// Selector → object mapping with lock-free lookups.
///
/// Cloning a `Registry` yields another handle to the same registrations.
pub struct Registry<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + Sync + 'static> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Registry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_MATCH_CACHE_SIZE)
    }

    #[must_use]
    pub fn with_cache_size(cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            shared: Arc::new(Shared {
                snapshot: ArcSwap::from_pointee(Snapshot {
                    generation: 0,
                    registrations: Vec::new(),
                }),
                write_lock: Mutex::new(()),
                cache: Mutex::new(LruCache::new(capacity)),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Append a subscription. Matches are reported in registration order.
    pub fn register(&self, selector: Selector, object: T) -> Arc<Registration<T>> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Arc::new(Registration::new(
            id,
            selector,
            object,
            Arc::downgrade(&self.shared),
        ));

        {
            let _guard = self.shared.write_lock.lock();
            let current = self.shared.snapshot.load_full();
            let mut registrations = Vec::with_capacity(current.registrations.len() + 1);
            registrations.extend(current.registrations.iter().cloned());
            registrations.push(Arc::clone(&registration));
            self.shared.snapshot.store(Arc::new(Snapshot {
                generation: current.generation + 1,
                registrations,
            }));
            self.shared.cache.lock().clear();
        }

        debug!(
            registration = id,
            selector = %registration.selector(),
            "Registration added"
        );
        registration
    }

    /// Every registration whose selector matches `key`, in registration order
    #[must_use]
    pub fn select(&self, key: &Key) -> Vec<Match<T>> {
        let mut out = Vec::new();
        self.select_into(key, &mut out);
        out
    }

    /// Like [`Registry::select`] but fills a caller-owned vector (cleared first)
    pub fn select_into(&self, key: &Key, out: &mut Vec<Match<T>>) {
        out.clear();
        let snapshot = self.shared.snapshot.load();

        if let Some(cached) = self.shared.cache.lock().get(key) {
            if cached.generation == snapshot.generation {
                out.extend(cached.matches.iter().cloned());
                return;
            }
        }

        for registration in &snapshot.registrations {
            if registration.is_cancelled() {
                continue;
            }
            if let Some(vars) = registration.selector().captures(key) {
                out.push(Match {
                    registration: Arc::clone(registration),
                    vars,
                });
            }
        }

        self.shared.cache.lock().put(
            key.clone(),
            Cached {
                generation: snapshot.generation,
                matches: out.clone(),
            },
        );
    }

    /// Remove every registration whose selector matches `key`. Returns whether any was removed.
    pub fn unregister(&self, key: &Key) -> bool {
        let removed = self.shared.retain(|r| r.selector().matches(key));
        for r in &removed {
            r.mark_cancelled();
        }
        if !removed.is_empty() {
            debug!(key = %key, removed = removed.len(), "Unregistered by key");
        }
        !removed.is_empty()
    }

    /// Remove every registration made with this selector instance (or a clone of it)
    pub fn unregister_selector(&self, selector: &Selector) -> bool {
        let id = selector.id();
        let removed = self.shared.retain(|r| r.selector().id() == id);
        for r in &removed {
            r.mark_cancelled();
        }
        !removed.is_empty()
    }

    pub fn clear(&self) {
        let removed = self.shared.retain(|_| true);
        for r in &removed {
            r.mark_cancelled();
        }
    }

    /// Current registrations, in registration order
    #[must_use]
    pub fn registrations(&self) -> Vec<Arc<Registration<T>>> {
        self.shared.snapshot.load().registrations.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.snapshot.load().registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.shared.snapshot.load();
        f.debug_struct("Registry")
            .field("generation", &snapshot.generation)
            .field("registrations", &snapshot.registrations.len())
            .finish()
    }
}
