use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use super::core::Shared;
use crate::selector::Selector;

/// Handle owning exactly one subscription.
///
/// Cancellation is idempotent: the first call removes the subscription from
/// its registry, later calls do nothing.
pub struct Registration<T> {
    id: u64,
    selector: Selector,
    object: T,
    cancelled: AtomicBool,
    paused: AtomicBool,
    fire_once: AtomicBool,
    used: AtomicBool,
    registry: Weak<Shared<T>>,
}

impl<T> Registration<T> {
    pub(crate) fn new(id: u64, selector: Selector, object: T, registry: Weak<Shared<T>>) -> Self {
        Self {
            id,
            selector,
            object,
            cancelled: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            fire_once: AtomicBool::new(false),
            used: AtomicBool::new(false),
            registry,
        }
    }

    /// Registry-unique id, never reused
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// The registered object (a consumer, a reactor, ...)
    #[must_use]
    pub fn object(&self) -> &T {
        &self.object
    }

    /// Remove the subscription. Safe to call any number of times.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.registry.upgrade() {
            shared.remove(self.id);
        }
    }

    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Stop delivering to this subscription until [`Registration::resume`]
    pub fn pause(&self) -> &Self {
        self.paused.store(true, Ordering::Release);
        self
    }

    pub fn resume(&self) -> &Self {
        self.paused.store(false, Ordering::Release);
        self
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Deliver at most one more event, then cancel.
    pub fn cancel_after_use(&self) -> &Self {
        self.fire_once.store(true, Ordering::Release);
        self
    }

    #[must_use]
    pub fn is_cancel_after_use(&self) -> bool {
        self.fire_once.load(Ordering::Acquire)
    }

    /// Not cancelled and not paused
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        !self.is_cancelled() && !self.is_paused()
    }

    /// Claim the right to deliver one event.
    ///
    /// Always succeeds for ordinary registrations. A fire-once registration is
    /// claimed by exactly one caller, even across dispatcher threads.
    pub(crate) fn claim(&self) -> bool {
        if self.is_paused() {
            return false;
        }
        if self.is_cancel_after_use() {
            return !self.used.swap(true, Ordering::AcqRel);
        }
        true
    }
}

impl<T> fmt::Debug for Registration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("selector", &self.selector)
            .field("cancelled", &self.is_cancelled())
            .field("paused", &self.is_paused())
            .field("cancel_after_use", &self.is_cancel_after_use())
            .finish()
    }
}
