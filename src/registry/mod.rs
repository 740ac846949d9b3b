//! # Registry Module
//!
//! Maps [`Selector`](crate::selector::Selector)s to registered objects
//! (consumers, reactors) and answers "who matches this key?".
//!
//! ## Concurrency
//!
//! Registrations live in an immutable snapshot that readers load without
//! locking (`arc-swap`). Writers (`register`, `unregister`, `cancel`) are
//! serialized by one mutex and publish a new snapshot with a higher
//! generation. The per-key match cache stores the generation each result was
//! computed against, so a lookup that starts after a write returns can never
//! be served a stale result.
//!
//! Cancelling a registration affects every lookup that starts after
//! [`Registration::cancel`] returns. Matches captured before that point still
//! reference the registration and may still be delivered.

mod core;
mod registration;

pub use core::{Match, Registry, DEFAULT_MATCH_CACHE_SIZE};
pub use registration::Registration;
