//! # Reactor Module
//!
//! The publish/subscribe surface of the crate.
//!
//! A [`Reactor`] owns a consumer registry and is bound to one dispatcher:
//!
//! ```text
//! on(selector, consumer) ──► Registry
//! notify(key, event) ──► Task ──► Dispatcher ──► Registry::select ──► EventRouter ──► consumers
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use brrtreactor::{Consumer, Event, Reactor, Selector, SynchronousDispatcher};
//!
//! let reactor = Reactor::with_dispatcher(Arc::new(SynchronousDispatcher::new("sync")));
//! reactor.on(
//!     Selector::uri("/user/{id}").unwrap(),
//!     Consumer::with_vars(|_, vars| {
//!         assert_eq!(brrtreactor::selector::var(vars, "id"), Some("42"));
//!         Ok(())
//!     }),
//! );
//! reactor.notify("/user/42", Event::empty()).unwrap();
//! ```

mod core;

pub use core::{Reactor, ReactorBuilder};
