//! # BRRTReactor
//!
//! **BRRTReactor** is an in-process, coroutine-friendly event reactor for Rust: a family of
//! pluggable dispatchers combined with a publish/subscribe router that matches keys against
//! exact, regex and URI-template selectors.
//!
//! ## Overview
//!
//! Producers call [`Reactor::notify`] with a key and an [`Event`]. The reactor wraps them in a
//! [`Task`](dispatcher::Task) and hands it to its [`Dispatcher`]; whichever thread the dispatcher
//! runs the task on looks the key up in the reactor's registry and routes the event to the
//! matching consumers. A zero-copy [`Buffer`] and a set of [`codec`]s sit alongside for transport
//! code that turns bytes into events.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - **[`selector`]** - Routing keys, selectors and URI templates
//! - **[`registry`]** - Lock-free subscription registry with a generation-tagged match cache
//! - **[`routing`]** - Consumers, filters (broadcast, round-robin, first) and failure handling
//! - **[`dispatcher`]** - Synchronous, blocking-queue, thread-pool and ring-buffer strategies
//! - **[`reactor`]** - The `on` / `notify` / `receive` surface
//! - **[`environment`]** - Named dispatcher pools, configuration files and a reactor directory
//! - **[`buffer`]** - Growable byte buffer with cursors, views and speculative parsing
//! - **[`codec`]** - Delimited text, JSON and RFC 3164 syslog codecs
//! - **[`telemetry`]** - `tracing` subscriber setup
//! - **[`runtime_config`]** - `may` scheduler settings from the environment
//!
//! ### Event Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant P as Producer
//!     participant R as Reactor
//!     participant D as Dispatcher
//!     participant G as Registry
//!     participant E as EventRouter
//!     participant C as Consumers
//!
//!     P->>R: notify(key, event)
//!     R->>D: dispatch(Task)
//!     Note over D: inline, queue thread,<br/>coroutine pool or ring
//!     D->>G: select(key)
//!     G-->>D: matches + captured vars
//!     D->>E: route(task, matches)
//!     E->>E: apply Filter
//!     E->>C: invoke (panics caught)
//!     C-->>E: Ok / Err
//!     E->>R: escalate failures to Key::Error("consumer")
//!     E->>D: completion consumer
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brrtreactor::{Consumer, Environment, Event, Reactor, Selector};
//!
//! let env = Environment::new().unwrap();
//! let reactor = Reactor::builder(&env).dispatcher_name("sync").build().unwrap();
//!
//! reactor.on(
//!     Selector::exact("greeting"),
//!     Consumer::payload(|name: &String| {
//!         println!("hello, {}", name);
//!         Ok(())
//!     }),
//! );
//! reactor.notify("greeting", Event::wrap("world".to_string())).unwrap();
//! env.shutdown();
//! ```
//!
//! ## Configuration
//!
//! Dispatcher pools come from a YAML, TOML or `.properties` file named by `BRRTR_CONFIG`
//! (see [`environment`]). Logging reads `BRRTR_LOG_*` and the `may` scheduler reads
//! `BRRTR_STACK_SIZE` and `BRRTR_COROUTINE_WORKERS`.
//!
//! ## Runtime Considerations
//!
//! The thread-pool dispatcher runs consumers on `may` coroutines. Consumers scheduled there
//! should avoid blocking OS calls for long periods and keep their stack use within
//! `BRRTR_STACK_SIZE`. The other strategies run consumers on ordinary threads.

pub mod buffer;
pub mod cli;
pub mod codec;
pub mod dispatcher;
pub mod environment;
pub mod error;
pub mod event;
pub mod ids;
pub mod reactor;
pub mod registry;
pub mod routing;
pub mod runtime_config;
pub mod selector;
pub mod telemetry;

pub use buffer::Buffer;
pub use dispatcher::{
    BlockingQueueDispatcher, Dispatcher, DispatcherKind, RingBufferDispatcher,
    SynchronousDispatcher, ThreadPoolDispatcher,
};
pub use environment::{Environment, EnvironmentConfig};
pub use error::{ReactorError, Result};
pub use event::Event;
pub use ids::{EventId, ReactorId};
pub use reactor::Reactor;
pub use registry::{Registration, Registry};
pub use routing::{Consumer, Filter};
pub use selector::{Key, Selector};
