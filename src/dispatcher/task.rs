use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

use crate::error::{ReactorError, Result};
use crate::event::Event;
use crate::registry::Match;
use crate::routing::{panic_message, Consumer, ConsumerRegistry, EventRouter};
use crate::selector::Key;

/// Called once after every selected consumer ran
pub type CompletionConsumer = Arc<dyn Fn(&Event) + Send + Sync>;

/// Receives consumer failures in place of escalation
pub type ErrorConsumer = Arc<dyn Fn(&ReactorError) + Send + Sync>;

/// One scheduled unit of work.
///
/// A task is owned by exactly one dispatcher at a time; dispatchers move it
/// between threads but never share it.
pub struct Task {
    key: Key,
    event: Arc<Event>,
    registry: ConsumerRegistry,
    router: Arc<dyn EventRouter>,
    on_complete: Option<CompletionConsumer>,
    on_error: Option<ErrorConsumer>,
}

impl Task {
    pub fn new(
        key: Key,
        event: impl Into<Arc<Event>>,
        registry: ConsumerRegistry,
        router: Arc<dyn EventRouter>,
    ) -> Self {
        Self {
            key,
            event: event.into(),
            registry,
            router,
            on_complete: None,
            on_error: None,
        }
    }

    #[must_use]
    pub fn with_completion(mut self, on_complete: Option<CompletionConsumer>) -> Self {
        self.on_complete = on_complete;
        self
    }

    #[must_use]
    pub fn with_error_consumer(mut self, on_error: Option<ErrorConsumer>) -> Self {
        self.on_error = on_error;
        self
    }

    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }

    #[must_use]
    pub fn registry(&self) -> &ConsumerRegistry {
        &self.registry
    }

    #[must_use]
    pub fn completion_consumer(&self) -> Option<&CompletionConsumer> {
        self.on_complete.as_ref()
    }

    #[must_use]
    pub fn error_consumer(&self) -> Option<&ErrorConsumer> {
        self.on_error.as_ref()
    }

    /// Look up the matches for the key and route the event to them.
    ///
    /// This is the shared final step of every dispatcher. `scratch` is cleared
    /// and reused for the match list.
    pub fn execute(&self, scratch: &mut Vec<Match<Consumer>>) -> Result<()> {
        self.registry.select_into(&self.key, scratch);
        let outcome = self.router.route(self, scratch);
        scratch.clear();
        outcome
    }

    /// [`Task::execute`] on a dispatcher thread: nothing escapes, failures are logged.
    ///
    /// Returns `false` when the task failed.
    pub(crate) fn run_detached(&self, dispatcher: &str, scratch: &mut Vec<Match<Consumer>>) -> bool {
        match catch_unwind(AssertUnwindSafe(|| self.execute(scratch))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(
                    dispatcher = %dispatcher,
                    key = %self.key,
                    error = %e,
                    "Unhandled consumer failure"
                );
                false
            }
            Err(panic) => {
                scratch.clear();
                error!(
                    dispatcher = %dispatcher,
                    key = %self.key,
                    panic_message = %panic_message(panic.as_ref()),
                    "Task panicked outside a consumer"
                );
                false
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.key)
            .field("event", &self.event.id())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
