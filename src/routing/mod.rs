//! # Routing Module
//!
//! Given the registrations a key matched, decides which consumers run and
//! invokes them.
//!
//! ## Failure Handling
//!
//! Every consumer invocation is isolated: an error or a panic is caught,
//! turned into [`ReactorError::ConsumerInvocation`] and handled without
//! stopping the remaining consumers:
//!
//! 1. the task's error consumer, if one was supplied;
//! 2. otherwise every subscription matching `Key::Error("consumer")` in the
//!    same registry, invoked inline (failures there are only logged);
//! 3. otherwise the failure is returned from [`EventRouter::route`] (the first
//!    one wins) for the dispatcher to surface.

mod consumer;
mod filter;
#[cfg(test)]
mod tests;

pub use consumer::{Consumer, ConsumerResult};
pub use filter::Filter;
pub(crate) use consumer::panic_message;

use smallvec::SmallVec;
use tracing::{debug, error};

use crate::dispatcher::Task;
use crate::error::{ReactorError, Result};
use crate::event::Event;
use crate::registry::{Match, Registry};
use crate::selector::Key;

/// Registry of consumer subscriptions, as held by a reactor
pub type ConsumerRegistry = Registry<Consumer>;

/// Routes a task's event to its matched subscriptions
pub trait EventRouter: Send + Sync {
    fn route(&self, task: &Task, matches: &[Match<Consumer>]) -> Result<()>;
}

/// Default router: applies a [`Filter`] then invokes the selected consumers in order.
#[derive(Debug, Clone, Default)]
pub struct ConsumerFilteringRouter {
    filter: Filter,
}

impl ConsumerFilteringRouter {
    #[must_use]
    pub fn new(filter: Filter) -> Self {
        Self { filter }
    }

    #[must_use]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    fn invoke(&self, task: &Task, m: &Match<Consumer>) -> std::result::Result<(), ReactorError> {
        let registration = &m.registration;
        if !registration.claim() {
            return Ok(());
        }
        let outcome = registration
            .object()
            .invoke_guarded(task.event(), &m.vars)
            .map_err(|message| ReactorError::ConsumerInvocation {
                key: task.key().to_string(),
                registration: registration.id(),
                message,
            });
        if registration.is_cancel_after_use() {
            registration.cancel();
        }
        outcome
    }

    /// Hand a failure to whoever can take it. Returns it back if nobody did.
    fn handle_failure(&self, task: &Task, err: ReactorError) -> Option<ReactorError> {
        if let Some(on_error) = task.error_consumer() {
            on_error(&err);
            return None;
        }
        if !task.key().is_error() && escalate(task.registry(), &err) {
            return None;
        }
        Some(err)
    }
}

impl EventRouter for ConsumerFilteringRouter {
    fn route(&self, task: &Task, matches: &[Match<Consumer>]) -> Result<()> {
        let eligible: SmallVec<[&Match<Consumer>; 8]> = matches
            .iter()
            .filter(|m| !m.registration.is_paused())
            .collect();
        let selected = self.filter.apply(task.key(), &eligible);

        debug!(
            key = %task.key(),
            matched = matches.len(),
            selected = selected.len(),
            filter = self.filter.name(),
            "Routing event"
        );

        let mut unhandled = None;
        for m in selected {
            if let Err(err) = self.invoke(task, m) {
                if let Some(err) = self.handle_failure(task, err) {
                    unhandled.get_or_insert(err);
                }
            }
        }

        if let Some(on_complete) = task.completion_consumer() {
            on_complete(task.event());
        }

        unhandled.map_or(Ok(()), Err)
    }
}

/// Deliver `err` to the error subscriptions of `registry`. Returns whether any ran.
fn escalate(registry: &ConsumerRegistry, err: &ReactorError) -> bool {
    let key = Key::error(err.kind());
    let handlers = registry.select(&key);
    let event = Event::wrap(err.clone());
    let mut delivered = false;

    for m in handlers.iter().filter(|m| m.registration.claim()) {
        delivered = true;
        if let Err(message) = m.registration.object().invoke_guarded(&event, &m.vars) {
            error!(
                registration = m.registration.id(),
                original_error = %err,
                error = %message,
                "Error consumer failed"
            );
        }
        if m.registration.is_cancel_after_use() {
            m.registration.cancel();
        }
    }
    delivered
}
