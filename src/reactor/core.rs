use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

use crate::dispatcher::{CompletionConsumer, Dispatcher, ErrorConsumer, Task};
use crate::environment::Environment;
use crate::error::Result;
use crate::event::Event;
use crate::ids::ReactorId;
use crate::registry::Registration;
use crate::routing::{Consumer, ConsumerFilteringRouter, ConsumerRegistry, EventRouter, Filter};
use crate::selector::{Key, Selector};

struct Inner {
    id: ReactorId,
    registry: ConsumerRegistry,
    dispatcher: Arc<dyn Dispatcher>,
    router: Arc<dyn EventRouter>,
}

/// Publish/subscribe façade binding a consumer registry to one dispatcher.
///
/// Cloning is cheap and every clone is the same reactor: same id, same
/// registry, same dispatcher.
#[derive(Clone)]
pub struct Reactor {
    inner: Arc<Inner>,
}

impl Reactor {
    /// A reactor on `dispatcher` with a fresh registry and the broadcast filter
    pub fn with_dispatcher(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self::from_parts(
            ConsumerRegistry::new(),
            dispatcher,
            Arc::new(ConsumerFilteringRouter::default()),
        )
    }

    /// Start building a reactor whose dispatcher is looked up in `env`
    pub fn builder(env: &Environment) -> ReactorBuilder<'_> {
        ReactorBuilder::new(env)
    }

    fn from_parts(
        registry: ConsumerRegistry,
        dispatcher: Arc<dyn Dispatcher>,
        router: Arc<dyn EventRouter>,
    ) -> Self {
        let id = ReactorId::new();
        debug!(reactor_id = %id, dispatcher = %dispatcher.name(), "Reactor created");
        Self {
            inner: Arc::new(Inner {
                id,
                registry,
                dispatcher,
                router,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> ReactorId {
        self.inner.id
    }

    #[must_use]
    pub fn registry(&self) -> &ConsumerRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.inner.dispatcher
    }

    /// Subscribe `consumer` to every key `selector` matches
    pub fn on(&self, selector: Selector, consumer: Consumer) -> Arc<Registration<Consumer>> {
        self.inner.registry.register(selector, consumer)
    }

    /// Subscribe to escalated consumer failures. The payload is the [`crate::ReactorError`].
    pub fn on_error(&self, consumer: Consumer) -> Arc<Registration<Consumer>> {
        self.on(Selector::errors(), consumer)
    }

    /// Request/reply: the value `f` returns is notified to the incoming event's
    /// `reply_to` key. Events without a reply key are consumed and the reply dropped.
    pub fn receive<F>(&self, selector: Selector, f: F) -> Arc<Registration<Consumer>>
    where
        F: Fn(&Event) -> anyhow::Result<Event> + Send + Sync + 'static,
    {
        let reactor = Arc::downgrade(&self.inner);
        self.on(
            selector,
            Consumer::event(move |event| {
                let reply = f(event)?;
                match event.reply_to() {
                    Some(reply_to) => reply_with(&reactor, reply_to.clone(), reply),
                    None => {
                        trace!(event_id = %event.id(), "No reply key, reply dropped");
                        Ok(())
                    }
                }
            }),
        )
    }

    /// Notify `key` with `event`.
    ///
    /// Errors are about scheduling: a stopped or saturated dispatcher. A
    /// synchronous dispatcher also returns the first consumer failure nobody
    /// handled.
    pub fn notify(&self, key: impl Into<Key>, event: Event) -> Result<()> {
        self.notify_with(key, event, None, None)
    }

    /// Notify `key` with an empty event
    pub fn notify_key(&self, key: impl Into<Key>) -> Result<()> {
        self.notify(key, Event::empty())
    }

    /// Notify with a completion consumer (run after all consumers) and an error
    /// consumer (receives consumer failures instead of escalation)
    pub fn notify_with(
        &self,
        key: impl Into<Key>,
        event: Event,
        on_complete: Option<CompletionConsumer>,
        on_error: Option<ErrorConsumer>,
    ) -> Result<()> {
        let key = key.into();
        trace!(
            reactor_id = %self.inner.id,
            key = %key,
            event_id = %event.id(),
            dispatcher = %self.inner.dispatcher.name(),
            "Notify"
        );
        let task = Task::new(
            key,
            event,
            self.inner.registry.clone(),
            Arc::clone(&self.inner.router),
        )
        .with_completion(on_complete)
        .with_error_consumer(on_error);
        self.inner.dispatcher.dispatch(task)
    }
}

fn reply_with(reactor: &Weak<Inner>, key: Key, reply: Event) -> anyhow::Result<()> {
    let Some(inner) = reactor.upgrade() else {
        warn!(key = %key, "Reactor dropped before reply could be sent");
        return Ok(());
    };
    Reactor { inner }.notify(key, reply)?;
    Ok(())
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("id", &self.inner.id)
            .field("dispatcher", &self.inner.dispatcher.name())
            .field("registrations", &self.inner.registry.len())
            .finish()
    }
}

enum DispatcherChoice {
    Default,
    Named(String),
    Instance(Arc<dyn Dispatcher>),
}

/// Builder for a [`Reactor`] bound to an [`Environment`]
pub struct ReactorBuilder<'a> {
    env: &'a Environment,
    dispatcher: DispatcherChoice,
    filter: Filter,
    router: Option<Arc<dyn EventRouter>>,
    registry: Option<ConsumerRegistry>,
}

impl<'a> ReactorBuilder<'a> {
    fn new(env: &'a Environment) -> Self {
        Self {
            env,
            dispatcher: DispatcherChoice::Default,
            filter: Filter::default(),
            router: None,
            registry: None,
        }
    }

    /// Use the environment's dispatcher pool called `name`
    #[must_use]
    pub fn dispatcher_name(mut self, name: impl Into<String>) -> Self {
        self.dispatcher = DispatcherChoice::Named(name.into());
        self
    }

    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = DispatcherChoice::Instance(dispatcher);
        self
    }

    /// Delivery policy; ignored when a custom router is set
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn router(mut self, router: Arc<dyn EventRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Share an existing registry, linking this reactor's subscriptions to another's
    #[must_use]
    pub fn registry(mut self, registry: ConsumerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Fails with `DispatcherNotFound` when the named (or default) pool is empty
    pub fn build(self) -> Result<Reactor> {
        let dispatcher = match self.dispatcher {
            DispatcherChoice::Default => self.env.default_dispatcher()?,
            DispatcherChoice::Named(name) => self.env.dispatcher(&name)?,
            DispatcherChoice::Instance(d) => d,
        };
        let router = self
            .router
            .unwrap_or_else(|| Arc::new(ConsumerFilteringRouter::new(self.filter)));
        Ok(Reactor::from_parts(
            self.registry.unwrap_or_default(),
            dispatcher,
            router,
        ))
    }
}
