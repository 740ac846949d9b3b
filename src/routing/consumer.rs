use std::any::{type_name, Any};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::event::Event;
use crate::selector::ParamVec;

/// What a consumer body returns. Errors become `ConsumerInvocation` failures.
pub type ConsumerResult = anyhow::Result<()>;

type EventFn = dyn Fn(&Event) -> ConsumerResult + Send + Sync;
type PayloadFn = dyn Fn(&(dyn Any + Send + Sync)) -> Option<ConsumerResult> + Send + Sync;
type VarsFn = dyn Fn(&Event, &ParamVec) -> ConsumerResult + Send + Sync;

/// A subscriber body, tagged with the argument shape it accepts.
#[derive(Clone)]
pub enum Consumer {
    /// Receives the whole envelope
    Event(Arc<EventFn>),
    /// Receives the payload downcast to a concrete type
    Payload {
        expected: &'static str,
        call: Arc<PayloadFn>,
    },
    /// Receives the envelope plus the variables the selector captured
    WithVars(Arc<VarsFn>),
}

impl Consumer {
    pub fn event<F>(f: F) -> Self
    where
        F: Fn(&Event) -> ConsumerResult + Send + Sync + 'static,
    {
        Consumer::Event(Arc::new(f))
    }

    /// Consumer of raw payloads of type `T`.
    ///
    /// An event without a payload, or with a payload of another type, is a
    /// consumer failure.
    pub fn payload<T, F>(f: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> ConsumerResult + Send + Sync + 'static,
    {
        Consumer::Payload {
            expected: type_name::<T>(),
            call: Arc::new(move |data: &(dyn Any + Send + Sync)| {
                data.downcast_ref::<T>().map(&f)
            }),
        }
    }

    pub fn with_vars<F>(f: F) -> Self
    where
        F: Fn(&Event, &ParamVec) -> ConsumerResult + Send + Sync + 'static,
    {
        Consumer::WithVars(Arc::new(f))
    }

    /// Run the body, adapting the event to the accepted shape.
    pub fn invoke(&self, event: &Event, vars: &ParamVec) -> ConsumerResult {
        match self {
            Consumer::Event(f) => f(event),
            Consumer::WithVars(f) => f(event, vars),
            Consumer::Payload { expected, call } => {
                let data = event
                    .payload()
                    .ok_or_else(|| anyhow::anyhow!("expected a {} payload, event has none", expected))?;
                call(data.as_ref()).unwrap_or_else(|| {
                    Err(anyhow::anyhow!("payload is not of the expected type {}", expected))
                })
            }
        }
    }

    /// [`Consumer::invoke`] with panics caught and every failure rendered as text
    pub(crate) fn invoke_guarded(&self, event: &Event, vars: &ParamVec) -> Result<(), String> {
        match catch_unwind(AssertUnwindSafe(|| self.invoke(event, vars))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(panic) => Err(format!("consumer panicked: {}", panic_message(panic.as_ref()))),
        }
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consumer::Event(_) => f.write_str("Consumer::Event"),
            Consumer::Payload { expected, .. } => write!(f, "Consumer::Payload<{}>", expected),
            Consumer::WithVars(_) => f.write_str("Consumer::WithVars"),
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        format!("{panic:?}")
    }
}
