//! Event envelope passed from producers to consumers.

use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::ids::EventId;
use crate::selector::Key;

/// Headers kept inline before spilling to the heap
pub type HeaderVec = SmallVec<[(Arc<str>, String); 4]>;

/// Type-erased, shareable payload
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Envelope around an optional payload, headers and a reply key.
///
/// Every consumer matched by one notification sees the same `Event`
/// instance. The payload slot is replaceable for transformation pipelines
/// that build a new event from an old one.
#[derive(Clone, Default)]
pub struct Event {
    id: EventId,
    data: Option<Payload>,
    headers: HeaderVec,
    reply_to: Option<Key>,
}

impl Event {
    /// An event with no payload
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// An event carrying `data`
    #[must_use]
    pub fn wrap<T: Any + Send + Sync>(data: T) -> Self {
        Self {
            data: Some(Arc::new(data)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Payload downcast to `T`; `None` when absent or of another type
    #[must_use]
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_deref().and_then(|d| d.downcast_ref::<T>())
    }

    #[must_use]
    pub fn payload(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    #[must_use]
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    #[must_use]
    pub fn with_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.set_data(data);
        self
    }

    pub fn set_data<T: Any + Send + Sync>(&mut self, data: T) {
        self.data = Some(Arc::new(data));
    }

    /// Replace the payload with an already shared one
    pub fn set_payload(&mut self, payload: Option<Payload>) {
        self.data = payload;
    }

    /// Header value by name (last occurrence wins)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set a header, replacing an existing value of the same name
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.as_ref() == name) {
            Some((_, v)) => *v = value,
            None => self.headers.push((Arc::from(name), value)),
        }
    }

    /// Key that replies to this event should be notified to
    #[must_use]
    pub fn reply_to(&self) -> Option<&Key> {
        self.reply_to.as_ref()
    }

    #[must_use]
    pub fn with_reply_to(mut self, key: impl Into<Key>) -> Self {
        self.reply_to = Some(key.into());
        self
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("has_data", &self.has_data())
            .field("headers", &self.headers)
            .field("reply_to", &self.reply_to)
            .finish()
    }
}
