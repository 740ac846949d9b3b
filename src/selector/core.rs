use regex::Regex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use ulid::Ulid;

use super::uri_template::UriTemplate;
use crate::error::{ReactorError, Result};

/// Captured variables kept inline before spilling to the heap.
/// Templates rarely carry more than a handful of placeholders.
pub const MAX_INLINE_VARS: usize = 8;

/// Captured `(name, value)` pairs, in template order.
///
/// Names are `Arc<str>` shared with the compiled selector; values are
/// per-key data.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_VARS]>;

/// Routing key used both to subscribe and to notify
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Text(Arc<str>),
    Int(i64),
    /// Anonymous process-unique tag
    Tag(Ulid),
    /// Error-kind key, the target of failure escalation
    Error(Arc<str>),
}

impl Key {
    /// A fresh key nobody else can produce by accident
    #[must_use]
    pub fn unique() -> Self {
        Key::Tag(Ulid::new())
    }

    #[must_use]
    pub fn error(kind: &str) -> Self {
        Key::Error(Arc::from(kind))
    }

    /// Text form of `Text` keys; `None` for every other kind
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Key::Error(_))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Text(s) => f.write_str(s),
            Key::Int(i) => write!(f, "{}", i),
            Key::Tag(id) => write!(f, "tag:{}", id),
            Key::Error(kind) => write!(f, "error:{}", kind),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(Arc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(Arc::from(s))
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<Ulid> for Key {
    fn from(id: Ulid) -> Self {
        Key::Tag(id)
    }
}

/// Identity of a selector instance, stable across clones
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SelectorId(u64);

impl SelectorId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SelectorId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SelectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sel-{}", self.0)
    }
}

/// The closed set of matching strategies
#[derive(Debug)]
pub enum SelectorKind {
    /// Equality against one key
    Exact(Key),
    /// Full match of a regular expression against `Text` keys
    Regex(Regex),
    /// URI template with named captures
    Uri(UriTemplate),
    /// Every `Key::Error`
    Errors,
}

/// Immutable, cheaply cloneable key predicate.
#[derive(Clone)]
pub struct Selector {
    id: SelectorId,
    kind: Arc<SelectorKind>,
}

impl Selector {
    fn from_kind(kind: SelectorKind) -> Self {
        Self {
            id: SelectorId::next(),
            kind: Arc::new(kind),
        }
    }

    /// Match keys equal to `key`
    #[must_use]
    pub fn exact(key: impl Into<Key>) -> Self {
        Self::from_kind(SelectorKind::Exact(key.into()))
    }

    /// Match `Text` keys that the regular expression matches in full.
    ///
    /// Named groups are captured by name, unnamed ones as `group1`, `group2`, ...
    pub fn regex(pattern: &str) -> Result<Self> {
        let anchored = format!("^(?:{})$", pattern);
        let regex = Regex::new(&anchored).map_err(|e| {
            ReactorError::configuration(format!("invalid selector regex '{}': {}", pattern, e))
        })?;
        Ok(Self::from_kind(SelectorKind::Regex(regex)))
    }

    /// Match `Text` keys against a URI template (`{name}`, `{name}**`, `**`)
    pub fn uri(template: &str) -> Result<Self> {
        Ok(Self::from_kind(SelectorKind::Uri(UriTemplate::new(template)?)))
    }

    /// Match every error-kind key
    #[must_use]
    pub fn errors() -> Self {
        Self::from_kind(SelectorKind::Errors)
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> SelectorId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> &SelectorKind {
        &self.kind
    }

    #[must_use]
    pub fn matches(&self, key: &Key) -> bool {
        match self.kind.as_ref() {
            SelectorKind::Exact(k) => k == key,
            SelectorKind::Regex(re) => key.as_text().is_some_and(|s| re.is_match(s)),
            SelectorKind::Uri(template) => key.as_text().is_some_and(|s| template.matches(s)),
            SelectorKind::Errors => key.is_error(),
        }
    }

    /// `None` when the key does not match; otherwise the captured variables
    #[must_use]
    pub fn captures(&self, key: &Key) -> Option<ParamVec> {
        match self.kind.as_ref() {
            SelectorKind::Exact(_) | SelectorKind::Errors => {
                self.matches(key).then(ParamVec::new)
            }
            SelectorKind::Regex(re) => {
                let caps = re.captures(key.as_text()?)?;
                let mut vars = ParamVec::new();
                for (i, name) in re.capture_names().enumerate().skip(1) {
                    if let Some(m) = caps.get(i) {
                        let name: Arc<str> = match name {
                            Some(n) => Arc::from(n),
                            None => Arc::from(format!("group{}", i)),
                        };
                        vars.push((name, m.as_str().to_string()));
                    }
                }
                Some(vars)
            }
            SelectorKind::Uri(template) => template.match_uri(key.as_text()?),
        }
    }
}

impl From<Key> for Selector {
    fn from(key: Key) -> Self {
        Selector::exact(key)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("id", &self.id)
            .field("kind", &self.to_string())
            .finish()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.as_ref() {
            SelectorKind::Exact(k) => write!(f, "exact({})", k),
            SelectorKind::Regex(re) => write!(f, "regex({})", re.as_str()),
            SelectorKind::Uri(t) => write!(f, "uri({})", t.template()),
            SelectorKind::Errors => f.write_str("errors"),
        }
    }
}
