//! # Selector Module
//!
//! Routing keys and the predicates that match them.
//!
//! A [`Key`] is what producers notify with; a [`Selector`] is what consumers
//! subscribe with. Matching is a pure function of the selector's compiled
//! pattern and the candidate key, and may capture named variables:
//!
//! ```rust
//! use brrtreactor::selector::{Key, Selector};
//!
//! let sel = Selector::uri("/user/{id}").unwrap();
//! let vars = sel.captures(&Key::from("/user/42")).unwrap();
//! assert_eq!(vars[0].0.as_ref(), "id");
//! assert_eq!(vars[0].1, "42");
//! ```
//!
//! ## URI Templates
//!
//! | Token     | Matches                                     | Captured |
//! |-----------|---------------------------------------------|----------|
//! | `{name}`  | anything except `/` and `.`                 | yes      |
//! | `{name}**`| anything, including `/`                     | yes      |
//! | `**`      | anything, including `/`                     | no       |
//!
//! Everything else in a template is literal text.

mod core;
mod uri_template;

pub use core::{Key, ParamVec, Selector, SelectorId, SelectorKind, MAX_INLINE_VARS};
pub use uri_template::{UriTemplate, DEFAULT_URI_CACHE_SIZE};

/// Look up a captured variable by name (last occurrence wins)
#[inline]
#[must_use]
pub fn var<'a>(vars: &'a ParamVec, name: &str) -> Option<&'a str> {
    vars.iter()
        .rfind(|(k, _)| k.as_ref() == name)
        .map(|(_, v)| v.as_str())
}
