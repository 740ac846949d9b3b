use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use super::core::ParamVec;
use crate::error::{ReactorError, Result};

/// Per-template memo of literal URI → match result
pub const DEFAULT_URI_CACHE_SIZE: usize = 1024;

const NAMED: &str = "([^/.]*)";
const NAMED_SPLAT: &str = "(.*)";
const SPLAT: &str = ".*";

enum Token<'a> {
    Literal(&'a str),
    Named(&'a str),
    NamedSplat(&'a str),
    Splat,
}

/// Compiled URI template.
///
/// Matching is memoized per literal URI, so repeated lookups for a hot key
/// skip the regex entirely.
pub struct UriTemplate {
    template: Arc<str>,
    regex: Regex,
    /// `(name, capture group)` for each distinct variable, in template order
    bindings: Vec<(Arc<str>, usize)>,
    cache: Mutex<LruCache<String, Option<ParamVec>>>,
}

impl UriTemplate {
    pub fn new(template: &str) -> Result<Self> {
        Self::with_cache_size(template, DEFAULT_URI_CACHE_SIZE)
    }

    pub fn with_cache_size(template: &str, cache_size: usize) -> Result<Self> {
        let tokens = tokenize(template);

        let mut pattern = String::with_capacity(template.len() + 16);
        pattern.push('^');
        // (name, group, from_named_splat)
        let mut groups: Vec<(&str, usize, bool)> = Vec::new();
        for token in &tokens {
            match *token {
                Token::Literal(text) => pattern.push_str(&regex::escape(text)),
                Token::Named(name) => {
                    pattern.push_str(NAMED);
                    groups.push((name, groups.len() + 1, false));
                }
                Token::NamedSplat(name) => {
                    pattern.push_str(NAMED_SPLAT);
                    groups.push((name, groups.len() + 1, true));
                }
                Token::Splat => pattern.push_str(SPLAT),
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| {
            ReactorError::configuration(format!("invalid URI template '{}': {}", template, e))
        })?;

        // A name bound by `{name}**` reports that capture; otherwise the first one wins
        let mut bindings: Vec<(Arc<str>, usize)> = Vec::new();
        for &(name, group, _) in &groups {
            if bindings.iter().any(|(n, _)| n.as_ref() == name) {
                continue;
            }
            let chosen = groups
                .iter()
                .find(|(n, _, splat)| *n == name && *splat)
                .map_or(group, |&(_, g, _)| g);
            bindings.push((Arc::from(name), chosen));
        }

        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            template: Arc::from(template),
            regex,
            bindings,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The compiled regular expression
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Distinct variable names, in template order
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(n, _)| n.as_ref())
    }

    #[must_use]
    pub fn matches(&self, uri: &str) -> bool {
        self.match_uri(uri).is_some()
    }

    /// Captured variables for `uri`, or `None` if it does not match
    #[must_use]
    pub fn match_uri(&self, uri: &str) -> Option<ParamVec> {
        if let Some(hit) = self.cache.lock().get(uri) {
            return hit.clone();
        }

        let result = self.regex.captures(uri).map(|caps| {
            self.bindings
                .iter()
                .map(|(name, group)| {
                    let value = caps.get(*group).map_or("", |m| m.as_str());
                    (Arc::clone(name), value.to_string())
                })
                .collect::<ParamVec>()
        });

        self.cache.lock().put(uri.to_string(), result.clone());
        result
    }
}

impl fmt::Debug for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UriTemplate")
            .field("template", &self.template)
            .field("pattern", &self.regex.as_str())
            .finish()
    }
}

/// Left-to-right scan. `{name}**` is tried before `{name}`, and a bare `**`
/// only where no placeholder starts.
fn tokenize(template: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;
    let bytes = template.as_bytes();

    while i < bytes.len() {
        let placeholder = (bytes[i] == b'{')
            .then(|| template[i + 1..].find('}'))
            .flatten()
            .map(|close| (&template[i + 1..i + 1 + close], i + 2 + close))
            .filter(|(name, _)| !name.is_empty() && !name.contains(['/', '{']));

        let (token, next) = if let Some((name, after)) = placeholder {
            if template[after..].starts_with("**") {
                (Token::NamedSplat(name), after + 2)
            } else {
                (Token::Named(name), after)
            }
        } else if template[i..].starts_with("**") {
            (Token::Splat, i + 2)
        } else {
            i += template[i..].chars().next().map_or(1, char::len_utf8);
            continue;
        };

        if literal_start < i {
            tokens.push(Token::Literal(&template[literal_start..i]));
        }
        tokens.push(token);
        i = next;
        literal_start = next;
    }
    if literal_start < template.len() {
        tokens.push(Token::Literal(&template[literal_start..]));
    }
    tokens
}
