//! Field-resolution policies for turning heterogeneous vector payloads into
//! [`RemediationItem`]s.
//!
//! Payloads written by different ingestion runs name the same concept differently
//! (`meta_title`, `chunk_meta_title`, `source_file`, ...). A [`FieldPolicy`] lists the
//! accessors to try in priority order; the first one yielding a non-blank string wins.

use serde_json::Value;

use crate::types::RemediationItem;

/// Hard cap on reference excerpts.
pub const REFERENCE_EXCERPT_CHARS: usize = 400;
/// Stem prefix used as a question-bank title.
pub const STEM_TITLE_CHARS: usize = 140;
/// Stem prefix used as a question-bank excerpt.
pub const STEM_EXCERPT_CHARS: usize = 320;

/// A single way of producing a field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldAccessor {
    /// String value stored under this payload key.
    Key(&'static str),
    /// The first `chars` characters of the string stored under `key`.
    Prefix { key: &'static str, chars: usize },
    /// A constant.
    Literal(&'static str),
}

impl FieldAccessor {
    fn read(&self, payload: &Value) -> Option<String> {
        match self {
            FieldAccessor::Key(key) => non_blank(payload, key).map(str::to_string),
            FieldAccessor::Prefix { key, chars } => {
                non_blank(payload, key).map(|s| truncate_chars(s, *chars))
            }
            FieldAccessor::Literal(value) => Some((*value).to_string()),
        }
    }
}

fn non_blank<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Prioritized accessors for one output field, plus an optional length cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPolicy {
    accessors: Vec<FieldAccessor>,
    max_chars: Option<usize>,
}

impl FieldPolicy {
    pub fn new(accessors: Vec<FieldAccessor>) -> Self {
        Self {
            accessors,
            max_chars: None,
        }
    }

    /// Shorthand for a policy made only of payload keys.
    pub fn keys(keys: &[&'static str]) -> Self {
        Self::new(keys.iter().copied().map(FieldAccessor::Key).collect())
    }

    pub fn then(mut self, accessor: FieldAccessor) -> Self {
        self.accessors.push(accessor);
        self
    }

    pub fn max_chars(mut self, chars: usize) -> Self {
        self.max_chars = Some(chars);
        self
    }

    /// First non-blank value, truncated to `max_chars`.
    pub fn resolve(&self, payload: &Value) -> Option<String> {
        let value = self.accessors.iter().find_map(|accessor| accessor.read(payload))?;
        Some(match self.max_chars {
            Some(limit) => truncate_chars(&value, limit),
            None => value,
        })
    }
}

/// How a payload becomes a [`RemediationItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPolicy {
    pub title: FieldPolicy,
    pub excerpt: FieldPolicy,
    pub source: FieldPolicy,
}

impl ItemPolicy {
    /// Chunks of the reference corpus (textbooks and outlines).
    pub fn reference() -> Self {
        Self {
            title: FieldPolicy::keys(&["meta_title", "chunk_meta_title", "source_file"])
                .then(FieldAccessor::Literal("Reference excerpt")),
            excerpt: FieldPolicy::keys(&["chunk_meta_excerpt", "meta_excerpt", "text"])
                .max_chars(REFERENCE_EXCERPT_CHARS),
            source: FieldPolicy::keys(&["meta_source", "chunk_meta_source", "source_file"]),
        }
    }

    /// Question records stored in a template collection.
    pub fn question_bank() -> Self {
        Self {
            title: FieldPolicy::keys(&["title"]).then(FieldAccessor::Prefix {
                key: "stem",
                chars: STEM_TITLE_CHARS,
            }),
            excerpt: FieldPolicy::keys(&["rationale", "summary"]).then(FieldAccessor::Prefix {
                key: "stem",
                chars: STEM_EXCERPT_CHARS,
            }),
            source: FieldPolicy::keys(&["source"]),
        }
    }

    /// Missing fields never fail: the excerpt defaults to an empty string and the optional
    /// fields stay `None`.
    pub fn apply(&self, id: impl Into<String>, payload: &Value) -> RemediationItem {
        RemediationItem {
            id: id.into(),
            title: self.title.resolve(payload),
            excerpt: self.excerpt.resolve(payload).unwrap_or_default(),
            source: self.source.resolve(payload),
        }
    }
}

/// First `max` characters of `s`. Counts `char`s, so multi-byte text is never split.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}
