//! Field value codec.
//!
//! A tracker field arrives as JSON `null`, a plain string, a list of
//! strings, or (for built-in fields like `assigned_to`) an object with a
//! `name` member. The codec makes every coercion explicit: raw value →
//! [`FieldValue`] → [`TokenSet`] for reconciliation, and back into the
//! representation the target field expects.
//!
//! Tokens compare by exact string equality; the only normalization is
//! stringification of non-string JSON scalars. Encoded output iterates a
//! [`BTreeSet`], so it is sorted and reproducible across runs.

use serde_json::Value;
use std::collections::BTreeSet;

/// Normalized, deduplicated tokens extracted from a field's content.
pub type TokenSet = BTreeSet<String>;

/// Semantic union of the raw shapes a field value can take.
///
/// JSON `null` and the empty string both map to `Empty`; the tracker
/// uses them interchangeably for "no value".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Empty,
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Build a scalar, collapsing the empty string to `Empty`.
    #[must_use]
    pub fn scalar(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.is_empty() {
            Self::Empty
        } else {
            Self::Scalar(raw)
        }
    }

    /// Decode a raw JSON field value.
    #[must_use]
    pub fn from_json(raw: &Value) -> Self {
        match raw {
            Value::Null => Self::Empty,
            Value::String(s) => Self::scalar(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(json_token).collect()),
            // Built-in reference fields ({"id": 5, "name": "alice"}) read
            // as their display name.
            Value::Object(map) => map.get("name").map_or(Self::Empty, |name| {
                Self::scalar(json_token(name))
            }),
            other => Self::scalar(json_token(other)),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Re-encode for the tracker's update API: `Empty` writes the empty
    /// string (the server rejects `null` text fields).
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::String(String::new()),
            Self::Scalar(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        }
    }
}

/// Stringify a JSON scalar the way the tracker compares it: strings
/// verbatim, numbers and booleans without quotes.
fn json_token(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// How a delimiter-joined string field is split and re-joined.
///
/// The literal two-character CLI token `\n` means "split on line
/// breaks"; everything else is a literal separator string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Separator {
    /// Split on line breaks, join with CRLF (the tracker's long-text
    /// fields store CRLF).
    Lines,
    Literal(String),
}

impl Separator {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw == "\\n" {
            Self::Lines
        } else {
            Self::Literal(raw.to_string())
        }
    }
}

/// Decode a field value into its token set.
///
/// A scalar without a separator is a single token; with one, the string
/// is split on it. List values contribute each element. Duplicates
/// collapse; order is discarded. Empty fragments (stray leading or
/// trailing separators, blank list entries) are dropped, mirroring
/// [`encode`], so a decoded-then-encoded value round-trips instead of
/// resurrecting an empty token the write just removed.
#[must_use]
pub fn decode(value: &FieldValue, separator: Option<&Separator>) -> TokenSet {
    match value {
        FieldValue::Empty => TokenSet::new(),
        FieldValue::List(items) => items
            .iter()
            .filter(|item| !item.is_empty())
            .cloned()
            .collect(),
        FieldValue::Scalar(s) => match separator {
            None => std::iter::once(s.clone()).collect(),
            Some(Separator::Lines) => s
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect(),
            Some(Separator::Literal(sep)) => s
                .split(sep.as_str())
                .filter(|part| !part.is_empty())
                .map(str::to_owned)
                .collect(),
        },
    }
}

/// Encode a merged token set for the target field.
///
/// No separator produces a list; a separator produces a joined string.
/// Empty tokens are dropped so a write never re-introduces null entries,
/// and the sorted set order keeps output deterministic.
#[must_use]
pub fn encode(tokens: &TokenSet, separator: Option<&Separator>) -> FieldValue {
    let kept: Vec<&str> = tokens
        .iter()
        .map(String::as_str)
        .filter(|token| !token.is_empty())
        .collect();

    if kept.is_empty() {
        return FieldValue::Empty;
    }

    match separator {
        None => FieldValue::List(kept.iter().map(|t| (*t).to_owned()).collect()),
        Some(Separator::Lines) => FieldValue::Scalar(kept.join("\r\n")),
        Some(Separator::Literal(sep)) => FieldValue::Scalar(kept.join(sep)),
    }
}
