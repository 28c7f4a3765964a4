//! Subscriber topic filters for feedrelay.
//!
//! A subscriber's filter is stored in the platform attribute blob as
//! either the sentinel string "all", or a mapping from topic key to
//! either "all" or a list of topic values. The dynamic value is decoded
//! once at the platform boundary into the [`FilterValue`] sum type; the
//! fan-out logic never touches raw JSON.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::{RelayError, Result};

/// The sentinel value that matches everything.
pub const FILTER_ALL: &str = "all";

/// Per-key selection inside a structured filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelection {
    /// Every article tagged with this key (category match).
    All,
    /// Only articles carrying "{key} {value}" for one of these values.
    Values(Vec<String>),
}

/// A subscriber's declared interest over article identifier tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// Whole-filter sentinel: receive every article unconditionally.
    All,
    /// Structured per-key filter.
    Keyed(BTreeMap<String, KeySelection>),
}

impl FilterValue {
    /// Decode a filter from its JSON representation.
    ///
    /// Accepts the sentinel string "all", or an object mapping topic
    /// keys to "all" or to arrays of string values. Anything else is a
    /// validation error.
    pub fn from_json(value: &Value) -> Result<FilterValue> {
        match value {
            Value::String(s) if s == FILTER_ALL => Ok(FilterValue::All),
            Value::String(s) => Err(RelayError::Validation(format!(
                "unknown filter sentinel: {s:?}"
            ))),
            Value::Object(map) => {
                let mut keyed = BTreeMap::new();
                for (key, selection) in map {
                    let selection = match selection {
                        Value::String(s) if s == FILTER_ALL => KeySelection::All,
                        Value::String(s) => {
                            return Err(RelayError::Validation(format!(
                                "unknown per-key sentinel for {key:?}: {s:?}"
                            )));
                        }
                        Value::Array(values) => {
                            let mut parsed = Vec::with_capacity(values.len());
                            for v in values {
                                match v {
                                    Value::String(s) => parsed.push(s.clone()),
                                    other => {
                                        return Err(RelayError::Validation(format!(
                                            "non-string filter value for {key:?}: {other}"
                                        )));
                                    }
                                }
                            }
                            KeySelection::Values(parsed)
                        }
                        other => {
                            return Err(RelayError::Validation(format!(
                                "unsupported filter shape for {key:?}: {other}"
                            )));
                        }
                    };
                    keyed.insert(key.clone(), selection);
                }
                Ok(FilterValue::Keyed(keyed))
            }
            other => Err(RelayError::Validation(format!(
                "unsupported filter shape: {other}"
            ))),
        }
    }

    /// Whether this is the whole-filter "all" sentinel.
    pub fn is_all(&self) -> bool {
        matches!(self, FilterValue::All)
    }

    /// Expand into the matchable index of category keys and exact
    /// tokens. The `All` sentinel expands to an empty index; callers
    /// check [`FilterValue::is_all`] first.
    pub fn expand(&self) -> FilterIndex {
        let mut index = FilterIndex::default();
        if let FilterValue::Keyed(keyed) = self {
            for (key, selection) in keyed {
                match selection {
                    KeySelection::All => {
                        index.category_keys.insert(key.clone());
                    }
                    KeySelection::Values(values) => {
                        for value in values {
                            index.tokens.insert(format!("{key} {value}"));
                        }
                    }
                }
            }
        }
        index
    }
}

/// Expanded filter: category-key prefixes and exact "key value" tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterIndex {
    /// Keys whose every tagged article matches (prefix match).
    pub category_keys: BTreeSet<String>,
    /// Exact "{key} {value}" tokens.
    pub tokens: BTreeSet<String>,
}

impl FilterIndex {
    /// Whether an article with the given identifier tokens matches.
    ///
    /// True when any identifier token starts with a category key, or is
    /// exactly present in the token set. Empty sets on either side never
    /// match.
    pub fn matches(&self, article_tokens: &BTreeSet<&str>) -> bool {
        for token in article_tokens {
            if self.tokens.contains(*token) {
                return true;
            }
            for key in &self.category_keys {
                if token.starts_with(key.as_str()) {
                    return true;
                }
            }
        }
        false
    }
}
