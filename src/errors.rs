//! Error types for formulary.
//!
//! [`ValidationErrors`] is the error model that validators produce and fields consume.  Each key
//! is a field name; the value is a [`FieldErrors`] node whose shape follows the field: a list of
//! messages for a leaf, a nested mapping for an object, and a position-indexed sequence for a
//! list.  [`FormError`] covers the failures that can occur while loading form definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/////////////////////////////////////////////// FieldErrors ///////////////////////////////////////////////

/// Validation errors attached to a single field.
///
/// The JSON shape is the natural one: `["is required"]` for a leaf, `{"name": [...]}` for an
/// object, and `[{"name": [...]}, null]` for a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldErrors {
    /// Human-readable messages for a leaf field.
    Messages(Vec<String>),
    /// Errors for the children of an object field, keyed by child name.
    Object(ValidationErrors),
    /// Errors for the entries of a list field, indexed by position.
    List(Vec<Option<FieldErrors>>),
}

impl FieldErrors {
    /// Creates a leaf error node holding one message.
    pub fn message(message: impl Into<String>) -> Self {
        FieldErrors::Messages(vec![message.into()])
    }

    /// The messages of a leaf node.  Aggregate nodes carry no messages of their own.
    pub fn messages(&self) -> &[String] {
        match self {
            FieldErrors::Messages(messages) => messages,
            _ => &[],
        }
    }

    /// True when the node reports nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldErrors::Messages(messages) => messages.is_empty(),
            FieldErrors::Object(errors) => errors.is_empty(),
            FieldErrors::List(items) => items.iter().flatten().all(FieldErrors::is_empty),
        }
    }

    /// Looks up the errors of a named child of an object node.
    pub fn child(&self, name: &str) -> Option<&FieldErrors> {
        match self {
            FieldErrors::Object(errors) => errors.get(name),
            _ => None,
        }
    }

    /// Looks up the errors of the entry at `index` of a list node.
    pub fn item(&self, index: usize) -> Option<&FieldErrors> {
        match self {
            FieldErrors::List(items) => items.get(index).and_then(Option::as_ref),
            _ => None,
        }
    }

    /// Merges `other` into `self`.  Messages concatenate with `self` first; objects merge key by
    /// key; lists merge position by position.  When the shapes disagree `self` wins.
    pub fn merge(self, other: FieldErrors) -> FieldErrors {
        match (self, other) {
            (FieldErrors::Messages(mut ours), FieldErrors::Messages(theirs)) => {
                ours.extend(theirs);
                FieldErrors::Messages(ours)
            }
            (FieldErrors::Object(ours), FieldErrors::Object(theirs)) => {
                FieldErrors::Object(ours.merge(theirs))
            }
            (FieldErrors::List(ours), FieldErrors::List(theirs)) => {
                let len = ours.len().max(theirs.len());
                let mut ours = ours.into_iter();
                let mut theirs = theirs.into_iter();
                let mut merged = Vec::with_capacity(len);
                for _ in 0..len {
                    let item = match (ours.next().flatten(), theirs.next().flatten()) {
                        (Some(a), Some(b)) => Some(a.merge(b)),
                        (a, b) => a.or(b),
                    };
                    merged.push(item);
                }
                FieldErrors::List(merged)
            }
            (ours, theirs) if ours.is_empty() => theirs,
            (ours, theirs) => {
                if !theirs.is_empty() {
                    tracing::warn!("dropping validation errors with mismatched shape: {:?}", theirs);
                }
                ours
            }
        }
    }
}

impl Default for FieldErrors {
    fn default() -> Self {
        FieldErrors::Messages(Vec::new())
    }
}

//////////////////////////////////////////// ValidationErrors //////////////////////////////////////////////

/// A mapping from field name to that field's errors.
///
/// An absent key and an empty message list both mean "no error".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, FieldErrors>);

impl ValidationErrors {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the natural JSON shape, e.g. `{"login": ["is required"]}`.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Converts back into JSON.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// True when no key carries an error.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(FieldErrors::is_empty)
    }

    /// The number of keys present, including keys whose errors are empty.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The errors for one field.
    pub fn get(&self, name: &str) -> Option<&FieldErrors> {
        self.0.get(name)
    }

    /// The leaf messages for one field, or an empty slice.
    pub fn messages(&self, name: &str) -> &[String] {
        self.0.get(name).map(FieldErrors::messages).unwrap_or(&[])
    }

    /// True when `name` is present.
    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Replaces the errors for one field.
    pub fn insert(&mut self, name: impl Into<String>, errors: FieldErrors) {
        self.0.insert(name.into(), errors);
    }

    /// Appends one message to a leaf field.
    pub fn push(&mut self, name: impl Into<String>, message: impl Into<String>) {
        let name = name.into();
        let errors = self.0.remove(&name).unwrap_or_default();
        self.0
            .insert(name, errors.merge(FieldErrors::message(message)));
    }

    /// Iterates field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Iterates `(name, errors)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldErrors)> {
        self.0.iter()
    }

    /// Merges `other` into `self` key by key; for keys present in both, `self`'s messages come
    /// first.
    pub fn merge(mut self, other: ValidationErrors) -> ValidationErrors {
        for (name, theirs) in other.0 {
            let merged = match self.0.remove(&name) {
                Some(ours) => ours.merge(theirs),
                None => theirs,
            };
            self.0.insert(name, merged);
        }
        self
    }
}

impl FromIterator<(String, FieldErrors)> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = (String, FieldErrors)>>(iter: I) -> Self {
        ValidationErrors(iter.into_iter().collect())
    }
}

///////////////////////////////////////////////// FormError /////////////////////////////////////////////////

/// Errors that can occur while loading form definitions and models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// Reading a file failed.
    Io(String),
    /// A JSON document could not be parsed.
    Json(String),
    /// A YAML document could not be parsed.
    Yaml(String),
    /// The definition parsed but describes an unusable form.
    InvalidDefinition(String),
}

impl std::fmt::Display for FormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "IO error: {}", msg),
            Self::Json(msg) => write!(f, "JSON error: {}", msg),
            Self::Yaml(msg) => write!(f, "YAML error: {}", msg),
            Self::InvalidDefinition(msg) => write!(f, "Invalid form definition: {}", msg),
        }
    }
}

impl std::error::Error for FormError {}

impl From<std::io::Error> for FormError {
    fn from(e: std::io::Error) -> Self {
        FormError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for FormError {
    fn from(e: serde_json::Error) -> Self {
        FormError::Json(e.to_string())
    }
}

impl From<serde_yml::Error> for FormError {
    fn from(e: serde_yml::Error) -> Self {
        FormError::Yaml(e.to_string())
    }
}
