//! Record types produced by the extraction pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The value of one record field.
///
/// A field may legitimately be missing from a document, so absence is a
/// variant of its own rather than an `Option` wrapped around every value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Scalar text value.
    Text(String),
    /// The field could not be resolved.
    #[default]
    Absent,
    /// Nested record (by-side or by-category breakdowns).
    Record(Record),
    /// Ordered list of nested records.
    List(Vec<Record>),
    /// Ordered list of scalar strings (collected links).
    Texts(Vec<String>),
}

impl Value {
    /// Returns true if the value is absent.
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Returns the text if this is a scalar.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested record if this is one.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the nested list if this is one.
    pub fn as_list(&self) -> Option<&[Record]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Renders the value as a single tabular cell.
    ///
    /// Scalars are written verbatim, absence as an empty cell, and nested
    /// structures as JSON so they can be re-parsed losslessly.
    pub fn to_cell(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Absent => String::new(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Option<String>> for Value {
    fn from(s: Option<String>) -> Self {
        s.map(Value::Text).unwrap_or(Value::Absent)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

/// A mapping from field name to value.
///
/// Fields are kept sorted by name, so two records with the same content
/// compare and hash equal regardless of the order fields were inserted in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style insert of an absent field.
    pub fn with_absent(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Value::Absent);
        self
    }

    /// Returns the value of a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns the text of a scalar field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }

    /// Removes a field and returns its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Moves every field of `other` into this record.
    pub fn merge(&mut self, other: Record) {
        self.fields.extend(other.fields);
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Field names in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}
