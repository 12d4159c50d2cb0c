use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Attribute holding a record's identity inside its document
pub const ID_FIELD: &str = "_id";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Integer(u64),
    String(String),
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::String(s) => write!(f, "{}", s),
            RecordId::Integer(i) => write!(f, "{}", i),
        }
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::String(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::String(s.to_string())
    }
}

impl From<u64> for RecordId {
    fn from(i: u64) -> Self {
        RecordId::Integer(i)
    }
}

impl RecordId {
    pub fn to_value(&self) -> Value {
        match self {
            RecordId::String(s) => Value::String(s.clone()),
            RecordId::Integer(i) => Value::from(*i),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(RecordId::String(s.clone())),
            Value::Number(n) => n.as_u64().map(RecordId::Integer),
            _ => None,
        }
    }
}

/// An analysis record: a JSON document carrying an `_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Record {
    id: RecordId,
    doc: Map<String, Value>,
}

impl Record {
    /// Build a record from a document body, stamping the id into it.
    pub fn new(id: impl Into<RecordId>, body: Value) -> Result<Self> {
        let id = id.into();
        let mut doc = match body {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::InvalidInput(format!(
                    "record body must be an object, got {}",
                    type_name(&other)
                )))
            }
        };
        doc.insert(ID_FIELD.to_string(), id.to_value());
        Ok(Self { id, doc })
    }

    #[inline]
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    #[inline]
    pub fn doc(&self) -> &Map<String, Value> {
        &self.doc
    }

    /// Look up a dotted path without descending into arrays.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.doc.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Collect every value reachable through a dotted path, descending into
    /// arrays at each step and flattening arrays found at the leaf.
    pub fn collect<'a>(&'a self, path: &str) -> Vec<&'a Value> {
        let mut out = Vec::new();
        let segments: Vec<&str> = path.split('.').collect();
        if let Some((first, rest)) = segments.split_first() {
            if let Some(value) = self.doc.get(*first) {
                collect_into(value, rest, &mut out);
            }
        }
        out
    }

    /// Set a dotted path, creating intermediate objects. Returns whether the
    /// stored value changed.
    pub fn set(&mut self, path: &str, value: Value) -> Result<bool> {
        if path == ID_FIELD {
            return Err(Error::InvalidInput("cannot overwrite _id".to_string()));
        }

        let segments: Vec<&str> = path.split('.').collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| Error::InvalidInput("empty field path".to_string()))?;

        let mut current = &mut self.doc;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if entry.is_null() {
                *entry = Value::Object(Map::new());
            }
            current = entry.as_object_mut().ok_or_else(|| {
                Error::InvalidInput(format!(
                    "cannot set '{}': '{}' is not an object",
                    path, segment
                ))
            })?;
        }

        if current.get(*last) == Some(&value) {
            return Ok(false);
        }
        current.insert(last.to_string(), value);
        Ok(true)
    }
}

fn collect_into<'a>(value: &'a Value, rest: &[&str], out: &mut Vec<&'a Value>) {
    match (value, rest.split_first()) {
        (Value::Array(items), _) => {
            for item in items {
                collect_into(item, rest, out);
            }
        }
        (_, None) => out.push(value),
        (Value::Object(map), Some((segment, tail))) => {
            if let Some(child) = map.get(*segment) {
                collect_into(child, tail, out);
            }
        }
        _ => {}
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a scalar JSON value as a category label.
///
/// Strings are taken verbatim, numbers and booleans are stringified, and
/// everything else (null, arrays, objects) has no label.
pub fn category_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl TryFrom<Value> for Record {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let id = value
            .get(ID_FIELD)
            .and_then(RecordId::from_value)
            .ok_or_else(|| {
                Error::InvalidInput("record is missing a string or integer _id".to_string())
            })?;
        Record::new(id, value)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.doc)
    }
}
