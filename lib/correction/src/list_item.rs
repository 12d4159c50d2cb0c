// Tagged list items, normalized once when a record's list is read
use serde_json::{Map, Value};
use taxonorm_core::category_label;

/// One entry of a list field. Every entry is an object; its raw tag is read
/// from `tag_key`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    fields: Map<String, Value>,
    tag: String,
}

impl ListItem {
    /// Objects keep their fields, bare strings become `{tag_key: s}`, and
    /// anything else becomes an object with an empty tag.
    pub fn from_value(value: &Value, tag_key: &str) -> Self {
        match value {
            Value::Object(map) => Self {
                tag: map.get(tag_key).and_then(category_label).unwrap_or_default(),
                fields: map.clone(),
            },
            Value::String(s) => {
                let mut fields = Map::new();
                fields.insert(tag_key.to_string(), Value::String(s.clone()));
                Self {
                    fields,
                    tag: s.clone(),
                }
            }
            _ => {
                let mut fields = Map::new();
                fields.insert(tag_key.to_string(), Value::String(String::new()));
                Self {
                    fields,
                    tag: String::new(),
                }
            }
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The item with `key` set to `canonical`
    pub fn with_canonical(mut self, key: &str, canonical: &str) -> Value {
        self.fields
            .insert(key.to_string(), Value::String(canonical.to_string()));
        Value::Object(self.fields)
    }
}

/// Read a record's list attribute. A missing or non-list attribute is empty.
pub fn read_list(value: Option<&Value>, tag_key: &str) -> Vec<ListItem> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| ListItem::from_value(v, tag_key))
            .collect(),
        _ => Vec::new(),
    }
}
