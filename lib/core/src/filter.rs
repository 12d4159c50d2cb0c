// Record predicates used for scoping reads and matching write-backs
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{category_label, Record};

pub trait Filter {
    fn matches(&self, record: &Record) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCondition {
    /// Field equals value. A null value also matches a missing field.
    Equals { field: String, value: Value },
    NotEquals { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    /// Field is present and not null (`exists: true`) or absent/null (`exists: false`).
    Exists { field: String, exists: bool },
    /// The field's category label equals `label`. Values without a label
    /// (missing, null, arrays, objects) read as the empty label.
    Label { field: String, label: String },
    And(Vec<FilterCondition>),
    Or(Vec<FilterCondition>),
    Not(Box<FilterCondition>),
}

impl FilterCondition {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterCondition::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        FilterCondition::Exists {
            field: field.into(),
            exists: false,
        }
    }

    pub fn label(field: impl Into<String>, label: impl Into<String>) -> Self {
        FilterCondition::Label {
            field: field.into(),
            label: label.into(),
        }
    }

    fn matches_record(&self, record: &Record) -> bool {
        match self {
            FilterCondition::Equals { field, value } => match record.get(field) {
                Some(v) => v == value,
                None => value.is_null(),
            },
            FilterCondition::NotEquals { field, value } => match record.get(field) {
                Some(v) => v != value,
                None => !value.is_null(),
            },
            FilterCondition::In { field, values } => record
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            FilterCondition::Exists { field, exists } => {
                let present = record.get(field).map(|v| !v.is_null()).unwrap_or(false);
                present == *exists
            }
            FilterCondition::Label { field, label } => {
                record
                    .get(field)
                    .and_then(category_label)
                    .unwrap_or_default()
                    == *label
            }
            FilterCondition::And(conditions) => conditions.iter().all(|c| c.matches_record(record)),
            FilterCondition::Or(conditions) => conditions.iter().any(|c| c.matches_record(record)),
            FilterCondition::Not(condition) => !condition.matches_record(record),
        }
    }
}

/// A conjunction of conditions restricting an operation to a subset of records.
///
/// The empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeFilter {
    conditions: Vec<FilterCondition>,
}

impl ScopeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// The records of one analysis run, identified by project code and solution.
    pub fn analysis_run(project_code: &str, solution: &str) -> Self {
        Self::all()
            .and(FilterCondition::equals("project_code", project_code))
            .and(FilterCondition::equals("solution", solution))
    }

    #[must_use]
    pub fn and(mut self, condition: FilterCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl Filter for ScopeFilter {
    fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches_record(record))
    }
}

impl Filter for FilterCondition {
    fn matches(&self, record: &Record) -> bool {
        self.matches_record(record)
    }
}
