use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Record, Result};

/// A `$set`-style update: dotted path -> new value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetOperation {
    assignments: Vec<(String, Value)>,
}

impl SetOperation {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push((path.into(), value.into()));
        self
    }

    pub fn assignments(&self) -> &[(String, Value)] {
        &self.assignments
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Apply every assignment in order. Returns whether the record changed.
    pub fn apply(&self, record: &mut Record) -> Result<bool> {
        let mut changed = false;
        for (path, value) in &self.assignments {
            changed |= record.set(path, value.clone())?;
        }
        Ok(changed)
    }
}

/// Outcome of an update-many call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched_count: u64,
    /// Records whose stored document actually changed
    pub modified_count: u64,
}

impl UpdateResult {
    pub fn merge(&mut self, other: UpdateResult) {
        self.matched_count += other.matched_count;
        self.modified_count += other.modified_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_reports_change_once() {
        let mut record =
            Record::new("r1", json!({"user_profile": {"occupation": "学生"}})).unwrap();
        let op = SetOperation::new()
            .set("user_profile.new_occupation", "学生")
            .set("second_correction_model", "gpt-4o-mini");

        assert!(op.apply(&mut record).unwrap());
        assert!(!op.apply(&mut record).unwrap());
        assert_eq!(record.get("user_profile.new_occupation"), Some(&json!("学生")));
    }

    #[test]
    fn test_merge_results() {
        let mut total = UpdateResult::default();
        total.merge(UpdateResult { matched_count: 3, modified_count: 2 });
        total.merge(UpdateResult { matched_count: 1, modified_count: 0 });
        assert_eq!(total, UpdateResult { matched_count: 4, modified_count: 2 });
    }
}
