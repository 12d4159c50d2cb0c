//! Taxonomy data model
//!
//! Raw labels observed in the corpus, the canonical taxonomy proposed for a
//! field, and the raw -> canonical assignments derived from it.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Sentinel category for blank raw values. Never produced by similarity.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Whether a raw label is empty after trimming
#[inline]
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// A raw category string and the number of in-scope records carrying it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCategoryObservation {
    pub value: String,
    pub count: u64,
    /// Share of scanned records, rounded to 4 decimals
    pub percent: f64,
}

impl RawCategoryObservation {
    pub fn new(value: impl Into<String>, count: u64, total: u64) -> Self {
        let percent = if total > 0 {
            (count as f64 / total as f64 * 10_000.0).round() / 10_000.0
        } else {
            0.0
        };
        Self {
            value: value.into(),
            count,
            percent,
        }
    }

    #[inline]
    pub fn is_blank(&self) -> bool {
        is_blank(&self.value)
    }
}

/// Distinct non-blank values in first-seen order. These are what a taxonomy
/// proposer gets to see.
pub fn distinct_non_blank<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = ahash::AHashSet::new();
    values
        .into_iter()
        .filter(|v| !is_blank(v))
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}

/// Ordered, duplicate-free list of canonical category names for one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTaxonomy {
    category_type: String,
    names: Vec<String>,
}

impl CanonicalTaxonomy {
    /// Validate proposed names: trims each one, drops blanks and the
    /// sentinel, keeps the first occurrence of duplicates. An empty result is
    /// a proposal failure.
    pub fn new<I, S>(category_type: impl Into<String>, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let category_type = category_type.into();
        let mut seen = ahash::AHashSet::new();
        let mut kept = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || name == UNKNOWN_CATEGORY {
                continue;
            }
            if seen.insert(name.to_string()) {
                kept.push(name.to_string());
            }
        }

        if kept.is_empty() {
            return Err(Error::ProposalFailure(format!(
                "no usable categories for '{}'",
                category_type
            )));
        }

        Ok(Self {
            category_type,
            names: kept,
        })
    }

    pub fn category_type(&self) -> &str {
        &self.category_type
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One raw label mapped to exactly one canonical label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub raw: String,
    pub canonical: String,
    /// Cosine similarity of the winning pair; absent for sentinel assignments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl CategoryAssignment {
    pub fn unknown(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            canonical: UNKNOWN_CATEGORY.to_string(),
            similarity: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.similarity.is_none() && self.canonical == UNKNOWN_CATEGORY
    }
}

/// Raw -> canonical mapping preserving the order raw values were assigned in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<CategoryAssignment>", into = "Vec<CategoryAssignment>")]
pub struct AssignmentTable {
    entries: Vec<CategoryAssignment>,
    index: AHashMap<String, usize>,
}

impl AssignmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an assignment; a later assignment for the same raw value replaces the earlier one.
    pub fn insert(&mut self, assignment: CategoryAssignment) {
        match self.index.get(&assignment.raw) {
            Some(&pos) => self.entries[pos] = assignment,
            None => {
                self.index.insert(assignment.raw.clone(), self.entries.len());
                self.entries.push(assignment);
            }
        }
    }

    pub fn get(&self, raw: &str) -> Option<&CategoryAssignment> {
        self.index.get(raw).map(|&pos| &self.entries[pos])
    }

    /// Canonical label for a raw value
    pub fn canonical(&self, raw: &str) -> Option<&str> {
        self.get(raw).map(|a| a.canonical.as_str())
    }

    /// Canonical label for a list item's raw tag: blank and unmapped tags get the sentinel.
    pub fn canonical_or_unknown(&self, raw: &str) -> &str {
        if is_blank(raw) {
            return UNKNOWN_CATEGORY;
        }
        self.canonical(raw).unwrap_or(UNKNOWN_CATEGORY)
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.index.contains_key(raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryAssignment> {
        self.entries.iter()
    }

    /// (raw, canonical) pairs for audit output
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|a| (a.raw.clone(), a.canonical.clone()))
            .collect()
    }
}

impl From<Vec<CategoryAssignment>> for AssignmentTable {
    fn from(entries: Vec<CategoryAssignment>) -> Self {
        let mut table = AssignmentTable::new();
        for entry in entries {
            table.insert(entry);
        }
        table
    }
}

impl From<AssignmentTable> for Vec<CategoryAssignment> {
    fn from(table: AssignmentTable) -> Self {
        table.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_dedups_and_trims() {
        let taxonomy =
            CanonicalTaxonomy::new("职业", ["学生", " 职员 ", "学生", "", UNKNOWN_CATEGORY])
                .unwrap();
        assert_eq!(taxonomy.names(), &["学生".to_string(), "职员".to_string()]);
        assert_eq!(taxonomy.category_type(), "职业");
    }

    #[test]
    fn test_empty_taxonomy_is_proposal_failure() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            CanonicalTaxonomy::new("性别", empty),
            Err(Error::ProposalFailure(_))
        ));
        assert!(matches!(
            CanonicalTaxonomy::new("性别", ["  ", ""]),
            Err(Error::ProposalFailure(_))
        ));
    }

    #[test]
    fn test_distinct_non_blank_keeps_first_seen_order() {
        let values = ["b", "a", " ", "b", "", "c"];
        assert_eq!(distinct_non_blank(values), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_observation_percent() {
        let obs = RawCategoryObservation::new("学生", 1, 3);
        assert_eq!(obs.percent, 0.3333);
        assert_eq!(RawCategoryObservation::new("x", 0, 0).percent, 0.0);
        assert!(RawCategoryObservation::new(" ", 1, 1).is_blank());
    }

    #[test]
    fn test_assignment_table_lookup() {
        let mut table = AssignmentTable::new();
        table.insert(CategoryAssignment {
            raw: "在校生".into(),
            canonical: "学生".into(),
            similarity: Some(0.99),
        });
        table.insert(CategoryAssignment::unknown(""));

        assert_eq!(table.canonical("在校生"), Some("学生"));
        assert_eq!(table.canonical(""), Some(UNKNOWN_CATEGORY));
        assert_eq!(table.canonical_or_unknown("never seen"), UNKNOWN_CATEGORY);
        assert_eq!(table.canonical_or_unknown("  "), UNKNOWN_CATEGORY);
        assert!(table.get("").unwrap().is_unknown());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_assignment_table_serializes_as_list() {
        let mut table = AssignmentTable::new();
        table.insert(CategoryAssignment::unknown(""));
        let json = serde_json::to_value(&table).unwrap();
        assert!(json.is_array());
        let back: AssignmentTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }
}
