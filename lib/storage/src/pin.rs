//! Pinned taxonomies
//!
//! A taxonomy proposed for a field in a given scope is recorded here and
//! reused by later runs, so rerunning a correction does not silently relabel
//! records under a freshly proposed taxonomy. Replacing a pin is an explicit
//! action.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use taxonorm_core::{CanonicalTaxonomy, FilterCondition, Result, ScopeFilter};
use tracing::{info, warn};

use crate::snapshot::{read_json, write_json_atomic};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedTaxonomy {
    pub taxonomy: CanonicalTaxonomy,
    /// Model that proposed the taxonomy
    pub model: String,
    pub pinned_at: DateTime<Utc>,
}

/// Stable key for a scope: `field=value` pairs for equality conditions,
/// JSON for anything else.
pub fn scope_key(scope: &ScopeFilter) -> String {
    if scope.is_empty() {
        return "*".to_string();
    }
    scope
        .conditions()
        .iter()
        .map(|c| match c {
            FilterCondition::Equals { field, value } => match value.as_str() {
                Some(s) => format!("{}={}", field, s),
                None => format!("{}={}", field, value),
            },
            other => serde_json::to_string(other).unwrap_or_default(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn pin_key(scope: &ScopeFilter, field: &str, category_type: &str) -> String {
    format!("{}#{}#{}", scope_key(scope), field, category_type)
}

/// Pins keyed by (scope, field, category type), optionally backed by a JSON file
#[derive(Debug, Default)]
pub struct TaxonomyPinStore {
    path: Option<PathBuf>,
    pins: RwLock<BTreeMap<String, PinnedTaxonomy>>,
}

impl TaxonomyPinStore {
    /// Pins that live only for this process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load pins from `path` (absent file = no pins). Every change is written back.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let stored: BTreeMap<String, PinnedTaxonomy> = read_json(&path)?.unwrap_or_default();

        // Names are revalidated so a hand-edited file cannot smuggle in an empty taxonomy
        let mut pins = BTreeMap::new();
        for (key, pin) in stored {
            match CanonicalTaxonomy::new(pin.taxonomy.category_type(), pin.taxonomy.names()) {
                Ok(taxonomy) => {
                    pins.insert(key, PinnedTaxonomy { taxonomy, ..pin });
                }
                Err(e) => warn!(key = %key, error = %e, "dropping invalid pinned taxonomy"),
            }
        }

        Ok(Self {
            path: Some(path),
            pins: RwLock::new(pins),
        })
    }

    pub fn get(
        &self,
        scope: &ScopeFilter,
        field: &str,
        category_type: &str,
    ) -> Option<PinnedTaxonomy> {
        self.pins
            .read()
            .get(&pin_key(scope, field, category_type))
            .filter(|pin| pin.taxonomy.category_type() == category_type)
            .cloned()
    }

    /// Record (or replace) the taxonomy for a field under the taxonomy's
    /// category type
    pub fn pin(
        &self,
        scope: &ScopeFilter,
        field: &str,
        taxonomy: CanonicalTaxonomy,
        model: &str,
    ) -> Result<PinnedTaxonomy> {
        let pinned = PinnedTaxonomy {
            taxonomy,
            model: model.to_string(),
            pinned_at: Utc::now(),
        };
        let key = pin_key(scope, field, pinned.taxonomy.category_type());
        let mut pins = self.pins.write();
        pins.insert(key.clone(), pinned.clone());
        if let Some(path) = &self.path {
            write_json_atomic(path, &*pins)?;
        }
        info!(key = %key, categories = pinned.taxonomy.len(), "taxonomy pinned");
        Ok(pinned)
    }

    pub fn unpin(&self, scope: &ScopeFilter, field: &str, category_type: &str) -> Result<bool> {
        let mut pins = self.pins.write();
        let removed = pins.remove(&pin_key(scope, field, category_type)).is_some();
        if removed {
            if let Some(path) = &self.path {
                write_json_atomic(path, &*pins)?;
            }
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.pins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn taxonomy(names: &[&str]) -> CanonicalTaxonomy {
        CanonicalTaxonomy::new("职业", names).unwrap()
    }

    #[test]
    fn test_scope_key() {
        assert_eq!(scope_key(&ScopeFilter::all()), "*");
        assert_eq!(
            scope_key(&ScopeFilter::analysis_run("p-1", "auto")),
            "project_code=p-1&solution=auto"
        );
    }

    #[test]
    fn test_pins_are_per_scope_and_field() {
        let store = TaxonomyPinStore::in_memory();
        let run_a = ScopeFilter::analysis_run("p-1", "auto");
        let run_b = ScopeFilter::analysis_run("p-2", "auto");

        store.pin(&run_a, "occupation", taxonomy(&["学生", "职员"]), "m").unwrap();
        assert!(store.get(&run_a, "occupation", "职业").is_some());
        assert!(store.get(&run_b, "occupation", "职业").is_none());
        assert!(store.get(&run_a, "gender", "职业").is_none());
    }

    #[test]
    fn test_pins_are_per_category_type() {
        let store = TaxonomyPinStore::in_memory();
        let scope = ScopeFilter::all();
        let speakers = CanonicalTaxonomy::new("扩音器", ["声音效果"]).unwrap();
        let headphones = CanonicalTaxonomy::new("耳机", ["佩戴舒适"]).unwrap();

        store.pin(&scope, "product_topic_result.topic", speakers, "m").unwrap();
        assert!(store.get(&scope, "product_topic_result.topic", "耳机").is_none());

        store.pin(&scope, "product_topic_result.topic", headphones, "m").unwrap();
        assert_eq!(store.len(), 2);
        let pin = store.get(&scope, "product_topic_result.topic", "扩音器").unwrap();
        assert_eq!(pin.taxonomy.names(), &["声音效果".to_string()]);
    }

    #[test]
    fn test_pins_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pins.json");
        let scope = ScopeFilter::analysis_run("p-1", "auto");

        {
            let store = TaxonomyPinStore::open(&path).unwrap();
            assert!(store.is_empty());
            store
                .pin(&scope, "occupation", taxonomy(&["学生", "职员"]), "gpt-4o-mini")
                .unwrap();
        }

        let reopened = TaxonomyPinStore::open(&path).unwrap();
        let pin = reopened.get(&scope, "occupation", "职业").unwrap();
        assert_eq!(pin.taxonomy.names(), &["学生".to_string(), "职员".to_string()]);
        assert_eq!(pin.model, "gpt-4o-mini");

        assert!(reopened.unpin(&scope, "occupation", "职业").unwrap());
        assert!(TaxonomyPinStore::open(&path).unwrap().is_empty());
    }

    #[test]
    fn test_repin_replaces() {
        let store = TaxonomyPinStore::in_memory();
        let scope = ScopeFilter::all();
        store.pin(&scope, "occupation", taxonomy(&["学生"]), "m").unwrap();
        store.pin(&scope, "occupation", taxonomy(&["职员"]), "m").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&scope, "occupation", "职业").unwrap().taxonomy.names(),
            &["职员".to_string()]
        );
    }
}
