use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::RwLock;
use taxonorm_core::{
    category_label, Filter, Record, RecordId, Result, ScopeFilter, SetOperation, UpdateResult,
};
use tracing::{debug, warn};

use crate::snapshot::{load_snapshot, save_snapshot, SnapshotData};
use crate::store::RecordStore;

/// Records of one collection in insertion order, indexed by id
#[derive(Debug, Default)]
struct RecordCollection {
    records: Vec<Record>,
    index: AHashMap<RecordId, usize>,
}

impl RecordCollection {
    fn upsert(&mut self, record: Record) {
        match self.index.get(record.id()) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.index.insert(record.id().clone(), self.records.len());
                self.records.push(record);
            }
        }
    }
}

/// In-process [`RecordStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, RecordCollection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: SnapshotData) -> Self {
        let store = Self::new();
        for (name, records) in snapshot.collections {
            store.insert_many(&name, records);
        }
        store
    }

    /// Open a store from a snapshot file; a missing file gives an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(load_snapshot(path)?
            .map(Self::from_snapshot)
            .unwrap_or_default())
    }

    pub fn snapshot(&self) -> SnapshotData {
        let collections = self.collections.read();
        let data: BTreeMap<String, Vec<Record>> = collections
            .iter()
            .map(|(name, c)| (name.clone(), c.records.clone()))
            .collect();
        SnapshotData::new(data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_snapshot(path, &self.snapshot())
    }

    /// Insert a record, replacing any record with the same id
    pub fn insert(&self, collection: &str, record: Record) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .upsert(record);
    }

    pub fn insert_many(&self, collection: &str, records: impl IntoIterator<Item = Record>) {
        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_string()).or_default();
        for record in records {
            target.upsert(record);
        }
    }

    pub fn get(&self, collection: &str, id: &RecordId) -> Option<Record> {
        let collections = self.collections.read();
        let c = collections.get(collection)?;
        c.index.get(id).map(|&pos| c.records[pos].clone())
    }

    #[must_use]
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.records.len())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.read().values().all(|c| c.records.is_empty())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find(&self, collection: &str, filter: &ScopeFilter) -> Result<Vec<Record>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|c| {
                c.records
                    .iter()
                    .filter(|r| filter.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn distinct_values(
        &self,
        collection: &str,
        field_path: &str,
        filter: &ScopeFilter,
    ) -> Result<BTreeSet<String>> {
        let collections = self.collections.read();
        let mut values = BTreeSet::new();
        if let Some(c) = collections.get(collection) {
            for record in c.records.iter().filter(|r| filter.matches(r)) {
                values.extend(record.collect(field_path).into_iter().filter_map(category_label));
            }
        }
        Ok(values)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &ScopeFilter,
        update: &SetOperation,
    ) -> Result<UpdateResult> {
        let mut collections = self.collections.write();
        let Some(c) = collections.get_mut(collection) else {
            debug!(collection, "update_many on unknown collection");
            return Ok(UpdateResult::default());
        };

        // Stage every change first so a failing record leaves the collection untouched
        let mut staged = Vec::new();
        let mut result = UpdateResult::default();
        for (pos, record) in c.records.iter().enumerate() {
            if !filter.matches(record) {
                continue;
            }
            result.matched_count += 1;
            let mut updated = record.clone();
            match update.apply(&mut updated) {
                Ok(true) => staged.push((pos, updated)),
                Ok(false) => {}
                Err(e) => {
                    warn!(collection, id = %record.id(), error = %e, "update rejected");
                    return Err(e);
                }
            }
        }

        result.modified_count = staged.len() as u64;
        for (pos, record) in staged {
            c.records[pos] = record;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taxonorm_core::{Error, FilterCondition};
    use tempfile::tempdir;

    fn profile(id: &str, project_code: &str, occupation: &str) -> Record {
        let body = json!({
            "project_code": project_code,
            "solution": "s",
            "user_profile": {"occupation": occupation},
        });
        Record::new(id, body).unwrap()
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_many(
            "analysis",
            vec![
                profile("1", "p", "学生"),
                profile("2", "p", "在校生"),
                profile("3", "p", ""),
                profile("4", "q", "学生"),
            ],
        );
        store
    }

    #[tokio::test]
    async fn test_find_respects_scope() {
        let store = seeded();
        let found = store
            .find("analysis", &ScopeFilter::analysis_run("p", "s"))
            .await
            .unwrap();
        assert_eq!(found.len(), 3);
        assert!(store.find("missing", &ScopeFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_distinct_values() {
        let store = seeded();
        let scope = ScopeFilter::analysis_run("p", "s");
        let values = store
            .distinct_values("analysis", "user_profile.occupation", &scope)
            .await
            .unwrap();
        let expected: BTreeSet<String> =
            ["", "在校生", "学生"].iter().map(|s| s.to_string()).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn test_distinct_flattens_lists() {
        let store = MemoryStore::new();
        let topics = json!([{"topic": "音质"}, {"topic": "续航"}, {"topic": null}]);
        store.insert(
            "analysis",
            Record::new("1", json!({"product_topic_result": topics})).unwrap(),
        );
        let values = store
            .distinct_values("analysis", "product_topic_result.topic", &ScopeFilter::all())
            .await
            .unwrap();
        assert_eq!(values.len(), 2);
    }

    #[tokio::test]
    async fn test_update_many_counts_only_changes() {
        let store = seeded();
        let scope = ScopeFilter::analysis_run("p", "s")
            .and(FilterCondition::equals("user_profile.occupation", "学生"));
        let op = SetOperation::new().set("user_profile.new_occupation", "学生");

        let first = store.update_many("analysis", &scope, &op).await.unwrap();
        assert_eq!(first, UpdateResult { matched_count: 1, modified_count: 1 });

        let second = store.update_many("analysis", &scope, &op).await.unwrap();
        assert_eq!(second, UpdateResult { matched_count: 1, modified_count: 0 });

        // out-of-scope record untouched
        let other = store.get("analysis", &RecordId::from("4")).unwrap();
        assert!(other.get("user_profile.new_occupation").is_none());
    }

    #[tokio::test]
    async fn test_failed_update_leaves_records_untouched() {
        let store = seeded();
        let op = SetOperation::new()
            .set("marker", "x")
            .set("user_profile.occupation.nested", "y");
        let result = store.update_many("analysis", &ScopeFilter::all(), &op).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        let record = store.get("analysis", &RecordId::from("1")).unwrap();
        assert!(record.get("marker").is_none());
    }

    #[test]
    fn test_snapshot_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = seeded();
        store.save(&path).unwrap();

        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.len("analysis"), 4);
        assert_eq!(reopened.list_collections(), vec!["analysis".to_string()]);
        assert!(MemoryStore::open(&dir.path().join("none.json")).unwrap().is_empty());
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let store = MemoryStore::new();
        store.insert("c", Record::new(1u64, json!({"v": 1})).unwrap());
        store.insert("c", Record::new(1u64, json!({"v": 2})).unwrap());
        assert_eq!(store.len("c"), 1);
        assert_eq!(store.get("c", &RecordId::from(1u64)).unwrap().get("v"), Some(&json!(2)));
    }
}
