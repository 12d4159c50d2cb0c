use std::collections::BTreeSet;

use async_trait::async_trait;
use taxonorm_core::{Record, Result, ScopeFilter, SetOperation, UpdateResult};

/// Document store holding analysis records.
///
/// Semantics follow a document database: `find` on an unknown collection
/// yields nothing, `distinct_values` flattens arrays and skips nulls, and
/// `update_many` reports a record as modified only when a value changed.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find(&self, collection: &str, filter: &ScopeFilter) -> Result<Vec<Record>>;

    async fn distinct_values(
        &self,
        collection: &str,
        field_path: &str,
        filter: &ScopeFilter,
    ) -> Result<BTreeSet<String>>;

    async fn update_many(
        &self,
        collection: &str,
        filter: &ScopeFilter,
        update: &SetOperation,
    ) -> Result<UpdateResult>;
}
