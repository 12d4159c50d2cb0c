use std::collections::BTreeMap;

use taxonorm_core::{category_label, RawCategoryObservation, Result, ScalarField, ScopeFilter};

use taxonorm_storage::RecordStore;

/// Count raw values of each scalar field over one scan of the scope.
///
/// Missing or null fields count as the empty string; numbers and booleans are
/// stringified. Observations are ordered by descending count, then value.
pub async fn value_counts(
    store: &dyn RecordStore,
    collection: &str,
    profile_root: &str,
    fields: &[ScalarField],
    scope: &ScopeFilter,
) -> Result<BTreeMap<String, Vec<RawCategoryObservation>>> {
    let records = store.find(collection, scope).await?;
    let total = records.len() as u64;

    let mut counters: BTreeMap<&str, BTreeMap<String, u64>> =
        fields.iter().map(|f| (f.name.as_str(), BTreeMap::new())).collect();

    for record in &records {
        for field in fields {
            let value = record
                .get(&field.source_path(profile_root))
                .and_then(category_label)
                .unwrap_or_default();
            if let Some(counter) = counters.get_mut(field.name.as_str()) {
                *counter.entry(value).or_default() += 1;
            }
        }
    }

    Ok(counters
        .into_iter()
        .map(|(field, counter)| {
            let mut observations: Vec<RawCategoryObservation> = counter
                .into_iter()
                .map(|(value, count)| RawCategoryObservation::new(value, count, total))
                .collect();
            observations.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
            (field.to_string(), observations)
        })
        .collect())
}
