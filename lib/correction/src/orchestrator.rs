//! Correction orchestrator
//!
//! Drives one field at a time through
//! proposal -> embedding -> assignment -> write-back, tracking each field's
//! [`FieldLifecycle`] and recording a [`FieldReport`] in the [`RunContext`].
//!
//! Failure isolation: a proposal failure ends the field with an empty result
//! and no writes. Embedding and store failures end the field with an error.
//! [`CorrectionOrchestrator::run_all`] logs either and moves on to the next
//! field.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taxonorm_core::{
    distinct_non_blank, is_blank, AssignmentTable, CanonicalTaxonomy, FieldConfigs,
    FieldLifecycle, FieldShape, FieldState, FilterCondition, ListField, RawCategoryObservation,
    Result, ScalarField, ScopeFilter, SetOperation, UpdateResult, CORRECTION_MODEL_FIELD, ID_FIELD,
    UNKNOWN_CATEGORY,
};
use taxonorm_similarity::{Embedder, SimilarityAssigner};
use taxonorm_storage::{RecordStore, TaxonomyPinStore};
use tracing::{debug, error, info, warn};

use crate::context::{FieldReport, RunContext, WriteBackDiscrepancy};
use crate::list_item::read_list;
use crate::proposer::{ProposalRequest, TaxonomyProposer};
use crate::stats::value_counts;

/// Whether a run reuses pinned taxonomies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomyMode {
    /// Reuse the pinned taxonomy when there is one, pin a new proposal otherwise
    #[default]
    Pinned,
    /// Always propose again and replace the pin
    Fresh,
}

/// Result of normalizing one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOutcome {
    pub field: String,
    pub shape: FieldShape,
    pub state: FieldState,
    pub assignments: AssignmentTable,
    pub records_matched: u64,
    pub records_updated: u64,
}

impl FieldOutcome {
    pub fn is_success(&self) -> bool {
        self.state == FieldState::Done
    }

    fn from_report(report: &FieldReport, assignments: AssignmentTable) -> Self {
        Self {
            field: report.field.clone(),
            shape: report.shape,
            state: report.state,
            assignments,
            records_matched: report.records_matched,
            records_updated: report.records_updated,
        }
    }
}

/// Mutable bookkeeping for one field while its pipeline runs
struct FieldRun {
    lifecycle: FieldLifecycle,
    report: FieldReport,
}

impl FieldRun {
    fn new(field: &str, shape: FieldShape, category_type: &str) -> Self {
        Self {
            lifecycle: FieldLifecycle::new(field),
            report: FieldReport::new(field, shape, category_type),
        }
    }

    fn advance(&mut self, next: FieldState) -> Result<()> {
        self.lifecycle.advance(next)?;
        self.report.state = next;
        Ok(())
    }

    fn count(&mut self, result: UpdateResult) {
        self.report.records_matched += result.matched_count;
        self.report.records_updated += result.modified_count;
    }
}

pub struct CorrectionOrchestrator {
    store: Arc<dyn RecordStore>,
    proposer: Arc<dyn TaxonomyProposer>,
    assigner: SimilarityAssigner,
    pins: Arc<TaxonomyPinStore>,
    collection: String,
    profile_root: String,
    mode: TaxonomyMode,
    correction_model: String,
}

impl CorrectionOrchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        proposer: Arc<dyn TaxonomyProposer>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
    ) -> Self {
        let correction_model = proposer.model_name().to_string();
        Self {
            store,
            proposer,
            assigner: SimilarityAssigner::new(embedder),
            pins: Arc::new(TaxonomyPinStore::in_memory()),
            collection: collection.into(),
            profile_root: FieldConfigs::default().profile_root,
            mode: TaxonomyMode::default(),
            correction_model,
        }
    }

    #[must_use]
    pub fn with_pins(mut self, pins: Arc<TaxonomyPinStore>) -> Self {
        self.pins = pins;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: TaxonomyMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_profile_root(mut self, profile_root: impl Into<String>) -> Self {
        self.profile_root = profile_root.into();
        self
    }

    /// Value written to the correction marker attribute
    #[must_use]
    pub fn with_correction_model(mut self, model: impl Into<String>) -> Self {
        self.correction_model = model.into();
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn mode(&self) -> TaxonomyMode {
        self.mode
    }

    /// Normalize one scalar field below the configured profile root.
    ///
    /// `raw_value_counts` are the observations for this field in `scope`
    /// (see [`value_counts`]). Blank values are never sent to the proposer
    /// but are still written back as `unknown`.
    pub async fn normalize_scalar_field(
        &self,
        field: &ScalarField,
        raw_value_counts: &[RawCategoryObservation],
        scope: &ScopeFilter,
        ctx: &mut RunContext,
    ) -> Result<FieldOutcome> {
        self.scalar_field(&self.profile_root, field, raw_value_counts, scope, ctx)
            .await
    }

    /// Normalize a list-of-tagged-items field, rewriting each record's list in
    /// a single update.
    pub async fn normalize_list_field(
        &self,
        list: &ListField,
        scope: &ScopeFilter,
        ctx: &mut RunContext,
    ) -> Result<FieldOutcome> {
        let mut run = FieldRun::new(&list.tag_path(), FieldShape::List, &list.category_type);
        let result = self.list_pipeline(list, scope, ctx, &mut run).await;
        finish(run, result, ctx)
    }

    /// Normalize every configured field, continuing past per-field failures.
    pub async fn run_all(
        &self,
        configs: &FieldConfigs,
        scope: &ScopeFilter,
        ctx: &mut RunContext,
    ) -> Vec<FieldOutcome> {
        let mut outcomes = Vec::with_capacity(configs.scalar.len() + 1);

        if !configs.scalar.is_empty() {
            match value_counts(
                self.store.as_ref(),
                &self.collection,
                &configs.profile_root,
                &configs.scalar,
                scope,
            )
            .await
            {
                Ok(counts) => {
                    for field in &configs.scalar {
                        let observations =
                            counts.get(&field.name).map(Vec::as_slice).unwrap_or(&[]);
                        match self
                            .scalar_field(&configs.profile_root, field, observations, scope, ctx)
                            .await
                        {
                            Ok(outcome) => outcomes.push(outcome),
                            Err(e) => {
                                error!(field = %field.name, error = %e, "field failed, continuing");
                                outcomes.push(last_outcome(ctx));
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "could not count raw values, skipping scalar fields");
                    for field in &configs.scalar {
                        let mut report = FieldReport::new(
                            &field.name,
                            FieldShape::Scalar,
                            &field.category_type,
                        );
                        report.skipped_reason = Some(e.to_string());
                        ctx.record_field(report);
                        outcomes.push(last_outcome(ctx));
                    }
                }
            }
        }

        if let Some(list) = &configs.list {
            match self.normalize_list_field(list, scope, ctx).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(field = %list.tag_path(), error = %e, "field failed, continuing");
                    outcomes.push(last_outcome(ctx));
                }
            }
        }

        let done = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            fields = outcomes.len(),
            done,
            failed = outcomes.len() - done,
            "correction run finished"
        );
        outcomes
    }

    async fn scalar_field(
        &self,
        profile_root: &str,
        field: &ScalarField,
        raw_value_counts: &[RawCategoryObservation],
        scope: &ScopeFilter,
        ctx: &mut RunContext,
    ) -> Result<FieldOutcome> {
        let mut run = FieldRun::new(&field.name, FieldShape::Scalar, &field.category_type);
        let result = self
            .scalar_pipeline(profile_root, field, raw_value_counts, scope, ctx, &mut run)
            .await;
        finish(run, result, ctx)
    }

    async fn scalar_pipeline(
        &self,
        profile_root: &str,
        field: &ScalarField,
        raw_value_counts: &[RawCategoryObservation],
        scope: &ScopeFilter,
        ctx: &mut RunContext,
        run: &mut FieldRun,
    ) -> Result<AssignmentTable> {
        info!(
            field = %field.name,
            category_type = %field.category_type,
            "normalizing scalar field"
        );

        let raw_values: Vec<String> = raw_value_counts.iter().map(|o| o.value.clone()).collect();
        let Some(taxonomy) = self
            .resolve_taxonomy(
                scope,
                &field.name,
                &field.category_type,
                FieldShape::Scalar,
                &raw_values,
                ctx,
                run,
            )
            .await?
        else {
            return Ok(AssignmentTable::new());
        };

        let table = self.embed_and_assign(&raw_values, &taxonomy, run).await?;

        run.advance(FieldState::WritingBack)?;
        let source = field.source_path(profile_root);
        let derived = field.derived_path(profile_root);
        for observation in raw_value_counts {
            let raw = observation.value.as_str();
            // Matches on the same label value_counts observed, so numbers,
            // booleans and unlabeled values are written back too
            let matcher = FilterCondition::label(&source, raw);
            let update = if is_blank(raw) {
                SetOperation::new()
                    .set(&derived, UNKNOWN_CATEGORY)
                    .set(CORRECTION_MODEL_FIELD, self.correction_model.as_str())
            } else {
                SetOperation::new().set(&derived, table.canonical_or_unknown(raw))
            };

            let result = self
                .store
                .update_many(&self.collection, &scope.clone().and(matcher), &update)
                .await?;
            run.count(result);
            check_matched(ctx, &field.name, raw, observation.count, result.matched_count);
        }

        run.advance(FieldState::Done)?;
        info!(
            field = %field.name,
            assignments = table.len(),
            records_updated = run.report.records_updated,
            "scalar field normalized"
        );
        Ok(table)
    }

    async fn list_pipeline(
        &self,
        list: &ListField,
        scope: &ScopeFilter,
        ctx: &mut RunContext,
        run: &mut FieldRun,
    ) -> Result<AssignmentTable> {
        let field = list.tag_path();
        info!(field = %field, category_type = %list.category_type, "normalizing list field");

        let records = self.store.find(&self.collection, scope).await?;
        let lists: Vec<_> = records
            .iter()
            .map(|r| (r.id(), read_list(r.get(&list.path), &list.tag_key)))
            .filter(|(_, items)| !items.is_empty())
            .collect();

        let raw_values: Vec<String> = lists
            .iter()
            .flat_map(|(_, items)| items.iter().map(|i| i.tag().to_string()))
            .collect();
        debug!(
            field = %field,
            records = lists.len(),
            tags = raw_values.len(),
            "list tags collected"
        );

        let Some(taxonomy) = self
            .resolve_taxonomy(
                scope,
                &field,
                &list.category_type,
                FieldShape::List,
                &raw_values,
                ctx,
                run,
            )
            .await?
        else {
            return Ok(AssignmentTable::new());
        };

        let table = self.embed_and_assign(&raw_values, &taxonomy, run).await?;

        run.advance(FieldState::WritingBack)?;
        let derived_key = list.derived_key();
        for (id, items) in lists {
            let rewritten: Vec<Value> = items
                .into_iter()
                .map(|item| {
                    let canonical = table.canonical_or_unknown(item.tag()).to_string();
                    item.with_canonical(&derived_key, &canonical)
                })
                .collect();

            let matcher = scope
                .clone()
                .and(FilterCondition::equals(ID_FIELD, id.to_value()));
            let update = SetOperation::new()
                .set(&list.path, Value::Array(rewritten))
                .set(CORRECTION_MODEL_FIELD, self.correction_model.as_str());

            let result = self.store.update_many(&self.collection, &matcher, &update).await?;
            run.count(result);
            check_matched(ctx, &field, &id.to_string(), 1, result.matched_count);
        }

        run.advance(FieldState::Done)?;
        info!(
            field = %field,
            assignments = table.len(),
            records_updated = run.report.records_updated,
            "list field normalized"
        );
        Ok(table)
    }

    /// Get the taxonomy for a field, from its pin or from the proposer.
    /// `None` means the proposal failed and the field is over.
    #[allow(clippy::too_many_arguments)]
    async fn resolve_taxonomy(
        &self,
        scope: &ScopeFilter,
        field: &str,
        category_type: &str,
        shape: FieldShape,
        raw_values: &[String],
        ctx: &mut RunContext,
        run: &mut FieldRun,
    ) -> Result<Option<CanonicalTaxonomy>> {
        run.advance(FieldState::Proposing)?;

        if self.mode == TaxonomyMode::Pinned {
            if let Some(pin) = self.pins.get(scope, field, category_type) {
                debug!(field, categories = pin.taxonomy.len(), "using pinned taxonomy");
                run.report.taxonomy_pinned = true;
                run.report.taxonomy = pin.taxonomy.names().to_vec();
                run.advance(FieldState::Proposed)?;
                return Ok(Some(pin.taxonomy));
            }
        }

        let candidates = distinct_non_blank(raw_values.iter().map(String::as_str));
        if candidates.is_empty() {
            warn!(field, "no non-blank raw values, nothing to propose from");
            run.report.skipped_reason = Some("no non-blank raw values".to_string());
            run.advance(FieldState::ProposalFailed)?;
            return Ok(None);
        }

        let request = ProposalRequest {
            raw_values: &candidates,
            category_type,
            shape,
        };
        let proposed = match self.proposer.propose(&request).await {
            Ok(proposal) => {
                if let Some(usage) = proposal.usage {
                    ctx.add_usage(&proposal.model, shape.operation(), usage);
                }
                CanonicalTaxonomy::new(category_type, &proposal.categories)
            }
            Err(e) => Err(e),
        };

        let taxonomy = match proposed {
            Ok(taxonomy) => taxonomy,
            Err(e) => {
                warn!(field, error = %e, "taxonomy proposal failed, skipping field");
                run.report.skipped_reason = Some(e.to_string());
                run.advance(FieldState::ProposalFailed)?;
                return Ok(None);
            }
        };

        info!(field, categories = ?taxonomy.names(), "taxonomy proposed");
        if let Err(e) = self.pins.pin(scope, field, taxonomy.clone(), self.proposer.model_name()) {
            warn!(field, error = %e, "could not pin taxonomy");
        }
        run.report.taxonomy = taxonomy.names().to_vec();
        run.advance(FieldState::Proposed)?;
        Ok(Some(taxonomy))
    }

    async fn embed_and_assign(
        &self,
        raw_values: &[String],
        taxonomy: &CanonicalTaxonomy,
        run: &mut FieldRun,
    ) -> Result<AssignmentTable> {
        run.advance(FieldState::Embedding)?;
        let inputs = match self.assigner.embed_inputs(raw_values, taxonomy.names()).await {
            Ok(inputs) => inputs,
            Err(e) => {
                run.report.skipped_reason = Some(e.to_string());
                run.advance(FieldState::EmbedFailed)?;
                return Err(e);
            }
        };
        run.advance(FieldState::Embedded)?;
        debug!(
            field = %run.report.field,
            embedded = inputs.embedded_count(),
            raw = raw_values.len(),
            "raw values embedded"
        );

        run.advance(FieldState::Assigning)?;
        let table = inputs.assign();
        run.advance(FieldState::Assigned)?;
        run.report.assignments = table.pairs();
        Ok(table)
    }
}

/// Record the field's report and turn the pipeline result into an outcome
fn finish(
    mut run: FieldRun,
    result: Result<AssignmentTable>,
    ctx: &mut RunContext,
) -> Result<FieldOutcome> {
    match result {
        Ok(table) => {
            let outcome = FieldOutcome::from_report(&run.report, table);
            ctx.record_field(run.report);
            Ok(outcome)
        }
        Err(e) => {
            if run.report.skipped_reason.is_none() {
                run.report.skipped_reason = Some(e.to_string());
            }
            ctx.record_field(run.report);
            Err(e)
        }
    }
}

fn last_outcome(ctx: &RunContext) -> FieldOutcome {
    match ctx.fields().last() {
        Some(report) => FieldOutcome::from_report(report, AssignmentTable::new()),
        None => FieldOutcome {
            field: String::new(),
            shape: FieldShape::Scalar,
            state: FieldState::Pending,
            assignments: AssignmentTable::new(),
            records_matched: 0,
            records_updated: 0,
        },
    }
}

fn check_matched(ctx: &mut RunContext, field: &str, raw: &str, expected: u64, matched: u64) {
    if matched < expected {
        warn!(field, raw, expected, matched, "write-back matched fewer records than observed");
        ctx.record_discrepancy(WriteBackDiscrepancy {
            field: field.to_string(),
            raw: raw.to_string(),
            expected,
            matched,
        });
    }
}
