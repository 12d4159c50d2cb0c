//! One `correct` invocation: load the snapshot, normalize the selected
//! fields, persist the snapshot and the run report.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taxonorm_core::FieldConfigs;
use taxonorm_correction::{CorrectionOrchestrator, RunContext, RunReport, TaxonomyProposer};
use taxonorm_similarity::Embedder;
use taxonorm_storage::{MemoryStore, TaxonomyPinStore};
use tracing::{error, info, warn};

use crate::config::AppConfig;

/// Which group of fields a run covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    #[default]
    All,
    /// Scalar profile fields only
    UserProfile,
    /// The list field only
    ProductTopic,
}

/// Narrow the configured fields to `mode`, and to a single scalar field when
/// `field` is given.
pub fn select_fields(
    fields: &FieldConfigs,
    mode: RunMode,
    field: Option<&str>,
) -> Result<FieldConfigs> {
    if let Some(name) = field {
        if mode == RunMode::ProductTopic {
            bail!("--field selects a profile field and cannot be combined with product-topic");
        }
        return match fields.only_scalar(name) {
            Some(only) => Ok(only),
            None => {
                let known: Vec<&str> = fields.scalar.iter().map(|f| f.name.as_str()).collect();
                bail!("unknown field '{}', expected one of: {}", name, known.join(", "))
            }
        };
    }

    let mut selected = fields.clone();
    match mode {
        RunMode::All => {}
        RunMode::UserProfile => selected.list = None,
        RunMode::ProductTopic => selected.scalar.clear(),
    }
    if selected.scalar.is_empty() && selected.list.is_none() {
        bail!("no fields selected for mode {:?}", mode);
    }
    Ok(selected)
}

/// Result of a finished run
#[derive(Debug)]
pub struct RunSummary {
    pub report: RunReport,
    pub report_path: PathBuf,
}

/// Run the correction over the snapshot named in `config`.
///
/// Per-field failures end up in the report; only store, pin or report I/O
/// aborts the run.
pub async fn run_correction(
    config: &AppConfig,
    fields: &FieldConfigs,
    proposer: Arc<dyn TaxonomyProposer>,
    embedder: Arc<dyn Embedder>,
    report_path: Option<&Path>,
) -> Result<RunSummary> {
    let snapshot_path = &config.store.snapshot_path;
    let store = Arc::new(
        MemoryStore::open(snapshot_path)
            .with_context(|| format!("loading snapshot {}", snapshot_path.display()))?,
    );
    info!(
        snapshot = %snapshot_path.display(),
        collection = %config.store.collection,
        records = store.len(&config.store.collection),
        "Record store loaded"
    );

    let pin_file = &config.taxonomy.pin_file;
    let pins = Arc::new(
        TaxonomyPinStore::open(pin_file)
            .with_context(|| format!("loading taxonomy pins {}", pin_file.display()))?,
    );

    let mut orchestrator = CorrectionOrchestrator::new(
        store.clone(),
        proposer,
        embedder,
        config.store.collection.clone(),
    )
    .with_pins(pins)
    .with_mode(config.taxonomy.mode)
    .with_profile_root(fields.profile_root.clone());
    if let Some(marker) = &config.llm.correction_marker {
        orchestrator = orchestrator.with_correction_model(marker.clone());
    }

    let mut ctx = RunContext::new().with_prices(config.report.prices);
    if let (Some(code), Some(solution)) = (&config.scope.project_code, &config.scope.solution) {
        ctx = ctx.with_scope(code.clone(), solution.clone());
    }
    info!(run_id = %ctx.run_id(), mode = ?config.taxonomy.mode, "Starting correction run");

    let outcomes = orchestrator.run_all(fields, &config.scope.filter(), &mut ctx).await;
    for outcome in &outcomes {
        if outcome.is_success() {
            info!(
                field = %outcome.field,
                matched = outcome.records_matched,
                updated = outcome.records_updated,
                "Field corrected"
            );
        } else {
            warn!(field = %outcome.field, state = %outcome.state, "Field not corrected");
        }
    }

    store
        .save(snapshot_path)
        .with_context(|| format!("saving snapshot {}", snapshot_path.display()))?;

    let report = ctx.report();
    let report_path = match report_path {
        Some(path) => {
            report.save(path)?;
            path.to_path_buf()
        }
        None => report.save_to_dir(&config.report.dir)?,
    };

    let failed = report.failed_fields().count();
    if failed > 0 {
        error!(failed, total = report.fields.len(), "Some fields were not corrected");
    }
    info!(
        total_tokens = report.total_tokens,
        cost = report.cost_estimate.total_cost,
        report = %report_path.display(),
        "Correction run finished"
    );

    Ok(RunSummary { report, report_path })
}
