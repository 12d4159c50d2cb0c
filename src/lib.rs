//! # taxonorm
//!
//! Category normalization for e-commerce review analysis.
//!
//! Labeling leaves free-text categories on every review record: occupations
//! written ten different ways, product topics that overlap. taxonorm asks an
//! LLM for a small canonical taxonomy per field, assigns every raw value to
//! its nearest canonical name by embedding similarity, and writes the result
//! back next to the raw value.
//!
//! ## Quick Start
//!
//! ### As a CLI
//!
//! ```bash
//! taxonorm correct --config taxonorm.toml --project-code kinyo-data-10 --solution AI自动打标
//! taxonorm serve --config taxonorm.toml --http-port 6380
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taxonorm::prelude::*;
//!
//! # async fn run(proposer: Arc<dyn TaxonomyProposer>) -> taxonorm::Result<()> {
//! let store = Arc::new(MemoryStore::open(std::path::Path::new("./data/records.json"))?);
//! let embedder = Arc::new(HashingEmbedder::default());
//! let orchestrator = CorrectionOrchestrator::new(store.clone(), proposer, embedder, "analysis_result");
//!
//! let mut ctx = RunContext::new();
//! let scope = ScopeFilter::analysis_run("kinyo-data-10", "AI自动打标");
//! let outcomes = orchestrator.run_all(&FieldConfigs::default(), &scope, &mut ctx).await;
//! println!("{} fields, {} tokens", outcomes.len(), ctx.total_tokens());
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - [`taxonorm-core`](https://docs.rs/taxonorm-core) - Records, filters, taxonomy model, field state machine, retry policy
//! - [`taxonorm-similarity`](https://docs.rs/taxonorm-similarity) - Embedders and the similarity assigner
//! - [`taxonorm-storage`](https://docs.rs/taxonorm-storage) - Record store, JSON snapshots, taxonomy pins
//! - [`taxonorm-correction`](https://docs.rs/taxonorm-correction) - Taxonomy proposal, orchestration, run reports
//! - [`taxonorm-api`](https://docs.rs/taxonorm-api) - Read-only REST API

pub mod config;
pub mod runner;

// Re-export core types
pub use taxonorm_core::{
    AssignmentTable, CanonicalTaxonomy, CategoryAssignment, Error, FieldConfigs, FieldShape,
    FieldState, FilterCondition, ListField, RawCategoryObservation, Record, RecordId, Result,
    RetryPolicy, ScalarField, ScopeFilter, Vector,
};

// Re-export collaborators and storage
pub use taxonorm_similarity::{Embedder, HashingEmbedder, HttpEmbedder, SimilarityAssigner};
pub use taxonorm_storage::{MemoryStore, RecordStore, TaxonomyPinStore};

// Re-export the pipeline
pub use taxonorm_correction::{
    ChatProposer, CorrectionOrchestrator, FieldOutcome, RunContext, RunReport, TaxonomyMode,
    TaxonomyProposer,
};

// Re-export API
pub use taxonorm_api::{ApiState, RestApi};

pub use config::AppConfig;
pub use runner::{run_correction, select_fields, RunMode, RunSummary};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AssignmentTable, CanonicalTaxonomy, CorrectionOrchestrator, Embedder, Error, FieldConfigs,
        HashingEmbedder, MemoryStore, RecordStore, Result, RunContext, ScopeFilter,
        TaxonomyMode, TaxonomyProposer,
    };
}
