//! # taxonorm Correction
//!
//! Turns noisy category labels into a canonical taxonomy and writes the
//! result back onto the records.
//!
//! - [`TaxonomyProposer`] / [`ChatProposer`] - LLM-backed taxonomy proposal
//! - [`CorrectionOrchestrator`] - Per-field pipeline and the `run_all` batch
//! - [`RunContext`] / [`RunReport`] - Token accounting and field reports for one run
//! - [`value_counts`] - Raw value observations for scalar fields
//!
//! ## Architecture
//!
//! ```text
//! RecordStore ──> raw values ──> TaxonomyProposer ──> CanonicalTaxonomy
//!                                                          │
//!                     AssignmentTable <── SimilarityAssigner <── Embedder
//!                            │
//!                            └──> RecordStore (update_many write-back)
//! ```

pub mod chat;
pub mod context;
pub mod list_item;
pub mod orchestrator;
pub mod prompts;
pub mod proposer;
pub mod stats;

pub use chat::ChatProposer;
pub use context::{
    CostEstimate, FieldReport, RunContext, RunReport, TokenPrices, WriteBackDiscrepancy,
};
pub use list_item::{read_list, ListItem};
pub use orchestrator::{CorrectionOrchestrator, FieldOutcome, TaxonomyMode};
pub use proposer::{parse_categories, Proposal, ProposalRequest, TaxonomyProposer, TokenUsage};
pub use stats::value_counts;
