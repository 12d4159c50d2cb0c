//! # taxonorm Core
//!
//! Core types for the taxonorm category normalization engine.
//!
//! - [`Record`] - An analysis record (JSON document with an `_id`) and dotted-path access
//! - [`ScopeFilter`] - Predicates restricting reads and write-backs to one analysis run
//! - [`Vector`] - Dense embedding with zero-safe cosine similarity
//! - [`CanonicalTaxonomy`] / [`AssignmentTable`] - Proposed categories and raw -> canonical mapping
//! - [`FieldConfigs`] - The scalar and list fields a run normalizes
//! - [`FieldLifecycle`] - Forward-only per-field state machine
//! - [`RetryPolicy`] - Explicit retry/backoff for collaborator calls
//! - [`SetOperation`] - `$set`-style record update used by write-backs
//!
//! ## Example
//!
//! ```rust
//! use taxonorm_core::{CanonicalTaxonomy, Record, ScopeFilter, Filter, Vector};
//! use serde_json::json;
//!
//! let record = Record::new("r1", json!({
//!     "project_code": "p-1",
//!     "solution": "auto",
//!     "user_profile": {"occupation": "在校生"}
//! })).unwrap();
//! assert!(ScopeFilter::analysis_run("p-1", "auto").matches(&record));
//!
//! let taxonomy = CanonicalTaxonomy::new("职业", ["学生", "职员"]).unwrap();
//! assert_eq!(taxonomy.len(), 2);
//!
//! let a = Vector::new(vec![0.9, 0.1]);
//! let b = Vector::new(vec![1.0, 0.0]);
//! assert!(a.cosine_similarity(&b) > 0.9);
//! ```

pub mod error;
pub mod field;
pub mod filter;
pub mod record;
pub mod retry;
pub mod state;
pub mod taxonomy;
pub mod update;
pub mod vector;

pub use error::{Error, Result};
pub use field::{
    derived_name, FieldConfigs, FieldShape, ListField, ScalarField, CORRECTION_MODEL_FIELD,
    DERIVED_PREFIX,
};
pub use filter::{Filter, FilterCondition, ScopeFilter};
pub use record::{category_label, Record, RecordId, ID_FIELD};
pub use retry::{RecordingSleeper, RetryPolicy, Sleeper, TokioSleeper};
pub use state::{FieldLifecycle, FieldState};
pub use taxonomy::{
    distinct_non_blank, is_blank, AssignmentTable, CanonicalTaxonomy, CategoryAssignment,
    RawCategoryObservation, UNKNOWN_CATEGORY,
};
pub use update::{SetOperation, UpdateResult};
pub use vector::Vector;
