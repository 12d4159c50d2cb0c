//! # taxonorm Similarity
//!
//! Embedding collaborators and nearest-category assignment.
//!
//! - [`Embedder`] - The seam to the embedding model
//! - [`HashingEmbedder`] - Deterministic feature-hashing embedder, no network needed
//! - [`HttpEmbedder`] - OpenAI-compatible `/embeddings` client with retry
//! - [`SimilarityAssigner`] - Maps raw labels to their closest canonical name
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use taxonorm_similarity::{HashingEmbedder, SimilarityAssigner};
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! let assigner = SimilarityAssigner::new(Arc::new(HashingEmbedder::default()));
//! let raw = vec!["在校大学生".to_string(), "".to_string()];
//! let canonical = vec!["大学生".to_string(), "上班族".to_string()];
//! let table = rt.block_on(assigner.assign(&raw, &canonical)).unwrap();
//! assert_eq!(table.canonical("在校大学生"), Some("大学生"));
//! assert_eq!(table.canonical(""), Some("unknown"));
//! ```
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ raw labels  │────>│  Embedder   │────>│  Assigner   │──> AssignmentTable
//! │ + taxonomy  │     │ (text -> v) │     │ (cos,argmax)│
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```

pub mod assigner;
pub mod embedder;
pub mod remote;

pub use assigner::{nearest_category, sentinel_consistent, EmbeddedInputs, SimilarityAssigner};
pub use embedder::{Embedder, HashingEmbedder, DEFAULT_HASHING_DIM};
pub use remote::HttpEmbedder;
