//! Nearest-category assignment
//!
//! Every non-blank raw label is embedded once, compared by cosine similarity
//! against every canonical name, and assigned to the best match. Ties go to the
//! canonical name that appears first in the taxonomy, so the mapping is a pure
//! function of (raw values, canonical order, vectors). Blank raw labels skip
//! embedding entirely and map to [`UNKNOWN_CATEGORY`].
//!
//! The work is split in two so callers can observe the boundary between the
//! embedding step (may fail, talks to the backend) and the assignment step
//! (pure, cannot fail):
//!
//! ```text
//! SimilarityAssigner::embed_inputs  ->  EmbeddedInputs::assign  ->  AssignmentTable
//! ```

use std::sync::Arc;

use taxonorm_core::{
    is_blank, AssignmentTable, CategoryAssignment, Error, Result, Vector, UNKNOWN_CATEGORY,
};
use tracing::debug;

use crate::embedder::Embedder;

/// Index and similarity of the closest canonical vector. The first maximum wins.
pub fn nearest_category(vector: &Vector, canonical: &[Vector]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, candidate) in canonical.iter().enumerate() {
        let sim = vector.cosine_similarity(candidate);
        match best {
            Some((_, best_sim)) if sim <= best_sim => {}
            _ => best = Some((idx, sim)),
        }
    }
    best
}

/// Raw and canonical labels with their vectors, ready to be assigned
#[derive(Debug, Clone)]
pub struct EmbeddedInputs {
    /// Raw values in caller order, duplicates removed
    order: Vec<String>,
    raw: Vec<(String, Vector)>,
    canonical_names: Vec<String>,
    canonical_vectors: Vec<Vector>,
}

impl EmbeddedInputs {
    /// Assemble inputs from precomputed vectors.
    ///
    /// `raw` holds the non-blank raw values with their vectors; blank values in
    /// `order` need no vector. Every vector must share one dimension.
    pub fn from_vectors(
        order: Vec<String>,
        raw: Vec<(String, Vector)>,
        canonical_names: Vec<String>,
        canonical_vectors: Vec<Vector>,
    ) -> Result<Self> {
        if canonical_names.is_empty() {
            return Err(Error::InvalidInput(
                "cannot assign categories without a canonical set".to_string(),
            ));
        }
        if canonical_names.len() != canonical_vectors.len() {
            return Err(Error::InvalidInput(format!(
                "{} canonical names but {} vectors",
                canonical_names.len(),
                canonical_vectors.len()
            )));
        }

        let dim = canonical_vectors[0].dim();
        for v in canonical_vectors.iter().chain(raw.iter().map(|(_, v)| v)) {
            if v.dim() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: v.dim(),
                });
            }
        }

        Ok(Self {
            order,
            raw,
            canonical_names,
            canonical_vectors,
        })
    }

    /// Non-blank raw values that were embedded
    pub fn embedded_count(&self) -> usize {
        self.raw.len()
    }

    /// Map every raw value to exactly one canonical name.
    pub fn assign(&self) -> AssignmentTable {
        let mut by_raw = ahash::AHashMap::with_capacity(self.raw.len());
        for (raw, vector) in &self.raw {
            // canonical_vectors is non-empty by construction
            if let Some((idx, sim)) = nearest_category(vector, &self.canonical_vectors) {
                by_raw.insert(raw.as_str(), (idx, sim));
            }
        }

        let mut table = AssignmentTable::new();
        for raw in &self.order {
            let assignment = match by_raw.get(raw.as_str()) {
                Some(&(idx, sim)) if !is_blank(raw) => CategoryAssignment {
                    raw: raw.clone(),
                    canonical: self.canonical_names[idx].clone(),
                    similarity: Some(sim),
                },
                _ => CategoryAssignment::unknown(raw.clone()),
            };
            table.insert(assignment);
        }
        table
    }
}

/// Assigns raw labels to canonical names using an [`Embedder`]
#[derive(Clone)]
pub struct SimilarityAssigner {
    embedder: Arc<dyn Embedder>,
}

impl SimilarityAssigner {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Embed each distinct non-blank raw value and each canonical name once.
    ///
    /// Fails with `InvalidInput` on an empty canonical set before any
    /// embedding call is made; embedding failures propagate unchanged.
    pub async fn embed_inputs(
        &self,
        raw_values: &[String],
        canonical_names: &[String],
    ) -> Result<EmbeddedInputs> {
        if canonical_names.is_empty() {
            return Err(Error::InvalidInput(
                "cannot assign categories without a canonical set".to_string(),
            ));
        }

        let mut seen = ahash::AHashSet::new();
        let order: Vec<String> = raw_values
            .iter()
            .filter(|v| seen.insert(v.as_str()))
            .cloned()
            .collect();
        let non_blank: Vec<String> = order.iter().filter(|v| !is_blank(v)).cloned().collect();

        debug!(
            model = self.embedder.model_name(),
            raw = non_blank.len(),
            blank = order.len() - non_blank.len(),
            canonical = canonical_names.len(),
            "embedding category labels"
        );

        let canonical_vectors = self.embedder.embed_batch(canonical_names).await?;
        let raw_vectors = if non_blank.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&non_blank).await?
        };

        if raw_vectors.len() != non_blank.len() {
            return Err(Error::EmbeddingUnavailable(format!(
                "asked for {} embeddings, got {}",
                non_blank.len(),
                raw_vectors.len()
            )));
        }

        EmbeddedInputs::from_vectors(
            order,
            non_blank.into_iter().zip(raw_vectors).collect(),
            canonical_names.to_vec(),
            canonical_vectors,
        )
    }

    /// Embed and assign in one step.
    pub async fn assign(
        &self,
        raw_values: &[String],
        canonical_names: &[String],
    ) -> Result<AssignmentTable> {
        Ok(self.embed_inputs(raw_values, canonical_names).await?.assign())
    }
}

/// Whether an assignment table honours the sentinel rule: blank raw values map
/// to the sentinel and nothing else does.
pub fn sentinel_consistent(table: &AssignmentTable) -> bool {
    table
        .iter()
        .all(|a| is_blank(&a.raw) == (a.canonical == UNKNOWN_CATEGORY && a.similarity.is_none()))
}
