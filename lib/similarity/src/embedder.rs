//! Embedders
//!
//! The [`Embedder`] trait is the seam to the embedding model. [`HashingEmbedder`]
//! is a deterministic, model-free implementation: character trigrams and
//! whitespace-separated words are hashed into a fixed number of buckets and the
//! result is L2-normalized. It needs no network and gives stable vectors, which
//! makes it the default for offline runs and tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use taxonorm_core::{Result, Vector};

/// Default dimension for hashed embeddings
pub const DEFAULT_HASHING_DIM: usize = 256;

/// Maps text to a fixed-dimension dense vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, recorded in reports
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vector>;

    /// Embed several texts. Semantically one `embed` per text; implementations
    /// may override with a batched call.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Feature-hashing embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
    name: String,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIM)
    }
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self {
            dim,
            name: format!("hashing-{}", dim),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embed synchronously; blank text maps to the zero vector.
    pub fn embed_text(&self, text: &str) -> Vector {
        let mut vector = vec![0.0f32; self.dim];
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return Vector::new(vector);
        }

        for trigram in trigrams(&normalized) {
            vector[self.bucket(&trigram)] += 1.0;
        }

        // Words contribute more than trigrams
        for word in normalized.split_whitespace() {
            vector[self.bucket(word)] += 2.0;
        }

        let mut vector = Vector::new(vector);
        vector.normalize();
        vector
    }

    fn bucket<T: Hash + ?Sized>(&self, feature: &T) -> usize {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        (hasher.finish() as usize) % self.dim
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Vector> {
        Ok(self.embed_text(text))
    }
}

/// Character trigrams of a space-padded string
fn trigrams(s: &str) -> Vec<String> {
    let padded = format!("  {}  ", s);
    let chars: Vec<char> = padded.chars().collect();

    if chars.len() < 3 {
        return Vec::new();
    }

    let mut seen = ahash::AHashSet::new();
    chars
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_text_same_vector() {
        let embedder = HashingEmbedder::new(64);
        let v1 = embedder.embed_text("hello world");
        let v2 = embedder.embed_text("hello world");
        let v3 = embedder.embed_text("goodbye moon");

        assert_eq!(v1.dim(), 64);
        assert_eq!(v1, v2);
        assert_ne!(v1, v3);
        assert!((v1.norm() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_blank_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        let v = embedder.embed_text("   ");
        assert_eq!(v.norm(), 0.0);
    }

    #[test]
    fn test_shared_characters_raise_similarity() {
        let embedder = HashingEmbedder::default();
        let student = embedder.embed_text("大学生");
        let student_alt = embedder.embed_text("在校大学生");
        let office = embedder.embed_text("上班族");
        assert!(student.cosine_similarity(&student_alt) > student.cosine_similarity(&office));
    }

    #[test]
    fn test_trigrams_of_short_cjk_text() {
        let grams = trigrams("学生");
        assert!(grams.contains(&" 学生".to_string()));
        assert!(grams.contains(&"学生 ".to_string()));
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let embedder = HashingEmbedder::new(32);
        let batch = embedder
            .embed_batch(&["a b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(batch[0], embedder.embed("a b").await.unwrap());
        assert_eq!(batch[1], embedder.embed("c").await.unwrap());
        assert_eq!(embedder.model_name(), "hashing-32");
    }
}
