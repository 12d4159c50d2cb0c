//! TOML configuration for the `taxonorm` binary.
//!
//! Every section is optional; a missing file section falls back to the
//! defaults below, which reproduce the stock review-analysis setup.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use taxonorm_core::{FieldConfigs, FilterCondition, RetryPolicy, ScopeFilter, TokioSleeper};
use taxonorm_correction::{ChatProposer, TaxonomyMode, TokenPrices};
use taxonorm_similarity::{Embedder, HashingEmbedder, HttpEmbedder, DEFAULT_HASHING_DIM};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub scope: ScopeConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retry: RetryPolicy,
    pub taxonomy: TaxonomyConfig,
    pub report: ReportConfig,
    pub fields: FieldConfigs,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot holding the record collections
    pub snapshot_path: PathBuf,
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("./data/records.json"),
            collection: "analysis_result".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub project_code: Option<String>,
    pub solution: Option<String>,
}

impl ScopeConfig {
    pub fn filter(&self) -> ScopeFilter {
        match (&self.project_code, &self.solution) {
            (Some(code), Some(solution)) => ScopeFilter::analysis_run(code, solution),
            (Some(code), None) => {
                ScopeFilter::all().and(FilterCondition::equals("project_code", code.as_str()))
            }
            (None, Some(solution)) => {
                ScopeFilter::all().and(FilterCondition::equals("solution", solution.as_str()))
            }
            (None, None) => ScopeFilter::all(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Empty means the public OpenAI endpoint
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
    /// Written to `second_correction_model`; the model name when unset
    pub correction_marker: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key_env: "OPEN_AI_KEY".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: None,
            timeout_secs: 60,
            correction_marker: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Offline feature hashing
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: Option<usize>,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            model: "BAAI/bge-base-zh".to_string(),
            dimension: None,
            base_url: "http://127.0.0.1:8080/v1".to_string(),
            api_key_env: "EMBEDDING_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    pub mode: TaxonomyMode,
    pub pin_file: PathBuf,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            mode: TaxonomyMode::Pinned,
            pin_file: PathBuf::from("./data/taxonomy_pins.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub dir: PathBuf,
    pub prices: TokenPrices,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./reports"),
            prices: TokenPrices::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub http_port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { http_port: 6380 }
    }
}

impl AppConfig {
    /// Read `path`, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("No configuration file given, using defaults");
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;

        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.collection.is_empty() {
            bail!("store.collection must not be empty");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be > 0");
        }
        if self.retry.multiplier < 1.0 {
            bail!("retry.multiplier must be >= 1.0");
        }
        if let Some(t) = self.llm.temperature {
            if !(0.0..=2.0).contains(&t) {
                bail!("llm.temperature must be between 0.0 and 2.0");
            }
        }
        if self.embedding.dimension == Some(0) {
            bail!("embedding.dimension must be > 0");
        }
        if self.fields.scalar.is_empty() && self.fields.list.is_none() {
            bail!("no fields configured");
        }
        Ok(())
    }

    pub fn build_proposer(&self) -> Result<ChatProposer> {
        let proposer = ChatProposer::new(
            &self.llm.base_url,
            self.llm.model.clone(),
            Duration::from_secs(self.llm.timeout_secs),
        )?
        .with_api_key(std::env::var(&self.llm.api_key_env).ok())
        .with_temperature(self.llm.temperature)
        .with_retry(self.retry.clone(), Arc::new(TokioSleeper));
        Ok(proposer)
    }

    pub fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        let embedding = &self.embedding;
        let embedder: Arc<dyn Embedder> = match embedding.provider {
            EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(
                embedding.dimension.unwrap_or(DEFAULT_HASHING_DIM),
            )),
            EmbeddingProvider::Http => Arc::new(
                HttpEmbedder::new(
                    embedding.base_url.clone(),
                    embedding.model.clone(),
                    Duration::from_secs(embedding.timeout_secs),
                )?
                .with_api_key(std::env::var(&embedding.api_key_env).ok())
                .with_dimension(embedding.dimension)
                .with_retry(self.retry.clone(), Arc::new(TokioSleeper)),
            ),
        };
        Ok(embedder)
    }
}
