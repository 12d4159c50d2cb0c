//! OpenAI-compatible chat completions proposer

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use taxonorm_core::{Error, Result, RetryPolicy, Sleeper, TokioSleeper};
use tracing::{debug, info};

use crate::prompts::{classification_prompt, SYSTEM_PROMPT};
use crate::proposer::{parse_categories, Proposal, ProposalRequest, TaxonomyProposer, TokenUsage};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatProposer {
    client: Client,
    api_base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ChatProposer {
    pub fn new(api_base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("chat client: {}", e)))?;
        let base_url = if api_base_url.is_empty() {
            OPENAI_API_BASE.to_string()
        } else {
            api_base_url.trim_end_matches('/').to_string()
        };
        Ok(Self {
            client,
            api_base_url: base_url,
            api_key: None,
            model: model.into(),
            temperature: None,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retry = retry;
        self.sleeper = sleeper;
        self
    }

    async fn complete(&self, prompt: &str) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.api_base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: self.temperature,
            stream: false,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, text);
            // Client errors other than rate limiting will not improve on retry
            return Err(if status.is_client_error() && status.as_u16() != 429 {
                Error::ProposalFailure(message)
            } else {
                Error::Transport(message)
            });
        }

        response
            .json()
            .await
            .map_err(|e| Error::ProposalFailure(format!("malformed completion: {}", e)))
    }
}

/// Turn a completion into a proposal
fn into_proposal(response: ChatResponse, requested_model: &str) -> Result<Proposal> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::ProposalFailure("completion has no content".to_string()))?;

    Ok(Proposal {
        categories: parse_categories(&content)?,
        model: response.model.unwrap_or_else(|| requested_model.to_string()),
        usage: response.usage,
    })
}

#[async_trait]
impl TaxonomyProposer for ChatProposer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn propose(&self, request: &ProposalRequest<'_>) -> Result<Proposal> {
        let prompt =
            classification_prompt(request.shape, request.raw_values, request.category_type);
        debug!(
            model = %self.model,
            category_type = request.category_type,
            raw = request.raw_values.len(),
            "requesting taxonomy"
        );

        let response = self
            .retry
            .run(self.sleeper.as_ref(), "propose_taxonomy", || self.complete(&prompt))
            .await
            .map_err(|e| match e {
                Error::Transport(msg) => Error::ProposalFailure(msg),
                other => other,
            })?;

        let proposal = into_proposal(response, &self.model)?;
        info!(
            model = %proposal.model,
            category_type = request.category_type,
            categories = proposal.categories.len(),
            tokens = proposal.usage.map(|u| u.total_tokens).unwrap_or(0),
            "taxonomy proposed"
        );
        Ok(proposal)
    }
}
