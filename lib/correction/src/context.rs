//! Run context
//!
//! One [`RunContext`] is created per correction run and passed explicitly to
//! the orchestrator. It accumulates token usage, per-field reports and
//! write-back discrepancies, and is finished into a [`RunReport`] that can be
//! saved as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taxonorm_core::{FieldShape, FieldState, Result};
use taxonorm_storage::write_json_atomic;
use tracing::{debug, info};
use uuid::Uuid;

use crate::proposer::TokenUsage;

/// Share of total tokens attributed to the prompt when the backend only
/// reports totals
const PROMPT_SHARE: f64 = 0.7;

/// USD price per token
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPrices {
    pub input_per_token: f64,
    pub output_per_token: f64,
}

impl Default for TokenPrices {
    fn default() -> Self {
        Self {
            input_per_token: 0.000_001_5,
            output_per_token: 0.000_002,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// A raw value whose write-back matched fewer records than were observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteBackDiscrepancy {
    pub field: String,
    pub raw: String,
    pub expected: u64,
    pub matched: u64,
}

/// Outcome of normalizing one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldReport {
    pub field: String,
    pub shape: FieldShape,
    pub category_type: String,
    pub state: FieldState,
    /// Canonical names the assignment ran against
    #[serde(default)]
    pub taxonomy: Vec<String>,
    #[serde(default)]
    pub taxonomy_pinned: bool,
    /// (raw, canonical) audit pairs
    #[serde(default)]
    pub assignments: Vec<(String, String)>,
    pub records_matched: u64,
    pub records_updated: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

impl FieldReport {
    pub fn new(
        field: impl Into<String>,
        shape: FieldShape,
        category_type: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            shape,
            category_type: category_type.into(),
            state: FieldState::Pending,
            taxonomy: Vec::new(),
            taxonomy_pinned: false,
            assignments: Vec::new(),
            records_matched: 0,
            records_updated: 0,
            skipped_reason: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == FieldState::Done
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub call_count: u64,
    pub average_tokens_per_call: f64,
    pub tokens_by_model: BTreeMap<String, u64>,
    pub tokens_by_operation: BTreeMap<String, u64>,
    pub cost_estimate: CostEstimate,
    pub fields: Vec<FieldReport>,
    #[serde(default)]
    pub discrepancies: Vec<WriteBackDiscrepancy>,
}

impl RunReport {
    pub fn failed_fields(&self) -> impl Iterator<Item = &FieldReport> {
        self.fields.iter().filter(|f| !f.is_success())
    }

    /// Save as pretty JSON at `<dir>/<run_id>.json`, returning the path
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("{}.json", self.run_id));
        self.save(&path)?;
        Ok(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        info!(path = %path.display(), run_id = %self.run_id, "run report saved");
        Ok(())
    }
}

/// Mutable state of one correction run
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    project_code: Option<String>,
    solution: Option<String>,
    start_time: DateTime<Utc>,
    prices: TokenPrices,
    total_tokens: u64,
    prompt_tokens: u64,
    completion_tokens: u64,
    call_count: u64,
    tokens_by_model: BTreeMap<String, u64>,
    tokens_by_operation: BTreeMap<String, u64>,
    fields: Vec<FieldReport>,
    discrepancies: Vec<WriteBackDiscrepancy>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            project_code: None,
            solution: None,
            start_time: Utc::now(),
            prices: TokenPrices::default(),
            total_tokens: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            call_count: 0,
            tokens_by_model: BTreeMap::new(),
            tokens_by_operation: BTreeMap::new(),
            fields: Vec::new(),
            discrepancies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_scope(
        mut self,
        project_code: impl Into<String>,
        solution: impl Into<String>,
    ) -> Self {
        self.project_code = Some(project_code.into());
        self.solution = Some(solution.into());
        self
    }

    #[must_use]
    pub fn with_prices(mut self, prices: TokenPrices) -> Self {
        self.prices = prices;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record one LLM call. Calls reporting zero tokens are ignored.
    pub fn add_usage(&mut self, model: &str, operation: &str, usage: TokenUsage) {
        let total = if usage.total_tokens > 0 {
            usage.total_tokens
        } else {
            usage.prompt_tokens + usage.completion_tokens
        };
        if total == 0 {
            return;
        }
        self.total_tokens += total;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.call_count += 1;
        *self.tokens_by_model.entry(model.to_string()).or_default() += total;
        *self.tokens_by_operation.entry(operation.to_string()).or_default() += total;
        debug!(tokens = total, model, operation, "token usage recorded");
    }

    pub fn record_field(&mut self, report: FieldReport) {
        self.fields.push(report);
    }

    pub fn record_discrepancy(&mut self, discrepancy: WriteBackDiscrepancy) {
        self.discrepancies.push(discrepancy);
    }

    pub fn fields(&self) -> &[FieldReport] {
        &self.fields
    }

    pub fn discrepancies(&self) -> &[WriteBackDiscrepancy] {
        &self.discrepancies
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    /// Snapshot the run into a report. The context stays usable.
    pub fn report(&self) -> RunReport {
        let end_time = Utc::now();
        let duration = (end_time - self.start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let (prompt_tokens, completion_tokens) =
            if self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens > 0 {
                let prompt = (self.total_tokens as f64 * PROMPT_SHARE) as u64;
                (prompt, self.total_tokens - prompt)
            } else {
                (self.prompt_tokens, self.completion_tokens)
            };

        let input_cost = round6(prompt_tokens as f64 * self.prices.input_per_token);
        let output_cost = round6(completion_tokens as f64 * self.prices.output_per_token);

        let average = if self.call_count > 0 {
            (self.total_tokens as f64 / self.call_count as f64 * 10.0).round() / 10.0
        } else {
            0.0
        };

        RunReport {
            run_id: self.run_id.clone(),
            project_code: self.project_code.clone(),
            solution: self.solution.clone(),
            start_time: self.start_time,
            end_time,
            duration_seconds: duration,
            total_tokens: self.total_tokens,
            prompt_tokens,
            completion_tokens,
            call_count: self.call_count,
            average_tokens_per_call: average,
            tokens_by_model: self.tokens_by_model.clone(),
            tokens_by_operation: self.tokens_by_operation.clone(),
            cost_estimate: CostEstimate {
                input_cost,
                output_cost,
                total_cost: round6(input_cost + output_cost),
            },
            fields: self.fields.clone(),
            discrepancies: self.discrepancies.clone(),
        }
    }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn usage(prompt: u64, completion: u64) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    #[test]
    fn test_usage_accumulates_by_model_and_operation() {
        let mut ctx = RunContext::new();
        ctx.add_usage("gpt-4o-mini", "user_profile_classification", usage(100, 20));
        ctx.add_usage("gpt-4o-mini", "product_topic_classification", usage(200, 40));
        ctx.add_usage("gpt-4o-mini", "user_profile_classification", TokenUsage::default());

        let report = ctx.report();
        assert_eq!(report.total_tokens, 360);
        assert_eq!(report.call_count, 2);
        assert_eq!(report.average_tokens_per_call, 180.0);
        assert_eq!(report.tokens_by_model["gpt-4o-mini"], 360);
        assert_eq!(report.tokens_by_operation["user_profile_classification"], 120);
        assert_eq!(report.prompt_tokens, 300);
    }

    #[test]
    fn test_totals_only_are_split_70_30() {
        let mut ctx = RunContext::new();
        ctx.add_usage(
            "m",
            "op",
            TokenUsage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 1000,
            },
        );
        let report = ctx.report();
        assert_eq!(report.prompt_tokens, 700);
        assert_eq!(report.completion_tokens, 300);
        assert_eq!(report.cost_estimate.input_cost, 0.00105);
        assert_eq!(report.cost_estimate.output_cost, 0.0006);
        assert_eq!(report.cost_estimate.total_cost, 0.00165);
    }

    #[test]
    fn test_report_saved_under_run_id() {
        let dir = tempdir().unwrap();
        let mut ctx = RunContext::new().with_scope("p-1", "auto");
        ctx.record_field(FieldReport::new("occupation", FieldShape::Scalar, "职业"));

        let path = ctx.report().save_to_dir(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), format!("{}.json", ctx.run_id()));

        let saved: RunReport = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved.fields.len(), 1);
        assert_eq!(saved.fields[0].state, FieldState::Pending);
        assert_eq!(saved.project_code.as_deref(), Some("p-1"));
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunContext::new().run_id(), RunContext::new().run_id());
    }
}
