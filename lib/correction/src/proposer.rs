//! Taxonomy proposal seam

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taxonorm_core::{Error, FieldShape, Result};

/// Token consumption of one LLM call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// What a proposer is asked to categorize
#[derive(Debug, Clone, Copy)]
pub struct ProposalRequest<'a> {
    /// Distinct non-blank raw values
    pub raw_values: &'a [String],
    /// Human description of the category dimension, e.g. "职业"
    pub category_type: &'a str,
    pub shape: FieldShape,
}

/// Canonical names returned by a proposer, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub categories: Vec<String>,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Proposes a small canonical category set covering a set of raw labels.
///
/// An unusable reply (no `categories`, not a list, empty list) is a
/// [`Error::ProposalFailure`].
#[async_trait]
pub trait TaxonomyProposer: Send + Sync {
    fn model_name(&self) -> &str;

    async fn propose(&self, request: &ProposalRequest<'_>) -> Result<Proposal>;
}

/// Extract the `categories` list from a JSON reply
pub fn parse_categories(content: &str) -> Result<Vec<String>> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| Error::ProposalFailure(format!("reply is not JSON: {}", e)))?;

    let categories = value
        .get("categories")
        .ok_or_else(|| Error::ProposalFailure("reply has no 'categories'".to_string()))?
        .as_array()
        .ok_or_else(|| Error::ProposalFailure("'categories' is not a list".to_string()))?;

    let names: Vec<String> = categories
        .iter()
        .filter_map(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();

    if names.is_empty() {
        return Err(Error::ProposalFailure("'categories' is empty".to_string()));
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_categories() {
        let names = parse_categories(r#"{"categories": ["学生", "职员"]}"#).unwrap();
        assert_eq!(names, vec!["学生".to_string(), "职员".to_string()]);
    }

    #[test]
    fn test_unusable_replies_are_proposal_failures() {
        for reply in [
            "not json",
            r#"{"labels": ["a"]}"#,
            r#"{"categories": "a,b"}"#,
            r#"{"categories": []}"#,
            r#"{"categories": [null, {}]}"#,
        ] {
            assert!(
                matches!(parse_categories(reply), Err(Error::ProposalFailure(_))),
                "accepted {}",
                reply
            );
        }
    }
}
