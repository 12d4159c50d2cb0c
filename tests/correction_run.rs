// End-to-end correction runs over a snapshot file
use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taxonorm::{run_correction, select_fields, AppConfig, RunMode, TaxonomyMode};
use taxonorm_core::{Error, FieldState, RecordId, Result};
use taxonorm_correction::{Proposal, ProposalRequest, RunReport, TaxonomyProposer, TokenUsage};
use taxonorm_similarity::HashingEmbedder;
use taxonorm_storage::{read_json, MemoryStore};
use tempfile::tempdir;

/// Proposes the distinct non-blank raw values back as the taxonomy
struct EchoProposer {
    calls: AtomicUsize,
}

impl EchoProposer {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaxonomyProposer for EchoProposer {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn propose(&self, request: &ProposalRequest<'_>) -> Result<Proposal> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.raw_values.is_empty() {
            return Err(Error::ProposalFailure("nothing to classify".to_string()));
        }
        Ok(Proposal {
            categories: request.raw_values.to_vec(),
            model: "echo".to_string(),
            usage: Some(TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 20,
                total_tokens: 120,
            }),
        })
    }
}

fn write_snapshot(path: &Path) {
    let records = json!({
        "analysis_result": [
            {"_id": "r1", "project_code": "kinyo-data-10", "solution": "auto",
             "user_profile": {"occupation": "学生", "gender": "女"},
             "product_topic_result": [{"topic": "音质", "sentiment": "正面"}, "续航"]},
            {"_id": "r2", "project_code": "kinyo-data-10", "solution": "auto",
             "user_profile": {"occupation": "教师", "gender": "  "},
             "product_topic_result": [{"topic": "续航"}]},
            {"_id": "r3", "project_code": "kinyo-data-10", "solution": "auto",
             "user_profile": {"gender": "男"}},
            {"_id": "r4", "project_code": "other", "solution": "auto",
             "user_profile": {"occupation": "学生", "gender": "女"}}
        ]
    });
    std::fs::write(path, serde_json::to_vec_pretty(&records).unwrap()).unwrap();
}

fn config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.store.snapshot_path = dir.join("records.json");
    config.taxonomy.pin_file = dir.join("pins.json");
    config.report.dir = dir.join("reports");
    config.scope.project_code = Some("kinyo-data-10".to_string());
    config.scope.solution = Some("auto".to_string());
    config.fields = toml_fields();
    config
}

fn toml_fields() -> taxonorm_core::FieldConfigs {
    let config: AppConfig = toml::from_str(
        r#"
        [fields]
        profile_root = "user_profile"

        [[fields.scalar]]
        name = "occupation"
        category_type = "职业"

        [[fields.scalar]]
        name = "gender"
        category_type = "性别"

        [fields.list]
        category_type = "扩音器"
        "#,
    )
    .unwrap();
    config.fields
}

fn reload(config: &AppConfig, id: &str) -> serde_json::Value {
    let store = MemoryStore::open(&config.store.snapshot_path).unwrap();
    let record = store
        .get(&config.store.collection, &RecordId::from(id))
        .unwrap();
    serde_json::Value::from(record)
}

#[tokio::test]
async fn test_full_run_writes_snapshot_and_report() {
    let dir = tempdir().unwrap();
    let mut config = config(dir.path());
    config.store.collection = "analysis_result".to_string();
    write_snapshot(&config.store.snapshot_path);

    let proposer = Arc::new(EchoProposer::new());
    let fields = select_fields(&config.fields, RunMode::All, None).unwrap();
    let summary = run_correction(
        &config,
        &fields,
        proposer.clone(),
        Arc::new(HashingEmbedder::new(64)),
        None,
    )
    .await
    .unwrap();

    // one proposal per field
    assert_eq!(proposer.calls(), 3);
    assert_eq!(summary.report.fields.len(), 3);
    assert!(summary.report.fields.iter().all(|f| f.state == FieldState::Done));
    assert_eq!(summary.report.total_tokens, 360);
    assert!(summary.report_path.starts_with(dir.path().join("reports")));

    let saved: RunReport = read_json(&summary.report_path).unwrap().unwrap();
    assert_eq!(saved.run_id, summary.report.run_id);
    assert_eq!(saved.project_code.as_deref(), Some("kinyo-data-10"));

    let r1 = reload(&config, "r1");
    assert_eq!(r1["user_profile"]["new_occupation"], "学生");
    assert_eq!(r1["user_profile"]["new_gender"], "女");
    assert_eq!(r1["product_topic_result"][0]["new_topic"], "音质");
    assert_eq!(r1["product_topic_result"][0]["sentiment"], "正面");
    assert_eq!(r1["product_topic_result"][1], json!({"topic": "续航", "new_topic": "续航"}));

    let r2 = reload(&config, "r2");
    assert_eq!(r2["user_profile"]["new_gender"], "unknown");
    assert_eq!(r2["second_correction_model"], "echo");

    // missing raw value counts as blank
    let r3 = reload(&config, "r3");
    assert_eq!(r3["user_profile"]["new_occupation"], "unknown");

    // out of scope
    let r4 = reload(&config, "r4");
    assert!(r4["user_profile"].get("new_occupation").is_none());
}

#[tokio::test]
async fn test_pinned_taxonomy_survives_between_runs() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    write_snapshot(&config.store.snapshot_path);
    let fields = select_fields(&config.fields, RunMode::UserProfile, Some("occupation")).unwrap();

    let first = Arc::new(EchoProposer::new());
    run_correction(&config, &fields, first.clone(), Arc::new(HashingEmbedder::new(64)), None)
        .await
        .unwrap();
    assert_eq!(first.calls(), 1);
    assert!(config.taxonomy.pin_file.exists());

    let second = Arc::new(EchoProposer::new());
    let summary = run_correction(
        &config,
        &fields,
        second.clone(),
        Arc::new(HashingEmbedder::new(64)),
        None,
    )
    .await
    .unwrap();
    assert_eq!(second.calls(), 0);
    assert!(summary.report.fields[0].taxonomy_pinned);
    assert_eq!(summary.report.fields[0].records_updated, 0);

    let mut fresh = config.clone();
    fresh.taxonomy.mode = TaxonomyMode::Fresh;
    let third = Arc::new(EchoProposer::new());
    run_correction(&fresh, &fields, third.clone(), Arc::new(HashingEmbedder::new(64)), None)
        .await
        .unwrap();
    assert_eq!(third.calls(), 1);
}

#[tokio::test]
async fn test_explicit_report_path_and_missing_snapshot() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let report_path = dir.path().join("token_usage.json");
    let fields = select_fields(&config.fields, RunMode::ProductTopic, None).unwrap();

    let proposer = Arc::new(EchoProposer::new());
    let summary = run_correction(
        &config,
        &fields,
        proposer,
        Arc::new(HashingEmbedder::new(64)),
        Some(&report_path),
    )
    .await
    .unwrap();

    assert_eq!(summary.report_path, report_path);
    assert!(report_path.exists());
    // empty store: nothing to propose from
    assert_eq!(summary.report.fields[0].state, FieldState::ProposalFailed);
    assert!(config.store.snapshot_path.exists());
}

#[tokio::test]
async fn test_configured_correction_marker() {
    let dir = tempdir().unwrap();
    let mut config = config(dir.path());
    config.llm.correction_marker = Some("gpt-4o-mini@2nd-pass".to_string());
    write_snapshot(&config.store.snapshot_path);
    let fields = select_fields(&config.fields, RunMode::UserProfile, Some("gender")).unwrap();

    run_correction(
        &config,
        &fields,
        Arc::new(EchoProposer::new()),
        Arc::new(HashingEmbedder::new(64)),
        None,
    )
    .await
    .unwrap();

    let r2 = reload(&config, "r2");
    assert_eq!(r2["user_profile"]["new_gender"], "unknown");
    assert_eq!(r2["second_correction_model"], "gpt-4o-mini@2nd-pass");
}
