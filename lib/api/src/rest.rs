use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taxonorm_core::{FilterCondition, ScopeFilter};
use taxonorm_correction::RunReport;
use taxonorm_storage::{read_json, MemoryStore, RecordStore};
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_RECORD_LIMIT: usize = 100;

/// Shared state behind every handler
pub struct ApiState {
    pub store: Arc<MemoryStore>,
    pub collection: String,
    pub report_dir: PathBuf,
}

#[derive(Deserialize)]
struct ScopeQuery {
    project_code: Option<String>,
    solution: Option<String>,
    limit: Option<usize>,
}

impl ScopeQuery {
    fn scope(&self) -> ScopeFilter {
        let mut scope = ScopeFilter::all();
        if let Some(code) = &self.project_code {
            scope = scope.and(FilterCondition::equals("project_code", code.as_str()));
        }
        if let Some(solution) = &self.solution {
            scope = scope.and(FilterCondition::equals("solution", solution.as_str()));
        }
        scope
    }
}

#[derive(Serialize)]
struct ReportSummary {
    run_id: String,
    project_code: Option<String>,
    solution: Option<String>,
    start_time: DateTime<Utc>,
    duration_seconds: f64,
    total_tokens: u64,
    fields: usize,
    fields_done: usize,
}

impl From<&RunReport> for ReportSummary {
    fn from(report: &RunReport) -> Self {
        Self {
            run_id: report.run_id.clone(),
            project_code: report.project_code.clone(),
            solution: report.solution.clone(),
            start_time: report.start_time,
            duration_seconds: report.duration_seconds,
            total_tokens: report.total_tokens,
            fields: report.fields.len(),
            fields_done: report.fields.iter().filter(|f| f.is_success()).count(),
        }
    }
}

pub struct RestApi;

impl RestApi {
    pub async fn start(state: Arc<ApiState>, port: u16) -> std::io::Result<()> {
        info!(port, collection = %state.collection, "starting read-only API");
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allowed_methods(vec!["GET"])
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(state.clone()))
                .configure(routes)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }
}

/// Register the read-only routes. Expects `web::Data<Arc<ApiState>>`.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/reports", web::get().to(list_reports))
        .route("/reports/{run_id}", web::get().to(get_report))
        .route("/records", web::get().to(list_records))
        .route("/distinct/{field_path}", web::get().to(distinct_values));
}

async fn health(state: web::Data<Arc<ApiState>>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "records": state.store.len(&state.collection),
    })))
}

/// Every parseable report in `dir`, newest first
fn load_reports(dir: &Path) -> Vec<RunReport> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut reports: Vec<RunReport> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("json"))
        .filter_map(|path| match read_json::<RunReport>(&path) {
            Ok(report) => report,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable report");
                None
            }
        })
        .collect();
    reports.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    reports
}

async fn list_reports(state: web::Data<Arc<ApiState>>) -> ActixResult<HttpResponse> {
    let summaries: Vec<ReportSummary> = load_reports(&state.report_dir)
        .iter()
        .map(ReportSummary::from)
        .collect();
    Ok(HttpResponse::Ok().json(summaries))
}

async fn get_report(
    state: web::Data<Arc<ApiState>>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let run_id = path.into_inner();

    // Run ids are UUIDs; anything else cannot name a report file
    if Uuid::parse_str(&run_id).is_err() {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Invalid run id"
        })));
    }

    let file = state.report_dir.join(format!("{}.json", run_id));
    match read_json::<RunReport>(&file) {
        Ok(Some(report)) => Ok(HttpResponse::Ok().json(report)),
        Ok(None) => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": "Report not found"
        }))),
        Err(e) => Ok(HttpResponse::InternalServerError().json(serde_json::json!({
            "error": e.to_string()
        }))),
    }
}

async fn list_records(
    state: web::Data<Arc<ApiState>>,
    query: web::Query<ScopeQuery>,
) -> ActixResult<HttpResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_RECORD_LIMIT);
    match state.store.find(&state.collection, &query.scope()).await {
        Ok(records) => {
            let total = records.len();
            let records: Vec<Value> = records.into_iter().take(limit).map(Value::from).collect();
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "total": total,
                "records": records,
            })))
        }
        Err(e) => Ok(HttpResponse::InternalServerError().json(serde_json::json!({
            "error": e.to_string()
        }))),
    }
}

async fn distinct_values(
    state: web::Data<Arc<ApiState>>,
    path: web::Path<String>,
    query: web::Query<ScopeQuery>,
) -> ActixResult<HttpResponse> {
    let field_path = path.into_inner();
    match state
        .store
        .distinct_values(&state.collection, &field_path, &query.scope())
        .await
    {
        Ok(values) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "field": field_path,
            "values": values,
        }))),
        Err(e) => Ok(HttpResponse::InternalServerError().json(serde_json::json!({
            "error": e.to_string()
        }))),
    }
}
