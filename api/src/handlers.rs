//! HTTP handlers (spec.md §6). Each handler is a thin translation layer:
//! decode request, drive one `optimizer_core` operation, encode response.
//! No business logic lives here — that is the boundary the teacher's own
//! `handlers.rs` draws between HTTP and the registry/verification engine.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use optimizer_core::models::{ExecuteRequest, Recommendation, RiskScore, Run, RunStatus};
use optimizer_core::scanner::{self, ScanFilters};
use optimizer_core::scoring;
use optimizer_core::{executor, rollback};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ScanRequestBody {
    #[serde(default)]
    pub include_buckets: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_buckets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ScanResponseBody {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub recommendations: Vec<Recommendation>,
    pub scan_errors: Vec<String>,
    pub estimated_monthly_savings: f64,
    pub created_at: DateTime<Utc>,
}

/// `POST /runs/scan` — spec.md §4.3, §6.
pub async fn scan_handler(
    State(state): State<AppState>,
    Json(body): Json<ScanRequestBody>,
) -> ApiResult<(axum::http::StatusCode, Json<ScanResponseBody>)> {
    let started = Instant::now();
    let filters = ScanFilters { include_buckets: body.include_buckets, exclude_buckets: body.exclude_buckets };

    let outcome = scanner::scan(state.adapter.clone(), &state.scanner_thresholds, &state.pricing, &filters).await;

    let mut by_type: std::collections::HashMap<&'static str, usize> = std::collections::HashMap::new();
    for rec in &outcome.recommendations {
        *by_type.entry(recommendation_type_label(rec)).or_insert(0) += 1;
    }
    let findings_by_type: Vec<(&str, usize)> = by_type.into_iter().collect();
    metrics::observe_scan("ok", started.elapsed().as_secs_f64(), &findings_by_type, outcome.errors.len());

    let estimated_monthly_savings =
        optimizer_core::config::round4(outcome.recommendations.iter().map(|r| r.estimated_monthly_savings).sum());

    let run = state.store.create(outcome.recommendations, outcome.errors).await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(ScanResponseBody {
            run_id: run.run_id,
            status: run.status,
            recommendations: run.recommendations,
            scan_errors: run.scan_errors,
            estimated_monthly_savings,
            created_at: run.created_at,
        }),
    ))
}

fn recommendation_type_label(rec: &Recommendation) -> &'static str {
    use optimizer_core::models::RecommendationType::*;
    match rec.recommendation_type() {
        ChangeStorageClass => "change_storage_class",
        AddLifecyclePolicy => "add_lifecycle_policy",
        DeleteIncompleteUpload => "delete_incomplete_upload",
        DeleteStaleObject => "delete_stale_object",
        DeleteOldVersion => "delete_old_version",
    }
}

#[derive(Debug, Serialize)]
pub struct ScoreResponseBody {
    pub run_id: Uuid,
    pub scores: Vec<RiskScore>,
    pub savings_details: Vec<optimizer_core::models::SavingsEstimate>,
    pub savings_summary: optimizer_core::models::SavingsSummary,
    pub safe_to_automate_count: usize,
    pub requires_approval_count: usize,
}

/// `POST /runs/:run_id/score` — spec.md §4.4, §6.
pub async fn score_handler(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<ScoreResponseBody>> {
    let started = Instant::now();
    let run = state.store.get(run_id).await?.ok_or(optimizer_core::CoreError::RunNotFound(run_id))?;

    let (scores, savings_details, summary) = scoring::score(&run.recommendations, &state.pricing);

    let mut risk_levels: std::collections::HashMap<&'static str, usize> = std::collections::HashMap::new();
    let mut safe_to_automate_count = 0usize;
    let mut requires_approval_count = 0usize;
    for score in &scores {
        let label = match score.risk_level {
            optimizer_core::models::RiskLevel::Low => "low",
            optimizer_core::models::RiskLevel::Medium => "medium",
            optimizer_core::models::RiskLevel::High => "high",
        };
        *risk_levels.entry(label).or_insert(0) += 1;
        if score.safe_to_automate {
            safe_to_automate_count += 1;
        }
        if score.requires_approval {
            requires_approval_count += 1;
        }
    }
    let risk_levels: Vec<(&str, usize)> = risk_levels.into_iter().collect();
    metrics::observe_score("ok", started.elapsed().as_secs_f64(), &risk_levels);

    let updated = state
        .store
        .set_scores(run_id, scores.clone(), savings_details.clone(), summary.clone())
        .await?
        .ok_or(optimizer_core::CoreError::RunNotFound(run_id))?;

    Ok(Json(ScoreResponseBody {
        run_id: updated.run_id,
        scores,
        savings_details,
        savings_summary: summary,
        safe_to_automate_count,
        requires_approval_count,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequestBody {
    pub mode: optimizer_core::models::ExecutionMode,
    #[serde(default)]
    pub dry_run: Option<bool>,
    #[serde(default = "default_max_actions")]
    pub max_actions: usize,
}

fn default_max_actions() -> usize {
    usize::MAX
}

/// `POST /runs/:run_id/execute` — spec.md §4.6, §6.
pub async fn execute_handler(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Json(body): Json<ExecuteRequestBody>,
) -> ApiResult<Json<optimizer_core::models::ExecuteResponse>> {
    let started = Instant::now();
    let run = state.store.get(run_id).await?.ok_or(optimizer_core::CoreError::RunNotFound(run_id))?;

    if !run.has_been_scored() {
        return Err(optimizer_core::CoreError::RunNotScored(run_id).into());
    }

    let request = ExecuteRequest { run_id, mode: body.mode, dry_run: body.dry_run, max_actions: body.max_actions };

    let response =
        executor::execute(&request, &run.recommendations, &run.scores, state.adapter.as_ref(), &state.executor_policy)
            .await;

    let mut statuses: std::collections::HashMap<&'static str, usize> = std::collections::HashMap::new();
    for result in &response.action_results {
        let label = match result.status {
            optimizer_core::models::ActionStatus::DryRun => "dry_run",
            optimizer_core::models::ActionStatus::Executed => "executed",
            optimizer_core::models::ActionStatus::Skipped => "skipped",
            optimizer_core::models::ActionStatus::Blocked => "blocked",
            optimizer_core::models::ActionStatus::Failed => "failed",
        };
        *statuses.entry(label).or_insert(0) += 1;
    }
    let statuses: Vec<(&str, usize)> = statuses.into_iter().collect();
    let mode_label = match response.mode {
        optimizer_core::models::ExecutionMode::DryRun => "dry_run",
        optimizer_core::models::ExecutionMode::Safe => "safe",
        optimizer_core::models::ExecutionMode::Standard => "standard",
        optimizer_core::models::ExecutionMode::Full => "full",
    };
    metrics::observe_execute(mode_label, started.elapsed().as_secs_f64(), &statuses);

    state.store.set_execution(run_id, response.clone()).await?.ok_or(optimizer_core::CoreError::RunNotFound(run_id))?;

    Ok(Json(response))
}

#[derive(Debug, Deserialize, Default)]
pub struct RollbackRequestBody {
    #[serde(default)]
    pub execution_id: Option<Uuid>,
    #[serde(default)]
    pub audit_ids: Vec<Uuid>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub stop_on_failure: bool,
}

/// `POST /runs/:run_id/rollback` — spec.md §4.7, §6.
pub async fn rollback_handler(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Json(body): Json<RollbackRequestBody>,
) -> ApiResult<Json<optimizer_core::models::RollbackResponse>> {
    let run = state.store.get(run_id).await?.ok_or(optimizer_core::CoreError::RunNotFound(run_id))?;

    let execution_id = match body.execution_id.or_else(|| run.execution.as_ref().map(|e| e.execution_id)) {
        Some(id) => id,
        None => return Err(optimizer_core::CoreError::RunNotExecuted(run_id).into()),
    };

    let audit_ids = if body.audit_ids.is_empty() { None } else { Some(body.audit_ids.as_slice()) };
    let records = state.store.list_execution_audit(run_id, Some(execution_id), audit_ids).await?;
    if records.is_empty() {
        return Err(optimizer_core::CoreError::NoMatchingAuditRecords.into());
    }

    let request = optimizer_core::models::RollbackRequest {
        run_id,
        execution_id: Some(execution_id),
        audit_ids: body.audit_ids,
        dry_run: body.dry_run,
        stop_on_failure: body.stop_on_failure,
    };

    let response = rollback::rollback(&request, &records, Some(execution_id), state.adapter.as_ref()).await;

    let mut statuses: std::collections::HashMap<&'static str, usize> = std::collections::HashMap::new();
    for result in &response.results {
        let label = match result.status {
            optimizer_core::models::RollbackActionStatus::RolledBack => "rolled_back",
            optimizer_core::models::RollbackActionStatus::Skipped => "skipped",
            optimizer_core::models::RollbackActionStatus::Failed => "failed",
            optimizer_core::models::RollbackActionStatus::DryRun => "dry_run",
        };
        *statuses.entry(label).or_insert(0) += 1;

        if !body.dry_run
            && !matches!(result.status, optimizer_core::models::RollbackActionStatus::Skipped)
        {
            let new_status = match result.status {
                optimizer_core::models::RollbackActionStatus::RolledBack => {
                    optimizer_core::models::RollbackStatus::RolledBack
                }
                optimizer_core::models::RollbackActionStatus::Failed => optimizer_core::models::RollbackStatus::Failed,
                _ => continue,
            };
            state.store.update_rollback_status(result.audit_id, new_status, Some(result.message.clone())).await?;
        }
    }
    let statuses: Vec<(&str, usize)> = statuses.into_iter().collect();
    metrics::observe_rollback(&statuses);

    Ok(Json(response))
}

/// `GET /runs/:run_id` — spec.md §6.
pub async fn get_run_handler(State(state): State<AppState>, Path(run_id): Path<Uuid>) -> ApiResult<Json<Run>> {
    let run = state.store.get(run_id).await?.ok_or(optimizer_core::CoreError::RunNotFound(run_id))?;
    Ok(Json(run))
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub finding_count: usize,
    pub score_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `GET /runs` — spec.md §6.
pub async fn list_runs_handler(State(state): State<AppState>) -> ApiResult<Json<Vec<RunSummary>>> {
    let runs = state.store.list().await?;
    Ok(Json(
        runs.into_iter()
            .map(|r| RunSummary {
                run_id: r.run_id,
                status: r.status,
                finding_count: r.recommendations.len(),
                score_count: r.scores.len(),
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize, Default)]
pub struct AuditQuery {
    pub execution_id: Option<Uuid>,
}

/// `GET /runs/:run_id/audit` — spec.md §6.
pub async fn get_audit_handler(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<optimizer_core::models::ExecutionAuditRecord>>> {
    state.store.get(run_id).await?.ok_or(optimizer_core::CoreError::RunNotFound(run_id))?;
    let records = state.store.list_execution_audit(run_id, query.execution_id, None).await?;
    Ok(Json(records))
}

/// `GET /health` — liveness probe, unauthenticated, excluded from rate limiting tiers other than `health`.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "time": Utc::now().to_rfc3339() }))
}

/// `GET /metrics` — Prometheus scrape endpoint.
pub async fn metrics_handler(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let body = metrics::gather_metrics(&state.registry);
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
