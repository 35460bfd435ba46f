//! Rollback manager (spec §4.7): replays pre-state snapshots captured in
//! the audit log to restore prior configuration for reversible action
//! types. Like the executor, this is pure computation plus adapter I/O —
//! persisting the resulting `rollback_status` back onto the audit row is
//! the caller's job via `RunStore::update_rollback_status`.

use chrono::Utc;
use uuid::Uuid;

use crate::adapter::{ExternalResourceAdapter, LifecycleRule, LifecycleTransition};
use crate::models::{
    ActionStatus, ExecutionAuditRecord, RecommendationType, RollbackActionResult, RollbackActionStatus,
    RollbackRequest, RollbackResponse,
};

fn is_eligible(record: &ExecutionAuditRecord) -> bool {
    record.rollback_available
        && record.action_status == ActionStatus::Executed
        && matches!(
            record.recommendation_type,
            RecommendationType::ChangeStorageClass | RecommendationType::AddLifecyclePolicy
        )
}

/// `rollback(request, audit_records[], execution_id) -> RollbackResponse`.
pub async fn rollback(
    request: &RollbackRequest,
    audit_records: &[ExecutionAuditRecord],
    execution_id: Option<Uuid>,
    adapter: &dyn ExternalResourceAdapter,
) -> RollbackResponse {
    let mut results = Vec::with_capacity(audit_records.len());
    let mut rolled_back = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for record in audit_records {
        if !is_eligible(record) {
            results.push(RollbackActionResult {
                audit_id: record.audit_id,
                recommendation_id: record.recommendation_id,
                recommendation_type: record.recommendation_type,
                status: RollbackActionStatus::Skipped,
                message: "not eligible".to_string(),
                rolled_back: false,
            });
            skipped += 1;
            continue;
        }

        if request.dry_run {
            results.push(RollbackActionResult {
                audit_id: record.audit_id,
                recommendation_id: record.recommendation_id,
                recommendation_type: record.recommendation_type,
                status: RollbackActionStatus::DryRun,
                message: "dry run: rollback simulated, no adapter mutation invoked".to_string(),
                rolled_back: false,
            });
            continue;
        }

        match perform_rollback(adapter, record).await {
            Ok(message) => {
                results.push(RollbackActionResult {
                    audit_id: record.audit_id,
                    recommendation_id: record.recommendation_id,
                    recommendation_type: record.recommendation_type,
                    status: RollbackActionStatus::RolledBack,
                    message,
                    rolled_back: true,
                });
                rolled_back += 1;
            }
            Err(message) => {
                results.push(RollbackActionResult {
                    audit_id: record.audit_id,
                    recommendation_id: record.recommendation_id,
                    recommendation_type: record.recommendation_type,
                    status: RollbackActionStatus::Failed,
                    message,
                    rolled_back: false,
                });
                failed += 1;
                if request.stop_on_failure {
                    break;
                }
            }
        }
    }

    let response = RollbackResponse {
        run_id: request.run_id,
        execution_id,
        dry_run: request.dry_run,
        attempted: results.len(),
        rolled_back,
        skipped,
        failed,
        results,
        processed_at: Utc::now(),
    };

    tracing::info!(
        run_id = %response.run_id,
        attempted = response.attempted,
        rolled_back,
        skipped,
        failed,
        "rollback batch complete"
    );

    response
}

async fn perform_rollback(adapter: &dyn ExternalResourceAdapter, record: &ExecutionAuditRecord) -> Result<String, String> {
    match record.recommendation_type {
        RecommendationType::ChangeStorageClass => {
            let key = record.key.as_deref().unwrap_or_default();
            let storage_class = record
                .pre_change_state
                .get("storage_class")
                .and_then(|v| v.as_str())
                .unwrap_or("STANDARD");
            adapter
                .copy_self_with_class(&record.bucket, key, storage_class)
                .await
                .map_err(|e| {
                    if matches!(e, crate::adapter::AdapterError::InvalidState(_)) {
                        "restore first".to_string()
                    } else {
                        e.to_string()
                    }
                })?;
            Ok(format!("restored storage class to {storage_class}"))
        }
        RecommendationType::AddLifecyclePolicy => {
            let existing = record.pre_change_state.get("existing_lifecycle_rules");
            match existing.filter(|v| !v.is_null()) {
                None => {
                    adapter.delete_lifecycle(&record.bucket).await.map_err(|e| e.to_string())?;
                    Ok("deleted lifecycle configuration (no prior rules existed)".to_string())
                }
                Some(rules_json) => {
                    let rules = parse_lifecycle_rules(rules_json);
                    adapter.put_lifecycle(&record.bucket, &rules).await.map_err(|e| e.to_string())?;
                    Ok("restored original lifecycle rules".to_string())
                }
            }
        }
        _ => Err("rollback not supported for this recommendation type".to_string()),
    }
}

fn parse_lifecycle_rules(value: &serde_json::Value) -> Vec<LifecycleRule> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|r| {
                    let id = r.get("id")?.as_str()?.to_string();
                    let enabled = r.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true);
                    let prefix = r.get("prefix").and_then(|v| v.as_str()).map(|s| s.to_string());
                    let transitions = r
                        .get("transitions")
                        .and_then(|v| v.as_array())
                        .map(|ts| {
                            ts.iter()
                                .filter_map(|t| {
                                    Some(LifecycleTransition {
                                        days: t.get("days")?.as_i64()?,
                                        storage_class: t.get("storage_class")?.as_str()?.to_string(),
                                    })
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    let abort_incomplete_multipart_after_days =
                        r.get("abort_incomplete_multipart_after_days").and_then(|v| v.as_i64());
                    Some(LifecycleRule { id, enabled, prefix, transitions, abort_incomplete_multipart_after_days })
                })
                .collect()
        })
        .unwrap_or_default()
}
