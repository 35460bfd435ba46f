//! Executor (spec §4.6): validates, gates, and mutates each recommendation
//! in strict input order, capturing pre-state immediately before every
//! live mutation and recording an immutable audit result for every
//! outcome — including the ones the guards never let reach the adapter.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::adapter::{ExternalResourceAdapter, LifecycleRule, LifecycleTransition};
use crate::config::ExecutorPolicy;
use crate::models::{
    ActionStatus, ExecuteRequest, ExecuteResponse, ExecutionActionResult, ExecutionMode, Recommendation,
    RecommendationDetails, RecommendationType, RiskScore, RollbackStatus,
};

fn required_permissions(rec_type: RecommendationType) -> &'static [&'static str] {
    match rec_type {
        RecommendationType::ChangeStorageClass => &["s3:GetObject", "s3:PutObject"],
        RecommendationType::AddLifecyclePolicy => {
            &["s3:GetLifecycleConfiguration", "s3:PutLifecycleConfiguration"]
        }
        RecommendationType::DeleteIncompleteUpload => {
            &["s3:ListBucketMultipartUploads", "s3:AbortMultipartUpload"]
        }
        RecommendationType::DeleteStaleObject | RecommendationType::DeleteOldVersion => {
            &["s3:GetObject", "s3:DeleteObject"]
        }
    }
}

fn resolve_mode(request: &ExecuteRequest) -> (ExecutionMode, bool) {
    match request.mode {
        ExecutionMode::DryRun => (ExecutionMode::DryRun, true),
        mode => match request.dry_run {
            Some(dry_run) => (mode, dry_run),
            None => (mode, false),
        },
    }
}

fn mode_eligible(mode: ExecutionMode, score: &RiskScore) -> bool {
    match mode {
        ExecutionMode::DryRun => true,
        ExecutionMode::Safe => score.safe_to_automate,
        ExecutionMode::Standard => !score.requires_approval,
        ExecutionMode::Full => true,
    }
}

fn base_result(rec: &Recommendation) -> ExecutionActionResult {
    ExecutionActionResult {
        audit_id: Uuid::new_v4(),
        recommendation_id: rec.id,
        recommendation_type: rec.recommendation_type(),
        bucket: rec.bucket.clone(),
        key: rec.key.clone(),
        risk_level: rec.risk_level,
        requires_approval: false,
        status: ActionStatus::Skipped,
        message: String::new(),
        permitted: true,
        required_permissions: required_permissions(rec.recommendation_type()).iter().map(|s| s.to_string()).collect(),
        missing_permissions: Vec::new(),
        simulated: false,
        pre_change_state: HashMap::new(),
        post_change_state: None,
        rollback_available: false,
        rollback_status: RollbackStatus::NotApplicable,
    }
}

/// `execute(request, recommendations[], scores[]) -> ExecuteResponse`.
pub async fn execute(
    request: &ExecuteRequest,
    recommendations: &[Recommendation],
    scores: &[RiskScore],
    adapter: &dyn ExternalResourceAdapter,
    policy: &ExecutorPolicy,
) -> ExecuteResponse {
    let (mode, dry_run) = resolve_mode(request);
    let effective_max_actions = request.max_actions.min(policy.max_actions);

    let mut action_results = Vec::with_capacity(recommendations.len());
    let mut errors = Vec::new();
    let mut eligible = 0usize;
    let mut executed = 0usize;
    let mut skipped = 0usize;
    let mut blocked = 0usize;
    let mut failed = 0usize;

    for (index, rec) in recommendations.iter().enumerate() {
        if failed >= policy.max_failures {
            errors.push(format!("stopped: exceeded {} failures", policy.max_failures));
            break;
        }

        let mut result = base_result(rec);
        result.requires_approval = scores
            .iter()
            .find(|s| s.recommendation_id == rec.id)
            .map(|s| s.requires_approval)
            .unwrap_or(false);

        // 1. Max-actions guard. pre_change_state stays empty here: capturing it
        // would mean an adapter call for an action the batch never reaches.
        if index >= effective_max_actions {
            result.status = ActionStatus::Skipped;
            result.message = format!("max_actions limit of {effective_max_actions} reached");
            skipped += 1;
            action_results.push(result);
            continue;
        }

        // 2. Score presence.
        let Some(score) = scores.iter().find(|s| s.recommendation_id == rec.id) else {
            result.status = ActionStatus::Failed;
            result.message = "Missing risk score".to_string();
            failed += 1;
            action_results.push(result);
            continue;
        };

        // 3. Mode eligibility.
        if !mode_eligible(mode, score) {
            result.status = ActionStatus::Skipped;
            result.message = format!("not eligible under {mode:?} mode");
            skipped += 1;
            action_results.push(result);
            continue;
        }
        // 4. Eligibility counter.
        eligible += 1;

        // 5. Destructive guard.
        if rec.recommendation_type() == RecommendationType::DeleteStaleObject && !policy.allow_destructive {
            result.status = ActionStatus::Blocked;
            result.permitted = false;
            result.message = "set allow_destructive to enable".to_string();
            blocked += 1;
            action_results.push(result);
            continue;
        }

        // 6. Permission guard.
        let missing: Vec<String> = required_permissions(rec.recommendation_type())
            .iter()
            .filter(|p| !policy.has_permission(p))
            .map(|p| p.to_string())
            .collect();
        if !missing.is_empty() {
            result.status = ActionStatus::Blocked;
            result.permitted = false;
            result.missing_permissions = missing;
            result.message = "missing required permissions".to_string();
            blocked += 1;
            action_results.push(result);
            continue;
        }

        if dry_run {
            // 7. Dry-run branch.
            result.status = ActionStatus::DryRun;
            result.simulated = true;
            result.post_change_state = Some(synthesize_intended_state(rec));
            result.rollback_available = false;
            result.message = "dry run: action simulated, no adapter mutation invoked".to_string();
            executed += 1;
            action_results.push(result);
        } else {
            // 8. Live branch.
            match perform_live_action(adapter, rec, &mut result).await {
                Ok(()) => {
                    result.status = ActionStatus::Executed;
                    result.rollback_available = matches!(
                        rec.recommendation_type(),
                        RecommendationType::ChangeStorageClass | RecommendationType::AddLifecyclePolicy
                    );
                    result.rollback_status =
                        if result.rollback_available { RollbackStatus::Pending } else { RollbackStatus::NotApplicable };
                    executed += 1;
                }
                Err(err) => {
                    result.status = ActionStatus::Failed;
                    result.message = err;
                    failed += 1;
                }
            }
            action_results.push(result);
        }

        if policy.delay_between_actions_ms > 0 {
            tokio::time::sleep(Duration::from_millis(policy.delay_between_actions_ms)).await;
        }
        if action_results.last().map(|r| r.status) == Some(ActionStatus::Failed) && policy.delay_after_failure_ms > 0 {
            tokio::time::sleep(Duration::from_millis(policy.delay_after_failure_ms)).await;
        }
    }

    let response = ExecuteResponse {
        execution_id: Uuid::new_v4(),
        run_id: request.run_id,
        mode,
        dry_run,
        eligible,
        executed,
        skipped,
        blocked,
        failed,
        action_results,
        errors,
        executed_at: Utc::now(),
    };

    tracing::info!(
        run_id = %response.run_id,
        execution_id = %response.execution_id,
        eligible,
        executed,
        skipped,
        blocked,
        failed,
        "execution batch complete"
    );

    response
}

fn synthesize_intended_state(rec: &Recommendation) -> HashMap<String, serde_json::Value> {
    let mut state = HashMap::new();
    match &rec.details {
        RecommendationDetails::ChangeStorageClass { target_storage_class } => {
            state.insert("storage_class".to_string(), json!(target_storage_class));
        }
        RecommendationDetails::AddLifecyclePolicy => {
            state.insert("lifecycle_rules".to_string(), json!("archive-90-days + 7-day multipart abort"));
        }
        RecommendationDetails::DeleteIncompleteUpload { upload_ids } => {
            state.insert("upload_ids".to_string(), json!(upload_ids));
        }
        RecommendationDetails::DeleteStaleObject { .. } | RecommendationDetails::DeleteOldVersion { .. } => {
            state.insert("action".to_string(), json!("delete"));
        }
    }
    state
}

async fn perform_live_action(
    adapter: &dyn ExternalResourceAdapter,
    rec: &Recommendation,
    result: &mut ExecutionActionResult,
) -> Result<(), String> {
    match &rec.details {
        RecommendationDetails::ChangeStorageClass { target_storage_class } => {
            let head = adapter.head_object(&rec.bucket, rec.key.as_deref().unwrap_or_default()).await.map_err(|e| e.to_string())?;
            result.pre_change_state = HashMap::from([
                ("bucket".to_string(), json!(rec.bucket)),
                ("key".to_string(), json!(rec.key)),
                ("storage_class".to_string(), json!(head.storage_class)),
                ("size_bytes".to_string(), json!(head.size_bytes)),
                ("etag".to_string(), json!(head.etag)),
                ("last_modified".to_string(), json!(head.last_modified)),
                ("tags".to_string(), json!(head.tags)),
            ]);
            adapter
                .copy_self_with_class(&rec.bucket, rec.key.as_deref().unwrap_or_default(), target_storage_class)
                .await
                .map_err(|e| e.to_string())?;
            result.post_change_state = Some(HashMap::from([("storage_class".to_string(), json!(target_storage_class))]));
            Ok(())
        }
        RecommendationDetails::AddLifecyclePolicy => {
            let existing = adapter.get_lifecycle(&rec.bucket).await.map_err(|e| e.to_string())?;
            result.pre_change_state = HashMap::from([
                ("bucket".to_string(), json!(rec.bucket)),
                ("existing_lifecycle_rules".to_string(), existing_rules_json(&existing)),
            ]);
            let merged = merge_lifecycle_rules(existing);
            adapter.put_lifecycle(&rec.bucket, &merged).await.map_err(|e| e.to_string())?;
            result.post_change_state = Some(HashMap::from([("rule_count".to_string(), json!(merged.len()))]));
            Ok(())
        }
        RecommendationDetails::DeleteIncompleteUpload { upload_ids } => {
            result.pre_change_state = HashMap::from([
                ("bucket".to_string(), json!(rec.bucket)),
                ("key".to_string(), json!(rec.key)),
                ("upload_ids".to_string(), json!(upload_ids)),
            ]);
            let key = rec.key.as_deref().unwrap_or_default();
            for upload_id in upload_ids {
                adapter.abort_multipart(&rec.bucket, key, upload_id).await.map_err(|e| e.to_string())?;
            }
            result.post_change_state = Some(HashMap::from([("aborted_count".to_string(), json!(upload_ids.len()))]));
            Ok(())
        }
        RecommendationDetails::DeleteStaleObject { .. } | RecommendationDetails::DeleteOldVersion { .. } => {
            let key = rec.key.as_deref().unwrap_or_default();
            let head = adapter.head_object(&rec.bucket, key).await.map_err(|e| e.to_string())?;
            result.pre_change_state = HashMap::from([
                ("bucket".to_string(), json!(rec.bucket)),
                ("key".to_string(), json!(rec.key)),
                ("size_bytes".to_string(), json!(head.size_bytes)),
                ("storage_class".to_string(), json!(head.storage_class)),
                ("warning".to_string(), json!("irreversible deletion")),
            ]);
            let mut tags = head.tags.clone();
            tags.insert("cost-optimizer-deletion-marker".to_string(), Utc::now().to_rfc3339());
            adapter.put_object_tags(&rec.bucket, key, &tags).await.map_err(|e| e.to_string())?;
            adapter.delete_object(&rec.bucket, key, None).await.map_err(|e| e.to_string())?;
            result.post_change_state = Some(HashMap::from([("deleted".to_string(), json!(true))]));
            Ok(())
        }
    }
}

fn existing_rules_json(existing: &Option<Vec<LifecycleRule>>) -> serde_json::Value {
    match existing {
        None => serde_json::Value::Null,
        Some(rules) => json!(rules
            .iter()
            .map(|r| json!({
                "id": r.id,
                "enabled": r.enabled,
                "prefix": r.prefix,
                "transitions": r.transitions.iter().map(|t| json!({"days": t.days, "storage_class": t.storage_class})).collect::<Vec<_>>(),
                "abort_incomplete_multipart_after_days": r.abort_incomplete_multipart_after_days,
            }))
            .collect::<Vec<_>>()),
    }
}

fn merge_lifecycle_rules(existing: Option<Vec<LifecycleRule>>) -> Vec<LifecycleRule> {
    let mut rules = existing.unwrap_or_default();

    if !rules.iter().any(|r| r.id == "cost-optimizer-archive") {
        rules.push(LifecycleRule {
            id: "cost-optimizer-archive".to_string(),
            enabled: true,
            prefix: None,
            transitions: vec![LifecycleTransition { days: 90, storage_class: "GLACIER_IR".to_string() }],
            abort_incomplete_multipart_after_days: None,
        });
    }

    if !rules.iter().any(|r| r.id == "cost-optimizer-abort-multipart") {
        rules.push(LifecycleRule {
            id: "cost-optimizer-abort-multipart".to_string(),
            enabled: true,
            prefix: None,
            transitions: vec![],
            abort_incomplete_multipart_after_days: Some(7),
        });
    }

    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_resolution_matches_spec_table() {
        let req = ExecuteRequest { run_id: Uuid::new_v4(), mode: ExecutionMode::DryRun, dry_run: Some(false), max_actions: 10 };
        assert_eq!(resolve_mode(&req), (ExecutionMode::DryRun, true));

        let req = ExecuteRequest { run_id: Uuid::new_v4(), mode: ExecutionMode::Full, dry_run: Some(true), max_actions: 10 };
        assert_eq!(resolve_mode(&req), (ExecutionMode::Full, true));

        let req = ExecuteRequest { run_id: Uuid::new_v4(), mode: ExecutionMode::Full, dry_run: None, max_actions: 10 };
        assert_eq!(resolve_mode(&req), (ExecutionMode::Full, false));
    }

    #[test]
    fn required_permissions_cover_every_type() {
        for rec_type in [
            RecommendationType::ChangeStorageClass,
            RecommendationType::AddLifecyclePolicy,
            RecommendationType::DeleteIncompleteUpload,
            RecommendationType::DeleteStaleObject,
            RecommendationType::DeleteOldVersion,
        ] {
            assert!(!required_permissions(rec_type).is_empty());
        }
    }
}
