//! End-to-end scenarios driving scan → score → execute → rollback
//! directly against an in-memory adapter, without a live Postgres
//! connection. These reproduce the literal inputs and expected outputs
//! from spec.md's scenario walkthroughs.

mod common;

use std::sync::Arc;

use chrono::Utc;
use optimizer_core::config::{ExecutorPolicy, PricingConfig, ScannerThresholds};
use optimizer_core::models::{
    ActionStatus, ExecuteRequest, ExecutionAuditRecord, ExecutionMode, RecommendationDetails, RecommendationType,
    RiskLevel, RollbackRequest,
};
use optimizer_core::scanner::{self, ScanFilters};
use optimizer_core::scoring;
use optimizer_core::{executor, rollback};
use uuid::Uuid;

use common::{object, MockAdapter, MockBucket, MockCall};

fn fully_configured_lifecycle() -> Vec<optimizer_core::adapter::LifecycleRule> {
    vec![
        optimizer_core::adapter::LifecycleRule {
            id: "existing-archive".to_string(),
            enabled: true,
            prefix: None,
            transitions: vec![optimizer_core::adapter::LifecycleTransition {
                days: 90,
                storage_class: "GLACIER_IR".to_string(),
            }],
            abort_incomplete_multipart_after_days: Some(7),
        },
    ]
}

// Scenario A — cold object gets archival recommendation and safe dry-run execute.
#[tokio::test]
async fn scenario_a_cold_object_dry_run_execute() {
    let bucket = MockBucket {
        objects: vec![object("archive/a.dat", 1_073_741_824, "STANDARD", 220)],
        lifecycle: Some(fully_configured_lifecycle()),
        multipart_uploads: vec![],
    };
    let adapter: Arc<MockAdapter> = Arc::new(MockAdapter::new().with_bucket("b1", bucket));
    let thresholds = ScannerThresholds::default();
    let pricing = PricingConfig::default();

    let outcome = scanner::scan(adapter.clone(), &thresholds, &pricing, &ScanFilters::default()).await;
    assert_eq!(outcome.recommendations.len(), 1);
    let rec = &outcome.recommendations[0];
    assert_eq!(rec.recommendation_type(), RecommendationType::ChangeStorageClass);
    assert!((rec.estimated_monthly_savings - 0.0190).abs() < 1e-6);

    let (scores, _savings, _summary) = scoring::score(&outcome.recommendations, &pricing);
    assert_eq!(scores.len(), 1);
    let score = &scores[0];
    assert_eq!(score.factor_scores.reversibility, 90);
    assert_eq!(score.factor_scores.data_loss_risk, 5);
    assert_eq!(score.factor_scores.age_confidence, 80);
    assert_eq!(score.factor_scores.size_impact, 60);
    assert_eq!(score.factor_scores.access_confidence, 60);
    assert_eq!(score.risk_score, 21);
    assert_eq!(score.confidence_score, 77);
    assert_eq!(score.risk_level, RiskLevel::Low);
    assert!(score.safe_to_automate);
    assert!(!score.requires_approval);

    let request = ExecuteRequest { run_id: Uuid::new_v4(), mode: ExecutionMode::DryRun, dry_run: None, max_actions: 10 };
    let policy = ExecutorPolicy::default();
    let response = executor::execute(&request, &outcome.recommendations, &scores, adapter.as_ref(), &policy).await;

    assert_eq!(response.executed, 1);
    assert_eq!(response.skipped, 0);
    assert_eq!(response.blocked, 0);
    assert_eq!(response.failed, 0);
    let action = &response.action_results[0];
    assert_eq!(action.status, ActionStatus::DryRun);
    assert!(action.simulated);
    assert!(!action.rollback_available);
    assert!(adapter.calls().is_empty(), "dry run must never invoke a mutating adapter verb");
}

// Scenario B — very-old object gets delete recommendation, blocked by default, then executes when permitted.
#[tokio::test]
async fn scenario_b_stale_object_blocked_then_destructive_allowed() {
    let bucket = MockBucket {
        objects: vec![object("x.bin", 5 * 1024 * 1024 * 1024, "STANDARD", 400)],
        lifecycle: Some(fully_configured_lifecycle()),
        multipart_uploads: vec![],
    };
    let adapter: Arc<MockAdapter> = Arc::new(MockAdapter::new().with_bucket("b2", bucket));
    let thresholds = ScannerThresholds::default();
    let pricing = PricingConfig::default();

    let outcome = scanner::scan(adapter.clone(), &thresholds, &pricing, &ScanFilters::default()).await;
    let stale = outcome
        .recommendations
        .iter()
        .find(|r| r.recommendation_type() == RecommendationType::DeleteStaleObject)
        .expect("expected a DELETE_STALE_OBJECT finding")
        .clone();
    assert_eq!(stale.risk_level, RiskLevel::High);

    let (scores, _savings, _summary) = scoring::score(std::slice::from_ref(&stale), &pricing);
    let score = scores[0].clone();
    assert!(!score.safe_to_automate);
    assert!(score.requires_approval);

    // Blocked: allow_destructive = false (default).
    let request = ExecuteRequest { run_id: Uuid::new_v4(), mode: ExecutionMode::Full, dry_run: Some(false), max_actions: 10 };
    let mut policy = ExecutorPolicy::default();
    let response = executor::execute(&request, std::slice::from_ref(&stale), &scores, adapter.as_ref(), &policy).await;
    assert_eq!(response.blocked, 1);
    assert_eq!(response.action_results[0].status, ActionStatus::Blocked);
    assert!(adapter.calls().is_empty());

    // Allowed: allow_destructive = true and the right permissions granted.
    policy.allow_destructive = true;
    policy.granted_permissions = vec!["s3:GetObject".to_string(), "s3:DeleteObject".to_string()];
    let response = executor::execute(&request, std::slice::from_ref(&stale), &scores, adapter.as_ref(), &policy).await;
    assert_eq!(response.executed, 1);
    assert_eq!(response.action_results[0].status, ActionStatus::Executed);
}

// Scenario C — bucket without lifecycle policy: execute merges rules, rollback deletes them.
#[tokio::test]
async fn scenario_c_lifecycle_gap_execute_and_rollback() {
    let bucket = MockBucket {
        objects: vec![
            object("small/one.dat", 70 * 1024 * 1024, "STANDARD", 10),
            object("small/two.dat", 70 * 1024 * 1024, "STANDARD", 10),
            object("small/three.dat", 60 * 1024 * 1024, "STANDARD", 10),
        ],
        lifecycle: None,
        multipart_uploads: vec![],
    };
    let adapter: Arc<MockAdapter> = Arc::new(MockAdapter::new().with_bucket("b3", bucket));
    let thresholds = ScannerThresholds::default();
    let pricing = PricingConfig::default();

    let outcome = scanner::scan(adapter.clone(), &thresholds, &pricing, &ScanFilters::default()).await;
    let lifecycle_gap = outcome
        .recommendations
        .iter()
        .find(|r| r.recommendation_type() == RecommendationType::AddLifecyclePolicy)
        .expect("expected an ADD_LIFECYCLE_POLICY finding")
        .clone();
    assert_eq!(lifecycle_gap.risk_level, RiskLevel::Low);
    assert_eq!(lifecycle_gap.details, RecommendationDetails::AddLifecyclePolicy);

    let (scores, _savings, _summary) = scoring::score(std::slice::from_ref(&lifecycle_gap), &pricing);
    let request = ExecuteRequest { run_id: Uuid::new_v4(), mode: ExecutionMode::Full, dry_run: Some(false), max_actions: 10 };
    let policy = ExecutorPolicy::default();
    let response =
        executor::execute(&request, std::slice::from_ref(&lifecycle_gap), &scores, adapter.as_ref(), &policy).await;

    assert_eq!(response.executed, 1);
    let action = &response.action_results[0];
    assert_eq!(action.status, ActionStatus::Executed);
    assert!(action.rollback_available);
    assert_eq!(action.pre_change_state.get("existing_lifecycle_rules"), Some(&serde_json::Value::Null));
    assert!(matches!(
        adapter.calls().as_slice(),
        [MockCall::PutLifecycle { .. }]
    ));

    let audit = ExecutionAuditRecord::from_action_result(request.run_id, response.execution_id, action, Utc::now());
    let rollback_request =
        RollbackRequest { run_id: request.run_id, execution_id: Some(response.execution_id), audit_ids: vec![], dry_run: false, stop_on_failure: false };
    let rollback_response =
        rollback::rollback(&rollback_request, std::slice::from_ref(&audit), Some(response.execution_id), adapter.as_ref()).await;

    assert_eq!(rollback_response.rolled_back, 1);
    assert_eq!(rollback_response.attempted, 1);
    assert!(matches!(
        adapter.calls().as_slice(),
        [MockCall::PutLifecycle { .. }, MockCall::DeleteLifecycle { bucket }] if bucket == "b3"
    ));
}

// Scenario D — permission gate: missing PutObject blocks a storage-class change.
#[tokio::test]
async fn scenario_d_permission_gate_blocks_action() {
    let bucket = MockBucket {
        objects: vec![object("cold.dat", 2 * 1024 * 1024 * 1024, "STANDARD", 120)],
        lifecycle: Some(fully_configured_lifecycle()),
        multipart_uploads: vec![],
    };
    let adapter: Arc<MockAdapter> = Arc::new(MockAdapter::new().with_bucket("b4", bucket));
    let thresholds = ScannerThresholds::default();
    let pricing = PricingConfig::default();

    let outcome = scanner::scan(adapter.clone(), &thresholds, &pricing, &ScanFilters::default()).await;
    let rec = outcome
        .recommendations
        .iter()
        .find(|r| r.recommendation_type() == RecommendationType::ChangeStorageClass)
        .expect("expected a CHANGE_STORAGE_CLASS finding")
        .clone();

    let (scores, _savings, _summary) = scoring::score(std::slice::from_ref(&rec), &pricing);
    let request = ExecuteRequest { run_id: Uuid::new_v4(), mode: ExecutionMode::Full, dry_run: Some(false), max_actions: 10 };
    let mut policy = ExecutorPolicy::default();
    policy.granted_permissions = vec!["s3:GetObject".to_string()];

    let response = executor::execute(&request, std::slice::from_ref(&rec), &scores, adapter.as_ref(), &policy).await;
    assert_eq!(response.blocked, 1);
    let action = &response.action_results[0];
    assert_eq!(action.status, ActionStatus::Blocked);
    assert_eq!(action.missing_permissions, vec!["s3:PutObject".to_string()]);
    assert!(!action.rollback_available);
    assert!(adapter.calls().is_empty());
}

// Scenario E — execution twice, audit accumulates distinct execution ids.
#[tokio::test]
async fn scenario_e_execute_twice_accumulates_audit() {
    let bucket = MockBucket {
        objects: vec![object("archive/a.dat", 1_073_741_824, "STANDARD", 220)],
        lifecycle: Some(fully_configured_lifecycle()),
        multipart_uploads: vec![],
    };
    let adapter: Arc<MockAdapter> = Arc::new(MockAdapter::new().with_bucket("b5", bucket));
    let thresholds = ScannerThresholds::default();
    let pricing = PricingConfig::default();

    let outcome = scanner::scan(adapter.clone(), &thresholds, &pricing, &ScanFilters::default()).await;
    let (scores, _savings, _summary) = scoring::score(&outcome.recommendations, &pricing);

    let request = ExecuteRequest { run_id: Uuid::new_v4(), mode: ExecutionMode::Full, dry_run: Some(false), max_actions: 10 };
    let policy = ExecutorPolicy::default();

    let first = executor::execute(&request, &outcome.recommendations, &scores, adapter.as_ref(), &policy).await;
    let second = executor::execute(&request, &outcome.recommendations, &scores, adapter.as_ref(), &policy).await;

    assert_ne!(first.execution_id, second.execution_id);
    assert_eq!(first.executed, 1);
    assert_eq!(second.executed, 1);
    // Two independent batches, one mutation each.
    assert_eq!(adapter.calls().len(), 2);
}

// Scenario F — score([]) and empty scan: a run that filters out every bucket stays "not scored".
#[tokio::test]
async fn scenario_f_empty_scan_is_never_scored() {
    let bucket = MockBucket {
        objects: vec![object("archive/a.dat", 1_073_741_824, "STANDARD", 220)],
        lifecycle: Some(fully_configured_lifecycle()),
        multipart_uploads: vec![],
    };
    let adapter: Arc<MockAdapter> = Arc::new(MockAdapter::new().with_bucket("b6", bucket));
    let thresholds = ScannerThresholds::default();
    let pricing = PricingConfig::default();

    let filters = ScanFilters { include_buckets: Some(vec![]), exclude_buckets: vec![] };
    let outcome = scanner::scan(adapter.clone(), &thresholds, &pricing, &filters).await;
    assert!(outcome.recommendations.is_empty());

    let (scores, _savings, summary) = scoring::score(&outcome.recommendations, &pricing);
    assert!(scores.is_empty());
    assert_eq!(summary.total_monthly_savings, 0.0);
    assert_eq!(summary.count, 0);

    let mut run = optimizer_core::models::Run {
        run_id: Uuid::new_v4(),
        status: optimizer_core::models::RunStatus::Scanned,
        recommendations: outcome.recommendations,
        scores,
        savings_details: Vec::new(),
        savings_summary: Some(summary),
        execution: None,
        scan_errors: outcome.errors,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    assert!(!run.has_been_scored());
    run.status = optimizer_core::models::RunStatus::Scored;
    assert!(!run.has_been_scored(), "an empty score set is contractually distinct from a non-empty one");
}
