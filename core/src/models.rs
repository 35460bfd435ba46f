//! Shared data types for the cost-optimization pipeline.
//!
//! Findings are modeled as a tagged variant per `RecommendationType` (a
//! common envelope plus a type-specific `details` payload) rather than a
//! dynamically-typed map with optional keys, so that every consumer of a
//! `Recommendation` pattern-matches on exactly the fields that type can
//! carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────
// Recommendation (finding)
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    ChangeStorageClass,
    AddLifecyclePolicy,
    DeleteIncompleteUpload,
    DeleteStaleObject,
    DeleteOldVersion,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_risk_score(score: i32) -> Self {
        if score < 30 {
            RiskLevel::Low
        } else if score < 60 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

/// Type-specific payload for a recommendation. Carries only the fields
/// relevant to that recommendation's type; the common envelope lives on
/// `Recommendation` itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecommendationDetails {
    /// The structured counterpart of `recommended_action`'s prose —
    /// scorer and executor consume this field, never the display string.
    ChangeStorageClass { target_storage_class: String },
    AddLifecyclePolicy,
    DeleteIncompleteUpload { upload_ids: Vec<String> },
    DeleteStaleObject { prefix_aggregate: bool },
    DeleteOldVersion { version_id: Option<String> },
}

impl RecommendationDetails {
    pub fn recommendation_type(&self) -> RecommendationType {
        match self {
            RecommendationDetails::ChangeStorageClass { .. } => RecommendationType::ChangeStorageClass,
            RecommendationDetails::AddLifecyclePolicy => RecommendationType::AddLifecyclePolicy,
            RecommendationDetails::DeleteIncompleteUpload { .. } => RecommendationType::DeleteIncompleteUpload,
            RecommendationDetails::DeleteStaleObject { .. } => RecommendationType::DeleteStaleObject,
            RecommendationDetails::DeleteOldVersion { .. } => RecommendationType::DeleteOldVersion,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub id: Uuid,
    pub bucket: String,
    /// Null when the finding is bucket-level (e.g. a lifecycle policy gap).
    pub key: Option<String>,
    pub risk_level: RiskLevel,
    pub reason: String,
    /// Human-readable action, for display only. The structured
    /// counterpart lives on `details` for `ChangeStorageClass`.
    pub recommended_action: String,
    pub estimated_monthly_savings: f64,
    pub size_bytes: u64,
    pub storage_class: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub details: RecommendationDetails,
}

impl Recommendation {
    pub fn recommendation_type(&self) -> RecommendationType {
        self.details.recommendation_type()
    }

    /// The `(bucket, key, type)` dedup key the scanner collapses on.
    pub fn dedup_key(&self) -> (String, Option<String>, RecommendationType) {
        (self.bucket.clone(), self.key.clone(), self.recommendation_type())
    }
}

// ─────────────────────────────────────────────────────────
// RiskScore
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_confidence_score(score: i32) -> Self {
        if score >= 70 {
            ConfidenceLevel::High
        } else if score >= 50 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactorScores {
    pub reversibility: i32,
    pub data_loss_risk: i32,
    pub age_confidence: i32,
    pub size_impact: i32,
    pub access_confidence: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskScore {
    pub recommendation_id: Uuid,
    pub risk_score: i32,
    pub confidence_score: i32,
    pub impact_score: i32,
    pub risk_level: RiskLevel,
    pub confidence_level: ConfidenceLevel,
    pub safe_to_automate: bool,
    pub requires_approval: bool,
    pub factor_scores: FactorScores,
    pub factors: Vec<String>,
    pub execution_recommendation: String,
}

// ─────────────────────────────────────────────────────────
// SavingsEstimate
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EstimateConfidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavingsEstimate {
    pub recommendation_id: Uuid,
    pub current_monthly_cost: f64,
    pub projected_monthly_cost: f64,
    pub monthly_savings: f64,
    pub transition_cost: f64,
    pub minimum_duration_risk: f64,
    pub net_first_month: f64,
    pub net_annual_savings: f64,
    pub break_even_days: Option<i64>,
    pub estimate_confidence: EstimateConfidence,
    pub assumptions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SavingsSummary {
    pub total_monthly_savings: f64,
    pub total_annual_savings: f64,
    pub total_transition_costs: f64,
    pub net_first_month: f64,
    pub count: usize,
    pub high_confidence_count: usize,
    pub medium_confidence_count: usize,
    pub low_confidence_count: usize,
}

// ─────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Scanned,
    Scored,
    Executed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub recommendations: Vec<Recommendation>,
    pub scores: Vec<RiskScore>,
    pub savings_details: Vec<SavingsEstimate>,
    pub savings_summary: Option<SavingsSummary>,
    pub execution: Option<ExecuteResponse>,
    pub scan_errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// A run is considered "scored" only when a non-empty score set has
    /// been recorded — an empty `scores[]` from scoring an empty scan is
    /// contractually distinct from "never scored" (spec.md §8 scenario F).
    pub fn has_been_scored(&self) -> bool {
        !self.scores.is_empty()
    }
}

// ─────────────────────────────────────────────────────────
// Execute request/response
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    DryRun,
    Safe,
    Standard,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub run_id: Uuid,
    pub mode: ExecutionMode,
    /// Explicit override. `None` defers to mode-derived default.
    #[serde(default)]
    pub dry_run: Option<bool>,
    pub max_actions: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    DryRun,
    Executed,
    Skipped,
    Blocked,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    NotApplicable,
    Pending,
    RolledBack,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionActionResult {
    pub audit_id: Uuid,
    pub recommendation_id: Uuid,
    pub recommendation_type: RecommendationType,
    pub bucket: String,
    pub key: Option<String>,
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
    pub status: ActionStatus,
    pub message: String,
    pub permitted: bool,
    pub required_permissions: Vec<String>,
    pub missing_permissions: Vec<String>,
    pub simulated: bool,
    pub pre_change_state: HashMap<String, serde_json::Value>,
    pub post_change_state: Option<HashMap<String, serde_json::Value>>,
    pub rollback_available: bool,
    pub rollback_status: RollbackStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecuteResponse {
    pub execution_id: Uuid,
    pub run_id: Uuid,
    pub mode: ExecutionMode,
    pub dry_run: bool,
    pub eligible: usize,
    pub executed: usize,
    pub skipped: usize,
    pub blocked: usize,
    pub failed: usize,
    pub action_results: Vec<ExecutionActionResult>,
    pub errors: Vec<String>,
    pub executed_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────
// ExecutionAuditRecord (row of `execution_audit`)
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionAuditRecord {
    pub audit_id: Uuid,
    pub execution_id: Uuid,
    pub run_id: Uuid,
    pub recommendation_id: Uuid,
    pub recommendation_type: RecommendationType,
    pub bucket: String,
    pub key: Option<String>,
    pub action_status: ActionStatus,
    pub message: String,
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
    pub permitted: bool,
    pub required_permissions: Vec<String>,
    pub missing_permissions: Vec<String>,
    pub simulated: bool,
    pub pre_change_state: HashMap<String, serde_json::Value>,
    pub post_change_state: Option<HashMap<String, serde_json::Value>>,
    pub rollback_available: bool,
    pub rollback_status: RollbackStatus,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ExecutionAuditRecord {
    pub fn from_action_result(
        run_id: Uuid,
        execution_id: Uuid,
        result: &ExecutionActionResult,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            audit_id: result.audit_id,
            execution_id,
            run_id,
            recommendation_id: result.recommendation_id,
            recommendation_type: result.recommendation_type,
            bucket: result.bucket.clone(),
            key: result.key.clone(),
            action_status: result.status,
            message: result.message.clone(),
            risk_level: result.risk_level,
            requires_approval: result.requires_approval,
            permitted: result.permitted,
            required_permissions: result.required_permissions.clone(),
            missing_permissions: result.missing_permissions.clone(),
            simulated: result.simulated,
            pre_change_state: result.pre_change_state.clone(),
            post_change_state: result.post_change_state.clone(),
            rollback_available: result.rollback_available,
            rollback_status: result.rollback_status,
            rolled_back_at: None,
            created_at,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Rollback request/response
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RollbackRequest {
    pub run_id: Uuid,
    #[serde(default)]
    pub execution_id: Option<Uuid>,
    #[serde(default)]
    pub audit_ids: Vec<Uuid>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub stop_on_failure: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RollbackActionStatus {
    RolledBack,
    Skipped,
    Failed,
    DryRun,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollbackActionResult {
    pub audit_id: Uuid,
    pub recommendation_id: Uuid,
    pub recommendation_type: RecommendationType,
    pub status: RollbackActionStatus,
    pub message: String,
    pub rolled_back: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollbackResponse {
    pub run_id: Uuid,
    pub execution_id: Option<Uuid>,
    pub dry_run: bool,
    pub attempted: usize,
    pub rolled_back: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<RollbackActionResult>,
    pub processed_at: DateTime<Utc>,
}
