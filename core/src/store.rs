//! Run store (spec §4.5): the durable state machine binding scan, score,
//! execute, and rollback together. A single `tokio::sync::Mutex` guards
//! every mutating operation so that in-memory bookkeeping and the
//! Postgres write land in the same critical section — the same
//! discipline the teacher indexer applies to its checkpoint state in
//! `indexer/src/state.rs`, just against the run aggregate instead.
//!
//! Queries are written with `sqlx::query`/`query_as` and runtime
//! parameter binding rather than the `query!` macro, matching
//! `scanner_service.rs`'s style, so the crate builds without a live
//! database.

use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    ExecuteResponse, ExecutionAuditRecord, Recommendation, RiskScore, Run, RunStatus, SavingsEstimate,
    SavingsSummary,
};

pub struct RunStore {
    pool: PgPool,
    write_lock: Mutex<()>,
}

impl RunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, write_lock: Mutex::new(()) }
    }

    pub async fn create(&self, recommendations: Vec<Recommendation>, scan_errors: Vec<String>) -> Result<Run, CoreError> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let run = Run {
            run_id: Uuid::new_v4(),
            status: RunStatus::Scanned,
            recommendations,
            scores: Vec::new(),
            savings_details: Vec::new(),
            savings_summary: None,
            execution: None,
            scan_errors,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO runs (run_id, status, recommendations_json, scores_json, savings_details_json, \
             savings_summary_json, execution_json, scan_errors_json, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(run.run_id)
        .bind(run.status)
        .bind(serde_json::to_value(&run.recommendations)?)
        .bind(serde_json::to_value(&run.scores)?)
        .bind(serde_json::to_value(&run.savings_details)?)
        .bind(serde_json::to_value(&run.savings_summary)?)
        .bind(serde_json::to_value(&run.execution)?)
        .bind(serde_json::to_value(&run.scan_errors)?)
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(run_id = %run.run_id, finding_count = run.recommendations.len(), "run created");
        Ok(run)
    }

    pub async fn get(&self, run_id: Uuid) -> Result<Option<Run>, CoreError> {
        let row = sqlx::query("SELECT * FROM runs WHERE run_id = $1").bind(run_id).fetch_optional(&self.pool).await?;
        row.map(run_from_row).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Run>, CoreError> {
        let rows = sqlx::query("SELECT * FROM runs ORDER BY updated_at DESC").fetch_all(&self.pool).await?;
        rows.into_iter().map(run_from_row).collect()
    }

    /// Advances status to SCORED (status only ever moves forward —
    /// executing never reverts to SCORED, per spec §3's monotonicity
    /// invariant, so only a run still at SCANNED is promoted here).
    pub async fn set_scores(
        &self,
        run_id: Uuid,
        scores: Vec<RiskScore>,
        savings_details: Vec<SavingsEstimate>,
        summary: SavingsSummary,
    ) -> Result<Option<Run>, CoreError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut run) = self.get(run_id).await? else { return Ok(None) };

        run.scores = scores;
        run.savings_details = savings_details;
        run.savings_summary = Some(summary);
        if run.status < RunStatus::Scored {
            run.status = RunStatus::Scored;
        }
        run.updated_at = Utc::now();

        sqlx::query(
            "UPDATE runs SET status = $2, scores_json = $3, savings_details_json = $4, \
             savings_summary_json = $5, updated_at = $6 WHERE run_id = $1",
        )
        .bind(run.run_id)
        .bind(run.status)
        .bind(serde_json::to_value(&run.scores)?)
        .bind(serde_json::to_value(&run.savings_details)?)
        .bind(serde_json::to_value(&run.savings_summary)?)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(run_id = %run_id, score_count = run.scores.len(), "run scored");
        Ok(Some(run))
    }

    /// Writes every action result as an audit row and the run's latest
    /// execution pointer in one transaction — audit insertion and the
    /// run update cannot partially succeed (spec §4.5).
    pub async fn set_execution(&self, run_id: Uuid, response: ExecuteResponse) -> Result<Option<Run>, CoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM runs WHERE run_id = $1")
            .bind(run_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            tx.rollback().await?;
            return Ok(None);
        }

        let now = Utc::now();
        for result in &response.action_results {
            let audit = ExecutionAuditRecord::from_action_result(run_id, response.execution_id, result, now);
            insert_audit_row(&mut tx, &audit).await?;
        }

        sqlx::query(
            "UPDATE runs SET status = $2, execution_json = $3, updated_at = $4 WHERE run_id = $1",
        )
        .bind(run_id)
        .bind(RunStatus::Executed)
        .bind(serde_json::to_value(&response)?)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            run_id = %run_id,
            execution_id = %response.execution_id,
            executed = response.executed,
            failed = response.failed,
            "execution recorded"
        );

        self.get(run_id).await
    }

    /// An empty or omitted `audit_ids` means "no audit-id filter" — this
    /// is contractual (spec §4.5), not an incidental default.
    pub async fn list_execution_audit(
        &self,
        run_id: Uuid,
        execution_id: Option<Uuid>,
        audit_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ExecutionAuditRecord>, CoreError> {
        let audit_ids = audit_ids.filter(|ids| !ids.is_empty());

        let rows = match (execution_id, audit_ids) {
            (Some(exec_id), Some(ids)) => {
                sqlx::query(
                    "SELECT * FROM execution_audit WHERE run_id = $1 AND execution_id = $2 \
                     AND audit_id = ANY($3) ORDER BY created_at DESC",
                )
                .bind(run_id)
                .bind(exec_id)
                .bind(ids)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(exec_id), None) => {
                sqlx::query(
                    "SELECT * FROM execution_audit WHERE run_id = $1 AND execution_id = $2 \
                     ORDER BY created_at DESC",
                )
                .bind(run_id)
                .bind(exec_id)
                .fetch_all(&self.pool)
                .await?
            }
            (None, Some(ids)) => {
                sqlx::query(
                    "SELECT * FROM execution_audit WHERE run_id = $1 AND audit_id = ANY($2) \
                     ORDER BY created_at DESC",
                )
                .bind(run_id)
                .bind(ids)
                .fetch_all(&self.pool)
                .await?
            }
            (None, None) => {
                sqlx::query("SELECT * FROM execution_audit WHERE run_id = $1 ORDER BY created_at DESC")
                    .bind(run_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(audit_from_row).collect()
    }

    /// Atomic: sets `rolled_back_at` iff `status = ROLLED_BACK`, keeps
    /// the existing message when `message` is `None`, and bumps the
    /// owning run's `updated_at`. Returns `true` iff the row existed.
    pub async fn update_rollback_status(
        &self,
        audit_id: Uuid,
        status: crate::models::RollbackStatus,
        message: Option<String>,
    ) -> Result<bool, CoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query("SELECT run_id, message FROM execution_audit WHERE audit_id = $1")
            .bind(audit_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(false);
        };

        let run_id: Uuid = row.try_get("run_id")?;
        let existing_message: String = row.try_get("message")?;
        let final_message = message.unwrap_or(existing_message);
        let now = Utc::now();
        let rolled_back_at = matches!(status, crate::models::RollbackStatus::RolledBack).then_some(now);

        sqlx::query(
            "UPDATE execution_audit SET rollback_status = $2, message = $3, rolled_back_at = COALESCE($4, rolled_back_at) \
             WHERE audit_id = $1",
        )
        .bind(audit_id)
        .bind(status)
        .bind(&final_message)
        .bind(rolled_back_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE runs SET updated_at = $2 WHERE run_id = $1").bind(run_id).bind(now).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(true)
    }
}

async fn insert_audit_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    audit: &ExecutionAuditRecord,
) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO execution_audit (audit_id, execution_id, run_id, recommendation_id, recommendation_type, \
         bucket, key, action_status, message, risk_level, requires_approval, permitted, required_permissions_json, \
         missing_permissions_json, simulated, pre_change_state_json, post_change_state_json, rollback_available, \
         rollback_status, rolled_back_at, created_at) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21) \
         ON CONFLICT (audit_id) DO UPDATE SET \
         action_status = EXCLUDED.action_status, message = EXCLUDED.message, \
         rollback_status = EXCLUDED.rollback_status, rolled_back_at = EXCLUDED.rolled_back_at",
    )
    .bind(audit.audit_id)
    .bind(audit.execution_id)
    .bind(audit.run_id)
    .bind(audit.recommendation_id)
    .bind(audit.recommendation_type)
    .bind(&audit.bucket)
    .bind(&audit.key)
    .bind(audit.action_status)
    .bind(&audit.message)
    .bind(audit.risk_level)
    .bind(audit.requires_approval)
    .bind(audit.permitted)
    .bind(serde_json::to_value(&audit.required_permissions)?)
    .bind(serde_json::to_value(&audit.missing_permissions)?)
    .bind(audit.simulated)
    .bind(serde_json::to_value(&audit.pre_change_state)?)
    .bind(serde_json::to_value(&audit.post_change_state)?)
    .bind(audit.rollback_available)
    .bind(audit.rollback_status)
    .bind(audit.rolled_back_at)
    .bind(audit.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn run_from_row(row: PgRow) -> Result<Run, CoreError> {
    Ok(Run {
        run_id: row.try_get("run_id")?,
        status: row.try_get("status")?,
        recommendations: serde_json::from_value(row.try_get("recommendations_json")?)?,
        scores: serde_json::from_value(row.try_get("scores_json")?)?,
        savings_details: serde_json::from_value(row.try_get("savings_details_json")?)?,
        savings_summary: serde_json::from_value(row.try_get("savings_summary_json")?)?,
        execution: serde_json::from_value(row.try_get("execution_json")?)?,
        scan_errors: serde_json::from_value(row.try_get("scan_errors_json")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn audit_from_row(row: PgRow) -> Result<ExecutionAuditRecord, CoreError> {
    Ok(ExecutionAuditRecord {
        audit_id: row.try_get("audit_id")?,
        execution_id: row.try_get("execution_id")?,
        run_id: row.try_get("run_id")?,
        recommendation_id: row.try_get("recommendation_id")?,
        recommendation_type: row.try_get("recommendation_type")?,
        bucket: row.try_get("bucket")?,
        key: row.try_get("key")?,
        action_status: row.try_get("action_status")?,
        message: row.try_get("message")?,
        risk_level: row.try_get("risk_level")?,
        requires_approval: row.try_get("requires_approval")?,
        permitted: row.try_get("permitted")?,
        required_permissions: serde_json::from_value(row.try_get("required_permissions_json")?)?,
        missing_permissions: serde_json::from_value(row.try_get("missing_permissions_json")?)?,
        simulated: row.try_get("simulated")?,
        pre_change_state: serde_json::from_value(row.try_get("pre_change_state_json")?)?,
        post_change_state: serde_json::from_value(row.try_get("post_change_state_json")?)?,
        rollback_available: row.try_get("rollback_available")?,
        rollback_status: row.try_get("rollback_status")?,
        rolled_back_at: row.try_get("rolled_back_at")?,
        created_at: row.try_get("created_at")?,
    })
}
