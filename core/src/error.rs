//! Typed core-level error taxonomy (spec §7).
//!
//! Only configuration and contract violations raise here — non-fatal
//! per-action failures are reported inside `ExecuteResponse`/
//! `RollbackResponse`, never as an `Err`. Grounded on the teacher
//! indexer's `ConfigError`/`RpcError` enums (`indexer/src/config.rs`,
//! `indexer/src/rpc.rs`): a flat `thiserror` enum, one variant per
//! failure kind, mapped to HTTP status by the `api` crate.

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("run {0} has not been scored")]
    RunNotScored(Uuid),

    #[error("run {0} has no execution on record")]
    RunNotExecuted(Uuid),

    #[error("no audit records match the requested filter")]
    NoMatchingAuditRecords,

    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("adapter is unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
