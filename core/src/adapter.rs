//! External-resource adapter (spec §4.8): the narrow verb surface the
//! scanner, executor, and rollback manager use to talk to the remote
//! object store. No cloud-vendor vocabulary beyond bucket/key/tags —
//! callers supply a concrete implementation.
//!
//! Grounded on the teacher indexer's `StellarRpcClient` trait boundary
//! and its `RpcError` enum (`indexer/src/rpc.rs`): a thin `#[async_trait]`
//! surface with a small typed error enum, not a cloud SDK wrapped ad-hoc.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("locked: {0}")]
    Locked(String),
    #[error("transient error: {0}")]
    Transient(String),
    #[error("adapter error: {0}")]
    Other(String),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

#[derive(Debug, Clone)]
pub struct BucketInfo {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub key: String,
    pub size_bytes: u64,
    pub storage_class: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LifecycleRule {
    pub id: String,
    pub enabled: bool,
    pub prefix: Option<String>,
    pub transitions: Vec<LifecycleTransition>,
    pub abort_incomplete_multipart_after_days: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct LifecycleTransition {
    pub days: i64,
    pub storage_class: String,
}

#[derive(Debug, Clone)]
pub struct MultipartUploadSummary {
    pub key: String,
    pub upload_id: String,
    pub initiated: DateTime<Utc>,
    pub part_sizes_bytes: Option<Vec<u64>>,
}

#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub key: String,
    pub size_bytes: u64,
    pub storage_class: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectRetention {
    pub mode: Option<String>,
    pub retain_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectLegalHold {
    pub on: bool,
}

/// Thin verb surface wrapping the cloud client (spec §4.8). Every verb
/// reports a classified `AdapterError` rather than a cloud-vendor error
/// code; higher layers switch on the enum, never on a string.
#[async_trait]
pub trait ExternalResourceAdapter: Send + Sync {
    async fn list_buckets(&self) -> AdapterResult<Vec<BucketInfo>>;
    async fn list_objects(&self, bucket: &str, max: usize) -> AdapterResult<Vec<ObjectSummary>>;
    async fn get_lifecycle(&self, bucket: &str) -> AdapterResult<Option<Vec<LifecycleRule>>>;
    async fn put_lifecycle(&self, bucket: &str, rules: &[LifecycleRule]) -> AdapterResult<()>;
    async fn delete_lifecycle(&self, bucket: &str) -> AdapterResult<()>;
    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> AdapterResult<Vec<MultipartUploadSummary>>;
    async fn head_object(&self, bucket: &str, key: &str) -> AdapterResult<ObjectHead>;
    async fn get_object_tags(&self, bucket: &str, key: &str) -> AdapterResult<HashMap<String, String>>;
    async fn put_object_tags(
        &self,
        bucket: &str,
        key: &str,
        tags: &HashMap<String, String>,
    ) -> AdapterResult<()>;
    async fn copy_self_with_class(&self, bucket: &str, key: &str, storage_class: &str) -> AdapterResult<()>;
    async fn delete_object(&self, bucket: &str, key: &str, version_id: Option<&str>) -> AdapterResult<()>;
    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> AdapterResult<()>;
    async fn get_object_retention(&self, bucket: &str, key: &str) -> AdapterResult<ObjectRetention>;
    async fn get_object_legal_hold(&self, bucket: &str, key: &str) -> AdapterResult<ObjectLegalHold>;
}
