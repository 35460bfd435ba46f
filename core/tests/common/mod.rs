//! In-memory `ExternalResourceAdapter` fixture for integration tests —
//! no network, no cloud credentials. Each scenario configures the
//! buckets/objects/lifecycle/multipart state it needs and asserts
//! against the mutation log afterward.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optimizer_core::adapter::{
    AdapterError, AdapterResult, BucketInfo, ExternalResourceAdapter, LifecycleRule, MultipartUploadSummary,
    ObjectHead, ObjectLegalHold, ObjectRetention, ObjectSummary,
};

#[derive(Debug, Clone, Default)]
pub struct MockBucket {
    pub objects: Vec<ObjectSummary>,
    pub lifecycle: Option<Vec<LifecycleRule>>,
    pub multipart_uploads: Vec<MultipartUploadSummary>,
}

#[derive(Debug, Clone)]
pub enum MockCall {
    PutLifecycle { bucket: String, rule_ids: Vec<String> },
    DeleteLifecycle { bucket: String },
    CopySelfWithClass { bucket: String, key: String, storage_class: String },
    DeleteObject { bucket: String, key: String },
    AbortMultipart { bucket: String, key: String, upload_id: String },
}

#[derive(Default)]
pub struct MockAdapter {
    pub buckets: Mutex<HashMap<String, MockBucket>>,
    pub calls: Mutex<Vec<MockCall>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(self, name: &str, bucket: MockBucket) -> Self {
        self.buckets.lock().unwrap().insert(name.to_string(), bucket);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn object(key: &str, size_bytes: u64, storage_class: &str, age_days: i64) -> ObjectSummary {
    ObjectSummary {
        key: key.to_string(),
        size_bytes,
        storage_class: storage_class.to_string(),
        last_modified: Some(Utc::now() - chrono::Duration::days(age_days)),
        etag: Some(format!("\"{key}-etag\"")),
    }
}

#[async_trait]
impl ExternalResourceAdapter for MockAdapter {
    async fn list_buckets(&self) -> AdapterResult<Vec<BucketInfo>> {
        Ok(self.buckets.lock().unwrap().keys().map(|name| BucketInfo { name: name.clone() }).collect())
    }

    async fn list_objects(&self, bucket: &str, max: usize) -> AdapterResult<Vec<ObjectSummary>> {
        let buckets = self.buckets.lock().unwrap();
        let b = buckets.get(bucket).ok_or_else(|| AdapterError::NotFound(bucket.to_string()))?;
        Ok(b.objects.iter().take(max).cloned().collect())
    }

    async fn get_lifecycle(&self, bucket: &str) -> AdapterResult<Option<Vec<LifecycleRule>>> {
        let buckets = self.buckets.lock().unwrap();
        let b = buckets.get(bucket).ok_or_else(|| AdapterError::NotFound(bucket.to_string()))?;
        Ok(b.lifecycle.clone())
    }

    async fn put_lifecycle(&self, bucket: &str, rules: &[LifecycleRule]) -> AdapterResult<()> {
        let mut buckets = self.buckets.lock().unwrap();
        let b = buckets.get_mut(bucket).ok_or_else(|| AdapterError::NotFound(bucket.to_string()))?;
        b.lifecycle = Some(rules.to_vec());
        self.calls.lock().unwrap().push(MockCall::PutLifecycle {
            bucket: bucket.to_string(),
            rule_ids: rules.iter().map(|r| r.id.clone()).collect(),
        });
        Ok(())
    }

    async fn delete_lifecycle(&self, bucket: &str) -> AdapterResult<()> {
        let mut buckets = self.buckets.lock().unwrap();
        let b = buckets.get_mut(bucket).ok_or_else(|| AdapterError::NotFound(bucket.to_string()))?;
        b.lifecycle = None;
        self.calls.lock().unwrap().push(MockCall::DeleteLifecycle { bucket: bucket.to_string() });
        Ok(())
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        _prefix: Option<&str>,
    ) -> AdapterResult<Vec<MultipartUploadSummary>> {
        let buckets = self.buckets.lock().unwrap();
        let b = buckets.get(bucket).ok_or_else(|| AdapterError::NotFound(bucket.to_string()))?;
        Ok(b.multipart_uploads.clone())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> AdapterResult<ObjectHead> {
        let buckets = self.buckets.lock().unwrap();
        let b = buckets.get(bucket).ok_or_else(|| AdapterError::NotFound(bucket.to_string()))?;
        let obj = b.objects.iter().find(|o| o.key == key).ok_or_else(|| AdapterError::NotFound(key.to_string()))?;
        Ok(ObjectHead {
            key: obj.key.clone(),
            size_bytes: obj.size_bytes,
            storage_class: obj.storage_class.clone(),
            last_modified: obj.last_modified,
            etag: obj.etag.clone(),
            tags: HashMap::new(),
        })
    }

    async fn get_object_tags(&self, _bucket: &str, _key: &str) -> AdapterResult<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    async fn put_object_tags(&self, _bucket: &str, _key: &str, _tags: &HashMap<String, String>) -> AdapterResult<()> {
        Ok(())
    }

    async fn copy_self_with_class(&self, bucket: &str, key: &str, storage_class: &str) -> AdapterResult<()> {
        let mut buckets = self.buckets.lock().unwrap();
        let b = buckets.get_mut(bucket).ok_or_else(|| AdapterError::NotFound(bucket.to_string()))?;
        if let Some(obj) = b.objects.iter_mut().find(|o| o.key == key) {
            obj.storage_class = storage_class.to_string();
        }
        self.calls.lock().unwrap().push(MockCall::CopySelfWithClass {
            bucket: bucket.to_string(),
            key: key.to_string(),
            storage_class: storage_class.to_string(),
        });
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str, _version_id: Option<&str>) -> AdapterResult<()> {
        let mut buckets = self.buckets.lock().unwrap();
        let b = buckets.get_mut(bucket).ok_or_else(|| AdapterError::NotFound(bucket.to_string()))?;
        b.objects.retain(|o| o.key != key);
        self.calls.lock().unwrap().push(MockCall::DeleteObject { bucket: bucket.to_string(), key: key.to_string() });
        Ok(())
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> AdapterResult<()> {
        let mut buckets = self.buckets.lock().unwrap();
        let b = buckets.get_mut(bucket).ok_or_else(|| AdapterError::NotFound(bucket.to_string()))?;
        b.multipart_uploads.retain(|u| u.upload_id != upload_id);
        self.calls.lock().unwrap().push(MockCall::AbortMultipart {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        });
        Ok(())
    }

    async fn get_object_retention(&self, _bucket: &str, _key: &str) -> AdapterResult<ObjectRetention> {
        Ok(ObjectRetention::default())
    }

    async fn get_object_legal_hold(&self, _bucket: &str, _key: &str) -> AdapterResult<ObjectLegalHold> {
        Ok(ObjectLegalHold::default())
    }
}

pub fn timestamp(age_days: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::days(age_days)
}
