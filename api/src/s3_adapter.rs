//! Concrete `ExternalResourceAdapter` (spec.md §4.8) wrapping `aws-sdk-s3`.
//! This is the one place the real cloud SDK is touched — every other
//! module in `core` speaks only the trait. Errors from the SDK are
//! classified into the adapter's narrow taxonomy; callers never see an
//! AWS error code directly.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use optimizer_core::adapter::{
    AdapterError, AdapterResult, BucketInfo, ExternalResourceAdapter, LifecycleRule, LifecycleTransition,
    MultipartUploadSummary, ObjectHead, ObjectLegalHold, ObjectRetention, ObjectSummary,
};

pub struct S3Adapter {
    client: Client,
}

impl S3Adapter {
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self { client: Client::new(&config) }
    }
}

fn classify<E: std::fmt::Display>(err: SdkError<E>) -> AdapterError {
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            AdapterError::Transient(err.to_string())
        }
        _ => AdapterError::Other(err.to_string()),
    }
}

fn aws_time_to_chrono(t: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(t.secs(), 0)
}

#[async_trait]
impl ExternalResourceAdapter for S3Adapter {
    async fn list_buckets(&self) -> AdapterResult<Vec<BucketInfo>> {
        let resp = self.client.list_buckets().send().await.map_err(classify)?;
        Ok(resp
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(|name| BucketInfo { name: name.to_string() }))
            .collect())
    }

    async fn list_objects(&self, bucket: &str, max: usize) -> AdapterResult<Vec<ObjectSummary>> {
        let mut out = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(bucket).max_keys(max.min(1000).max(1) as i32);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let resp = req.send().await.map_err(|e| {
                if e.as_service_error().map(|s| s.is_no_such_bucket()).unwrap_or(false) {
                    AdapterError::NotFound(format!("bucket {bucket} does not exist"))
                } else {
                    classify(e)
                }
            })?;

            for obj in resp.contents() {
                out.push(ObjectSummary {
                    key: obj.key().unwrap_or_default().to_string(),
                    size_bytes: obj.size().unwrap_or(0).max(0) as u64,
                    storage_class: obj
                        .storage_class()
                        .map(|c| c.as_str().to_string())
                        .unwrap_or_else(|| "STANDARD".to_string()),
                    last_modified: obj.last_modified().and_then(aws_time_to_chrono),
                    etag: obj.e_tag().map(|s| s.trim_matches('"').to_string()),
                });
                if out.len() >= max {
                    return Ok(out);
                }
            }

            continuation = resp.next_continuation_token().map(|s| s.to_string());
            if continuation.is_none() || !resp.is_truncated().unwrap_or(false) {
                break;
            }
        }

        Ok(out)
    }

    async fn get_lifecycle(&self, bucket: &str) -> AdapterResult<Option<Vec<LifecycleRule>>> {
        let resp = self.client.get_bucket_lifecycle_configuration().bucket(bucket).send().await;
        match resp {
            Ok(resp) => Ok(Some(
                resp.rules()
                    .iter()
                    .map(|r| LifecycleRule {
                        id: r.id().unwrap_or_default().to_string(),
                        enabled: matches!(r.status(), aws_sdk_s3::types::ExpirationStatus::Enabled),
                        prefix: r.filter().and_then(|f| f.prefix()).map(|s| s.to_string()),
                        transitions: r
                            .transitions()
                            .iter()
                            .map(|t| LifecycleTransition {
                                days: t.days().unwrap_or(0) as i64,
                                storage_class: t.storage_class().map(|c| c.as_str().to_string()).unwrap_or_default(),
                            })
                            .collect(),
                        abort_incomplete_multipart_after_days: r
                            .abort_incomplete_multipart_upload()
                            .and_then(|a| a.days_after_initiation())
                            .map(|d| d as i64),
                    })
                    .collect(),
            )),
            Err(e) => {
                if e.as_service_error().map(|s| s.meta().code() == Some("NoSuchLifecycleConfiguration")).unwrap_or(false) {
                    Ok(None)
                } else if e.as_service_error().map(|s| s.meta().code() == Some("AccessDenied")).unwrap_or(false) {
                    Err(AdapterError::AccessDenied(format!("get_lifecycle on {bucket}")))
                } else {
                    Err(classify(e))
                }
            }
        }
    }

    async fn put_lifecycle(&self, bucket: &str, rules: &[LifecycleRule]) -> AdapterResult<()> {
        let aws_rules: Vec<aws_sdk_s3::types::LifecycleRule> = rules
            .iter()
            .map(|r| {
                let mut builder = aws_sdk_s3::types::LifecycleRule::builder()
                    .id(&r.id)
                    .status(if r.enabled {
                        aws_sdk_s3::types::ExpirationStatus::Enabled
                    } else {
                        aws_sdk_s3::types::ExpirationStatus::Disabled
                    })
                    .filter(
                        aws_sdk_s3::types::LifecycleRuleFilter::Prefix(r.prefix.clone().unwrap_or_default()),
                    );
                for t in &r.transitions {
                    builder = builder.transitions(
                        aws_sdk_s3::types::Transition::builder()
                            .days(t.days as i32)
                            .storage_class(aws_sdk_s3::types::TransitionStorageClass::from(t.storage_class.as_str()))
                            .build(),
                    );
                }
                if let Some(days) = r.abort_incomplete_multipart_after_days {
                    builder = builder.abort_incomplete_multipart_upload(
                        aws_sdk_s3::types::AbortIncompleteMultipartUpload::builder()
                            .days_after_initiation(days as i32)
                            .build(),
                    );
                }
                builder.build().expect("lifecycle rule missing required fields")
            })
            .collect();

        let config = aws_sdk_s3::types::BucketLifecycleConfiguration::builder().set_rules(Some(aws_rules)).build();

        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(bucket)
            .lifecycle_configuration(config.map_err(|e| AdapterError::Other(e.to_string()))?)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete_lifecycle(&self, bucket: &str) -> AdapterResult<()> {
        self.client.delete_bucket_lifecycle().bucket(bucket).send().await.map_err(classify)?;
        Ok(())
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> AdapterResult<Vec<MultipartUploadSummary>> {
        let mut req = self.client.list_multipart_uploads().bucket(bucket);
        if let Some(prefix) = prefix {
            req = req.prefix(prefix);
        }
        let resp = req.send().await.map_err(|e| {
            if e.as_service_error().map(|s| s.meta().code() == Some("AccessDenied")).unwrap_or(false) {
                AdapterError::AccessDenied(format!("list_multipart_uploads on {bucket}"))
            } else {
                classify(e)
            }
        })?;

        Ok(resp
            .uploads()
            .iter()
            .map(|u| MultipartUploadSummary {
                key: u.key().unwrap_or_default().to_string(),
                upload_id: u.upload_id().unwrap_or_default().to_string(),
                initiated: u.initiated().and_then(aws_time_to_chrono).unwrap_or_else(Utc::now),
                part_sizes_bytes: None,
            })
            .collect())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> AdapterResult<ObjectHead> {
        let resp = self.client.head_object().bucket(bucket).key(key).send().await.map_err(|e| {
            if e.as_service_error().map(|s| s.is_not_found()).unwrap_or(false) {
                AdapterError::NotFound(format!("{bucket}/{key}"))
            } else {
                classify(e)
            }
        })?;

        let tags = self.get_object_tags(bucket, key).await.unwrap_or_default();

        Ok(ObjectHead {
            key: key.to_string(),
            size_bytes: resp.content_length().unwrap_or(0).max(0) as u64,
            storage_class: resp.storage_class().map(|c| c.as_str().to_string()).unwrap_or_else(|| "STANDARD".to_string()),
            last_modified: resp.last_modified().and_then(aws_time_to_chrono),
            etag: resp.e_tag().map(|s| s.trim_matches('"').to_string()),
            tags,
        })
    }

    async fn get_object_tags(&self, bucket: &str, key: &str) -> AdapterResult<HashMap<String, String>> {
        let resp = self.client.get_object_tagging().bucket(bucket).key(key).send().await.map_err(classify)?;
        Ok(resp
            .tag_set()
            .iter()
            .map(|t| (t.key().to_string(), t.value().to_string()))
            .collect())
    }

    async fn put_object_tags(&self, bucket: &str, key: &str, tags: &HashMap<String, String>) -> AdapterResult<()> {
        let tag_set: Vec<aws_sdk_s3::types::Tag> = tags
            .iter()
            .map(|(k, v)| aws_sdk_s3::types::Tag::builder().key(k).value(v).build().expect("tag key/value set"))
            .collect();
        let tagging = aws_sdk_s3::types::Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| AdapterError::Other(e.to_string()))?;

        self.client
            .put_object_tagging()
            .bucket(bucket)
            .key(key)
            .tagging(tagging)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn copy_self_with_class(&self, bucket: &str, key: &str, storage_class: &str) -> AdapterResult<()> {
        let copy_source = format!("{bucket}/{}", urlencode(key));
        self.client
            .copy_object()
            .bucket(bucket)
            .key(key)
            .copy_source(copy_source)
            .storage_class(aws_sdk_s3::types::StorageClass::from(storage_class))
            .metadata_directive(aws_sdk_s3::types::MetadataDirective::Copy)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|s| s.meta().code() == Some("InvalidObjectState")).unwrap_or(false) {
                    AdapterError::InvalidState(format!("{bucket}/{key} is in an archived state"))
                } else {
                    classify(e)
                }
            })?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str, version_id: Option<&str>) -> AdapterResult<()> {
        let mut req = self.client.delete_object().bucket(bucket).key(key);
        if let Some(version_id) = version_id {
            req = req.version_id(version_id);
        }
        req.send().await.map_err(classify)?;
        Ok(())
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> AdapterResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|s| s.is_no_such_upload()).unwrap_or(false) {
                    AdapterError::NotFound(format!("upload {upload_id} for {bucket}/{key}"))
                } else {
                    classify(e)
                }
            })?;
        Ok(())
    }

    async fn get_object_retention(&self, bucket: &str, key: &str) -> AdapterResult<ObjectRetention> {
        match self.client.get_object_retention().bucket(bucket).key(key).send().await {
            Ok(resp) => Ok(ObjectRetention {
                mode: resp.retention().and_then(|r| r.mode()).map(|m| m.as_str().to_string()),
                retain_until: resp.retention().and_then(|r| r.retain_until_date()).and_then(aws_time_to_chrono),
            }),
            Err(e) => {
                if e.as_service_error().map(|s| s.meta().code() == Some("NoSuchObjectLockConfiguration")).unwrap_or(false) {
                    Ok(ObjectRetention::default())
                } else {
                    Err(classify(e))
                }
            }
        }
    }

    async fn get_object_legal_hold(&self, bucket: &str, key: &str) -> AdapterResult<ObjectLegalHold> {
        match self.client.get_object_legal_hold().bucket(bucket).key(key).send().await {
            Ok(resp) => Ok(ObjectLegalHold {
                on: resp.legal_hold().map(|h| matches!(h.status(), Some(aws_sdk_s3::types::ObjectLockLegalHoldStatus::On))).unwrap_or(false),
            }),
            Err(e) => {
                if e.as_service_error().map(|s| s.meta().code() == Some("NoSuchObjectLockConfiguration")).unwrap_or(false) {
                    Ok(ObjectLegalHold::default())
                } else {
                    Err(classify(e))
                }
            }
        }
    }
}

fn urlencode(key: &str) -> String {
    key.replace('%', "%25").replace(' ', "%20")
}
