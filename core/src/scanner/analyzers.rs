//! The four pluggable analyzers (spec §4.2). Each is a pure function
//! from a slice of the object catalog to zero or more findings; none
//! hold state across calls, so the scanner can call them fresh on every
//! `scan()` with no residual accumulator (spec §9's re-architecture note
//! on "instance-mutable accumulators on the scanner").

use std::collections::HashMap;
use uuid::Uuid;

use crate::adapter::{LifecycleRule, MultipartUploadSummary, ObjectSummary};
use crate::config::{PricingConfig, ScannerThresholds};
use crate::models::{Recommendation, RecommendationDetails, RiskLevel};

const GLACIER_VARIANTS: [&str; 3] = ["GLACIER", "GLACIER_IR", "DEEP_ARCHIVE"];

fn is_glacier_variant(storage_class: &str) -> bool {
    GLACIER_VARIANTS.contains(&storage_class)
}

/// Storage-class analyzer, per object.
pub fn storage_class(
    bucket: &str,
    object: &ObjectSummary,
    days_since_modified: Option<i64>,
    thresholds: &ScannerThresholds,
    pricing: &PricingConfig,
) -> Vec<Recommendation> {
    if is_glacier_variant(&object.storage_class) {
        return vec![];
    }
    let Some(days) = days_since_modified else {
        return vec![];
    };

    if object.size_bytes >= thresholds.min_object_bytes
        && object.storage_class == "STANDARD"
        && days >= thresholds.stale_days
    {
        let savings = pricing.monthly_savings(object.size_bytes, "STANDARD", "GLACIER_IR");
        return vec![Recommendation {
            id: Uuid::new_v4(),
            bucket: bucket.to_string(),
            key: Some(object.key.clone()),
            risk_level: RiskLevel::Medium,
            reason: format!("object has not been modified in {days} days, stale threshold is {}", thresholds.stale_days),
            recommended_action: "transition to GLACIER_IR".to_string(),
            estimated_monthly_savings: savings,
            size_bytes: object.size_bytes,
            storage_class: Some(object.storage_class.clone()),
            last_modified: object.last_modified,
            details: RecommendationDetails::ChangeStorageClass {
                target_storage_class: "GLACIER_IR".to_string(),
            },
        }];
    }

    if object.storage_class == "STANDARD"
        && object.size_bytes >= thresholds.large_object_bytes
        && (30..thresholds.stale_days).contains(&days)
    {
        return vec![Recommendation {
            id: Uuid::new_v4(),
            bucket: bucket.to_string(),
            key: Some(object.key.clone()),
            risk_level: RiskLevel::Low,
            reason: format!("object is {days} days old, a candidate for intelligent tiering"),
            recommended_action: "transition to INTELLIGENT_TIERING".to_string(),
            estimated_monthly_savings: 0.0,
            size_bytes: object.size_bytes,
            storage_class: Some(object.storage_class.clone()),
            last_modified: object.last_modified,
            details: RecommendationDetails::ChangeStorageClass {
                target_storage_class: "INTELLIGENT_TIERING".to_string(),
            },
        }];
    }

    vec![]
}

/// Access-pattern analyzer, per object: the very-stale deletion rule.
pub fn access_pattern_per_object(
    bucket: &str,
    object: &ObjectSummary,
    days_since_modified: Option<i64>,
    thresholds: &ScannerThresholds,
    pricing: &PricingConfig,
) -> Vec<Recommendation> {
    let Some(days) = days_since_modified else {
        return vec![];
    };
    if days < thresholds.very_stale_days {
        return vec![];
    }

    let current_cost = object.size_bytes as f64 / crate::config::GIB * pricing.rate(&object.storage_class);

    vec![Recommendation {
        id: Uuid::new_v4(),
        bucket: bucket.to_string(),
        key: Some(object.key.clone()),
        risk_level: RiskLevel::High,
        reason: format!("object has not been modified in {days} days, very-stale threshold is {}", thresholds.very_stale_days),
        recommended_action: "delete stale object".to_string(),
        estimated_monthly_savings: crate::config::round4(current_cost),
        size_bytes: object.size_bytes,
        storage_class: Some(object.storage_class.clone()),
        last_modified: object.last_modified,
        details: RecommendationDetails::DeleteStaleObject { prefix_aggregate: false },
    }]
}

fn first_path_segment(key: &str) -> &str {
    key.split('/').next().unwrap_or(key)
}

/// Access-pattern analyzer, prefix aggregation: one finding per prefix
/// with enough stale members, emitted as a bucket-level "<prefix>/" key.
pub fn access_pattern_prefix_aggregate(
    bucket: &str,
    objects: &[ObjectSummary],
    days_since: impl Fn(Option<chrono::DateTime<chrono::Utc>>) -> Option<i64>,
    thresholds: &ScannerThresholds,
) -> Vec<Recommendation> {
    let mut groups: HashMap<&str, Vec<&ObjectSummary>> = HashMap::new();
    for object in objects {
        groups.entry(first_path_segment(&object.key)).or_default().push(object);
    }

    let mut out = Vec::new();
    for (prefix, members) in groups {
        if members.len() < thresholds.prefix_aggregation_min_count {
            continue;
        }
        let newest_age = members
            .iter()
            .filter_map(|o| days_since(o.last_modified))
            .min();
        let Some(newest_age) = newest_age else { continue };
        if newest_age < thresholds.prefix_aggregation_stale_days {
            continue;
        }

        let total_size: u64 = members.iter().map(|o| o.size_bytes).sum();
        out.push(Recommendation {
            id: Uuid::new_v4(),
            bucket: bucket.to_string(),
            key: Some(format!("{prefix}/")),
            risk_level: RiskLevel::High,
            reason: format!(
                "{} objects under prefix '{prefix}/' are all at least {} days old",
                members.len(),
                thresholds.prefix_aggregation_stale_days
            ),
            recommended_action: "delete stale object prefix".to_string(),
            estimated_monthly_savings: 0.0,
            size_bytes: total_size,
            storage_class: None,
            last_modified: None,
            details: RecommendationDetails::DeleteStaleObject { prefix_aggregate: true },
        });
    }
    out
}

/// Lifecycle analyzer, per bucket.
pub fn lifecycle(
    bucket: &str,
    total_size_bytes: u64,
    existing_rules: Option<&[LifecycleRule]>,
    thresholds: &ScannerThresholds,
    pricing: &PricingConfig,
) -> Vec<Recommendation> {
    const HUNDRED_MB: u64 = 100 * 1024 * 1024;
    const ONE_GB: u64 = 1024 * 1024 * 1024;

    if total_size_bytes < HUNDRED_MB {
        return vec![];
    }

    let size_gb = total_size_bytes as f64 / crate::config::GIB;
    let standard_cost = size_gb * pricing.rate("STANDARD");

    let Some(rules) = existing_rules else {
        return vec![Recommendation {
            id: Uuid::new_v4(),
            bucket: bucket.to_string(),
            key: None,
            risk_level: RiskLevel::Low,
            reason: "bucket has no lifecycle configuration".to_string(),
            recommended_action: "add a lifecycle policy".to_string(),
            estimated_monthly_savings: crate::config::round4(standard_cost * 0.10),
            size_bytes: total_size_bytes,
            storage_class: None,
            last_modified: None,
            details: RecommendationDetails::AddLifecyclePolicy,
        }];
    };

    let enabled: Vec<&LifecycleRule> = rules.iter().filter(|r| r.enabled).collect();
    let mut out = Vec::new();

    let has_multipart_abort = enabled.iter().any(|r| r.abort_incomplete_multipart_after_days.is_some());
    if !has_multipart_abort {
        out.push(Recommendation {
            id: Uuid::new_v4(),
            bucket: bucket.to_string(),
            key: None,
            risk_level: RiskLevel::Low,
            reason: "no rule aborts incomplete multipart uploads".to_string(),
            recommended_action: "add an abort-incomplete-multipart-upload rule".to_string(),
            estimated_monthly_savings: 0.0,
            size_bytes: total_size_bytes,
            storage_class: None,
            last_modified: None,
            details: RecommendationDetails::AddLifecyclePolicy,
        });
    }

    let has_transitions = enabled.iter().any(|r| !r.transitions.is_empty());
    if !has_transitions && total_size_bytes > ONE_GB {
        out.push(Recommendation {
            id: Uuid::new_v4(),
            bucket: bucket.to_string(),
            key: None,
            risk_level: RiskLevel::Low,
            reason: "no transition rules configured for a bucket over 1 GiB".to_string(),
            recommended_action: "add a storage-class transition rule".to_string(),
            estimated_monthly_savings: crate::config::round4(standard_cost * 0.30),
            size_bytes: total_size_bytes,
            storage_class: None,
            last_modified: None,
            details: RecommendationDetails::AddLifecyclePolicy,
        });
    }

    out
}

/// Multipart analyzer, per bucket.
pub fn multipart(
    bucket: &str,
    uploads: &[MultipartUploadSummary],
    now: chrono::DateTime<chrono::Utc>,
    thresholds: &ScannerThresholds,
    pricing: &PricingConfig,
) -> Vec<Recommendation> {
    uploads
        .iter()
        .filter(|u| (now - u.initiated).num_days() >= thresholds.multipart_age_days)
        .map(|u| {
            let size_bytes: u64 = u.part_sizes_bytes.as_ref().map(|parts| parts.iter().sum()).unwrap_or(0);
            let savings = if size_bytes > 0 {
                crate::config::round4(size_bytes as f64 / crate::config::GIB * pricing.rate("STANDARD"))
            } else {
                0.0
            };
            Recommendation {
                id: Uuid::new_v4(),
                bucket: bucket.to_string(),
                key: Some(u.key.clone()),
                risk_level: RiskLevel::Low,
                reason: format!(
                    "multipart upload initiated {} days ago, older than the {}-day threshold",
                    (now - u.initiated).num_days(),
                    thresholds.multipart_age_days
                ),
                recommended_action: "abort incomplete multipart upload".to_string(),
                estimated_monthly_savings: savings,
                size_bytes,
                storage_class: None,
                last_modified: Some(u.initiated),
                details: RecommendationDetails::DeleteIncompleteUpload { upload_ids: vec![u.upload_id.clone()] },
            }
        })
        .collect()
}
