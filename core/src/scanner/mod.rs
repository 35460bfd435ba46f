//! Scanner (spec §4.3): fans bucket-level probes out across a bounded
//! worker pool, runs the four analyzers over each bucket's catalog, and
//! returns a fresh, deduplicated sequence of findings. `scan()` holds no
//! state between calls — each invocation is a clean pass, per spec §9's
//! note against instance-mutable scanner accumulators.

pub mod analyzers;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;

use crate::adapter::{AdapterError, ExternalResourceAdapter};
use crate::config::{PricingConfig, ScannerThresholds};
use crate::models::Recommendation;

#[derive(Debug, Clone, Default)]
pub struct ScanFilters {
    /// `None` means "all buckets the adapter can list".
    pub include_buckets: Option<Vec<String>>,
    pub exclude_buckets: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub recommendations: Vec<Recommendation>,
    /// Non-fatal per-bucket failures, attached to the run (spec §4.3 failure semantics).
    pub errors: Vec<String>,
}

/// `scan(config) -> (run_id, recommendations[])` — the run-id half of
/// the contract is the caller's responsibility (the store mints it on
/// `create`); this function returns the findings and scan errors only.
pub async fn scan(
    adapter: Arc<dyn ExternalResourceAdapter>,
    thresholds: &ScannerThresholds,
    pricing: &PricingConfig,
    filters: &ScanFilters,
) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    let buckets = match adapter.list_buckets().await {
        Ok(buckets) => buckets,
        Err(err) => {
            outcome.errors.push(format!("list_buckets failed: {err}"));
            return outcome;
        }
    };

    let candidates: Vec<String> = buckets
        .into_iter()
        .map(|b| b.name)
        .filter(|name| {
            if let Some(include) = &filters.include_buckets {
                if !include.iter().any(|b| b == name) {
                    return false;
                }
            }
            if filters.exclude_buckets.iter().any(|b| b == name) {
                return false;
            }
            !thresholds.bucket_prefix_skip_list.iter().any(|prefix| name.starts_with(prefix.as_str()))
        })
        .collect();

    tracing::info!(bucket_count = candidates.len(), "scan starting");

    let mut pending = candidates.into_iter();
    let mut in_flight = JoinSet::new();
    let fan_out = thresholds.scan_fan_out.max(1);

    for bucket in pending.by_ref().take(fan_out) {
        spawn_bucket_scan(&mut in_flight, adapter.clone(), bucket, thresholds.clone(), pricing.clone());
    }

    let mut per_bucket_results: Vec<(Vec<Recommendation>, Vec<String>)> = Vec::new();
    while let Some(joined) = in_flight.join_next().await {
        match joined {
            Ok(result) => per_bucket_results.push(result),
            Err(join_err) => outcome.errors.push(format!("bucket scan task panicked: {join_err}")),
        }
        if let Some(next_bucket) = pending.next() {
            spawn_bucket_scan(&mut in_flight, adapter.clone(), next_bucket, thresholds.clone(), pricing.clone());
        }
    }

    let mut ordered_per_object = Vec::new();
    let mut ordered_bucket_level = Vec::new();
    let mut ordered_prefix_aggregate = Vec::new();

    for (recs, errors) in per_bucket_results {
        outcome.errors.extend(errors);
        for rec in recs {
            match &rec.details {
                crate::models::RecommendationDetails::DeleteStaleObject { prefix_aggregate: true } => {
                    ordered_prefix_aggregate.push(rec)
                }
                crate::models::RecommendationDetails::AddLifecyclePolicy
                | crate::models::RecommendationDetails::DeleteIncompleteUpload { .. } => ordered_bucket_level.push(rec),
                _ => ordered_per_object.push(rec),
            }
        }
    }

    let mut seen = HashSet::new();
    let mut deduped = Vec::new();
    for rec in ordered_per_object.into_iter().chain(ordered_bucket_level).chain(ordered_prefix_aggregate) {
        if seen.insert(rec.dedup_key()) {
            deduped.push(rec);
        }
    }

    tracing::info!(finding_count = deduped.len(), error_count = outcome.errors.len(), "scan complete");

    outcome.recommendations = deduped;
    outcome
}

fn spawn_bucket_scan(
    set: &mut JoinSet<(Vec<Recommendation>, Vec<String>)>,
    adapter: Arc<dyn ExternalResourceAdapter>,
    bucket: String,
    thresholds: ScannerThresholds,
    pricing: PricingConfig,
) {
    set.spawn(async move { scan_bucket(adapter.as_ref(), &bucket, &thresholds, &pricing).await });
}

async fn scan_bucket(
    adapter: &dyn ExternalResourceAdapter,
    bucket: &str,
    thresholds: &ScannerThresholds,
    pricing: &PricingConfig,
) -> (Vec<Recommendation>, Vec<String>) {
    let now = Utc::now();
    let mut errors = Vec::new();

    let lifecycle_rules = match adapter.get_lifecycle(bucket).await {
        Ok(rules) => rules,
        Err(AdapterError::AccessDenied(_)) => None,
        Err(AdapterError::NotFound(_)) => None,
        Err(err) => match retry_once(|| adapter.get_lifecycle(bucket)).await {
            Ok(rules) => rules,
            Err(retry_err) => {
                errors.push(format!("{bucket}: get_lifecycle failed after retry: {retry_err} (first: {err})"));
                None
            }
        },
    };

    let max_objects = thresholds.max_objects_per_bucket.unwrap_or(usize::MAX);
    let objects = match adapter.list_objects(bucket, max_objects).await {
        Ok(objects) => objects,
        Err(AdapterError::NotFound(_)) => {
            errors.push(format!("{bucket}: bucket no longer exists, skipping"));
            return (vec![], errors);
        }
        Err(err) => match retry_once(|| adapter.list_objects(bucket, max_objects)).await {
            Ok(objects) => objects,
            Err(retry_err) => {
                errors.push(format!("{bucket}: list_objects failed after retry: {retry_err} (first: {err})"));
                return (vec![], errors);
            }
        },
    };

    let uploads = match adapter.list_multipart_uploads(bucket, None).await {
        Ok(uploads) => uploads,
        Err(AdapterError::AccessDenied(_)) => vec![],
        Err(err) => match retry_once(|| adapter.list_multipart_uploads(bucket, None)).await {
            Ok(uploads) => uploads,
            Err(retry_err) => {
                errors.push(format!("{bucket}: list_multipart_uploads failed after retry: {retry_err} (first: {err})"));
                vec![]
            }
        },
    };

    let mut recs = Vec::new();

    for object in &objects {
        let days = object.last_modified.map(|ts| (now - ts).num_days());
        recs.extend(analyzers::storage_class(bucket, object, days, thresholds, pricing));
        recs.extend(analyzers::access_pattern_per_object(bucket, object, days, thresholds, pricing));
    }

    recs.extend(analyzers::lifecycle(
        bucket,
        objects.iter().map(|o| o.size_bytes).sum(),
        lifecycle_rules.as_deref(),
        thresholds,
        pricing,
    ));

    recs.extend(analyzers::multipart(bucket, &uploads, now, thresholds, pricing));

    recs.extend(analyzers::access_pattern_prefix_aggregate(
        bucket,
        &objects,
        |last_modified| last_modified.map(|ts| (now - ts).num_days()),
        thresholds,
    ));

    (recs, errors)
}

async fn retry_once<F, Fut, T>(mut call: F) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AdapterError>>,
{
    match call().await {
        Ok(value) => Ok(value),
        Err(first_err) => {
            tracing::warn!(error = %first_err, "transient adapter error, retrying once");
            call().await
        }
    }
}
