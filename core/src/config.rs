//! Pricing & configuration (spec §4.1).
//!
//! Loaded once at process start into immutable values and threaded by
//! dependency injection into the scorer and executor — no hidden globals,
//! grounded on the teacher indexer's `ServiceConfig::from_env()` pattern
//! (`indexer/src/config.rs`): a typed `ConfigError`, `env::var` with
//! explicit defaults, range validation, and a single `info!` on success.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Per-GB-month storage pricing, transition request cost, and minimum
/// storage duration, keyed by storage class name.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub storage_pricing: HashMap<String, f64>,
    pub transition_cost_per_1000: HashMap<String, f64>,
    pub min_storage_duration_days: HashMap<String, i64>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let storage_pricing = [
            ("STANDARD", 0.023),
            ("INTELLIGENT_TIERING", 0.023),
            ("STANDARD_IA", 0.0125),
            ("ONEZONE_IA", 0.01),
            ("GLACIER_IR", 0.004),
            ("GLACIER", 0.0036),
            ("DEEP_ARCHIVE", 0.00099),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let transition_cost_per_1000 = [
            ("STANDARD_IA", 0.01),
            ("ONEZONE_IA", 0.01),
            ("INTELLIGENT_TIERING", 0.0025),
            ("GLACIER_IR", 0.02),
            ("GLACIER", 0.03),
            ("DEEP_ARCHIVE", 0.05),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let min_storage_duration_days = [
            ("STANDARD_IA", 30),
            ("ONEZONE_IA", 30),
            ("GLACIER_IR", 90),
            ("GLACIER", 90),
            ("DEEP_ARCHIVE", 180),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            storage_pricing,
            transition_cost_per_1000,
            min_storage_duration_days,
        }
    }
}

impl PricingConfig {
    pub fn rate(&self, storage_class: &str) -> f64 {
        self.storage_pricing.get(storage_class).copied().unwrap_or(0.023)
    }

    pub fn transition_cost(&self, target_class: &str) -> f64 {
        self.transition_cost_per_1000.get(target_class).copied().unwrap_or(0.02)
    }

    pub fn min_duration_days(&self, target_class: &str) -> Option<i64> {
        self.min_storage_duration_days.get(target_class).copied()
    }

    /// `(rate(from) - rate(to)) * size_bytes / GiB`, rounded to 4 decimals.
    pub fn monthly_savings(&self, size_bytes: u64, from_class: &str, to_class: &str) -> f64 {
        let size_gb = size_bytes as f64 / GIB;
        let savings = (self.rate(from_class) - self.rate(to_class)) * size_gb;
        round4(savings)
    }
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Scanner thresholds (spec §4.1, §4.2).
#[derive(Debug, Clone)]
pub struct ScannerThresholds {
    pub stale_days: i64,
    pub very_stale_days: i64,
    pub prefix_aggregation_stale_days: i64,
    pub prefix_aggregation_min_count: usize,
    pub multipart_age_days: i64,
    pub min_object_bytes: u64,
    pub large_object_bytes: u64,
    pub approval_required_bytes: u64,
    pub max_objects_per_bucket: Option<usize>,
    pub bucket_prefix_skip_list: Vec<String>,
    pub scan_fan_out: usize,
}

impl Default for ScannerThresholds {
    fn default() -> Self {
        Self {
            stale_days: 90,
            very_stale_days: 365,
            prefix_aggregation_stale_days: 180,
            prefix_aggregation_min_count: 10,
            multipart_age_days: 7,
            min_object_bytes: 1024 * 1024,
            large_object_bytes: 128 * 1024,
            approval_required_bytes: 10 * 1024 * 1024 * 1024,
            max_objects_per_bucket: Some(1000),
            bucket_prefix_skip_list: vec!["aws-".to_string(), "elasticbeanstalk-".to_string()],
            scan_fan_out: 8,
        }
    }
}

/// Executor policy (spec §4.1, §4.6).
#[derive(Debug, Clone)]
pub struct ExecutorPolicy {
    pub granted_permissions: Vec<String>,
    pub allow_destructive: bool,
    pub max_failures: usize,
    pub max_actions: usize,
    pub delay_between_actions_ms: u64,
    pub delay_after_failure_ms: u64,
}

impl Default for ExecutorPolicy {
    fn default() -> Self {
        Self {
            granted_permissions: vec![
                "s3:GetObject".to_string(),
                "s3:PutObject".to_string(),
                "s3:GetLifecycleConfiguration".to_string(),
                "s3:PutLifecycleConfiguration".to_string(),
                "s3:ListBucketMultipartUploads".to_string(),
                "s3:AbortMultipartUpload".to_string(),
                "s3:DeleteObject".to_string(),
            ],
            allow_destructive: false,
            max_failures: 5,
            max_actions: 100,
            delay_between_actions_ms: 0,
            delay_after_failure_ms: 0,
        }
    }
}

impl ExecutorPolicy {
    /// `granted_permissions` from `EXECUTOR_GRANTED_PERMISSIONS`
    /// (comma-separated, whitespace-trimmed, empty items dropped) and
    /// `allow_destructive` from `ALLOW_DESTRUCTIVE_EXECUTION` — enabled
    /// iff the value lower-cased equals the literal `"true"`; any other
    /// truthy-looking string ("1", "yes", "True") is rejected, per
    /// spec.md §8's boundary test.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut policy = Self::default();

        if let Ok(raw) = env::var("EXECUTOR_GRANTED_PERMISSIONS") {
            let parsed: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                policy.granted_permissions = parsed;
            }
        }

        if let Ok(raw) = env::var("ALLOW_DESTRUCTIVE_EXECUTION") {
            policy.allow_destructive = raw.to_lowercase() == "true";
        }

        if let Ok(raw) = env::var("MAX_ACTIONS") {
            policy.max_actions = raw
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("MAX_ACTIONS: invalid integer '{raw}'")))?;
        }

        if let Ok(raw) = env::var("MAX_FAILURES") {
            policy.max_failures = raw
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("MAX_FAILURES: invalid integer '{raw}'")))?;
        }

        tracing::info!(
            granted_permissions = policy.granted_permissions.len(),
            allow_destructive = policy.allow_destructive,
            max_actions = policy.max_actions,
            max_failures = policy.max_failures,
            "executor policy loaded"
        );

        Ok(policy)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.granted_permissions.iter().any(|p| p == permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_has_minimum_required_keys() {
        let pricing = PricingConfig::default();
        for class in [
            "STANDARD",
            "INTELLIGENT_TIERING",
            "STANDARD_IA",
            "ONEZONE_IA",
            "GLACIER_IR",
            "GLACIER",
            "DEEP_ARCHIVE",
        ] {
            assert!(pricing.storage_pricing.contains_key(class), "missing {class}");
        }
    }

    #[test]
    fn monthly_savings_rounds_to_four_decimals() {
        let pricing = PricingConfig::default();
        let savings = pricing.monthly_savings(1_073_741_824, "STANDARD", "GLACIER_IR");
        assert_eq!(savings, 0.0190);
    }

    #[test]
    fn allow_destructive_requires_exact_lowercase_true() {
        env::set_var("ALLOW_DESTRUCTIVE_EXECUTION", "True");
        assert!(ExecutorPolicy::from_env().unwrap().allow_destructive);

        env::set_var("ALLOW_DESTRUCTIVE_EXECUTION", "1");
        assert!(!ExecutorPolicy::from_env().unwrap().allow_destructive);

        env::remove_var("ALLOW_DESTRUCTIVE_EXECUTION");
    }

    #[test]
    fn granted_permissions_parsing_trims_and_drops_empty() {
        env::set_var("EXECUTOR_GRANTED_PERMISSIONS", " s3:GetObject ,, s3:PutObject,");
        let policy = ExecutorPolicy::from_env().unwrap();
        assert_eq!(policy.granted_permissions, vec!["s3:GetObject", "s3:PutObject"]);
        env::remove_var("EXECUTOR_GRANTED_PERMISSIONS");
    }
}
