use std::sync::Arc;
use std::time::Instant;

use optimizer_core::adapter::ExternalResourceAdapter;
use optimizer_core::config::{ExecutorPolicy, PricingConfig, ScannerThresholds};
use optimizer_core::store::RunStore;
use prometheus::Registry;

/// Application state shared across handlers: the durable run store, the
/// immutable pricing/threshold/policy configuration loaded once at
/// startup (spec.md §4.1), and the external-resource adapter the
/// scanner/executor/rollback manager drive.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RunStore>,
    pub adapter: Arc<dyn ExternalResourceAdapter>,
    pub pricing: Arc<PricingConfig>,
    pub scanner_thresholds: Arc<ScannerThresholds>,
    pub executor_policy: Arc<ExecutorPolicy>,
    pub started_at: Instant,
    pub registry: Registry,
}

impl AppState {
    pub fn new(
        store: RunStore,
        adapter: Arc<dyn ExternalResourceAdapter>,
        pricing: PricingConfig,
        scanner_thresholds: ScannerThresholds,
        executor_policy: ExecutorPolicy,
        registry: Registry,
    ) -> Self {
        Self {
            store: Arc::new(store),
            adapter,
            pricing: Arc::new(pricing),
            scanner_thresholds: Arc::new(scanner_thresholds),
            executor_policy: Arc::new(executor_policy),
            started_at: Instant::now(),
            registry,
        }
    }
}
