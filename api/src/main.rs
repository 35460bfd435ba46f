//! Binary entrypoint: load configuration, stand up the database pool and
//! the external-resource adapter, build application state, and serve the
//! HTTP surface (spec.md §6). Mirrors the teacher api's `main.rs` boot
//! sequence — dotenv, observability, pool, migrate, router, serve.

mod error;
mod handlers;
mod metrics;
mod observability;
mod rate_limit;
mod routes;
mod s3_adapter;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use optimizer_core::adapter::ExternalResourceAdapter;
use optimizer_core::config::{ExecutorPolicy, PricingConfig, ScannerThresholds};
use optimizer_core::store::RunStore;
use sqlx::postgres::PgPoolOptions;

use crate::observability::Observability;
use crate::s3_adapter::S3Adapter;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let observability = Observability::init().context("failed to initialize observability stack")?;

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(env_u32("DATABASE_MAX_CONNECTIONS", 10))
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    sqlx::migrate!("../core/migrations").run(&pool).await.context("failed to run migrations")?;

    let executor_policy = ExecutorPolicy::from_env().context("invalid executor policy configuration")?;
    let pricing = PricingConfig::default();
    let scanner_thresholds = ScannerThresholds::default();

    let adapter: Arc<dyn ExternalResourceAdapter> = Arc::new(S3Adapter::from_env().await);
    let store = RunStore::new(pool);

    let state = AppState::new(store, adapter, pricing, scanner_thresholds, executor_policy, observability.registry.clone());

    let app = routes::build_router(state);

    let addr: SocketAddr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()).parse()?;
    tracing::info!(%addr, "storage cost optimizer api listening");

    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind listener")?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;

    Observability::shutdown();
    Ok(())
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
