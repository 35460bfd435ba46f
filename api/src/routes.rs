//! Route table (spec.md §6). One `Router` wiring every handler to its
//! path/method, with tracing, CORS, and the IP rate limiter layered on
//! top — mirrors the teacher's `routes.rs` composition order: business
//! routes first, then ambient middleware applied outside-in.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::rate_limit::{rate_limit_middleware, RateLimitState};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let rate_limiter = RateLimitState::from_env();

    Router::new()
        .route("/runs/scan", post(handlers::scan_handler))
        .route("/runs/:run_id/score", post(handlers::score_handler))
        .route("/runs/:run_id/execute", post(handlers::execute_handler))
        .route("/runs/:run_id/rollback", post(handlers::rollback_handler))
        .route("/runs/:run_id", get(handlers::get_run_handler))
        .route("/runs/:run_id/audit", get(handlers::get_audit_handler))
        .route("/runs", get(handlers::list_runs_handler))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(axum::middleware::from_fn_with_state(rate_limiter, rate_limit_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
