use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{
        jobs::{create_job_handler, get_job_handler, list_jobs_handler},
        logs::{query_logs_handler, stream_logs_handler},
        tribunals::list_tribunals_handler,
    },
    state::AppState,
};

/// All v1 API routes plus the health probe.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/jobs",
            post(create_job_handler).get(list_jobs_handler),
        )
        .route("/api/v1/jobs/{id}", get(get_job_handler))
        .route("/api/v1/jobs/{id}/logs", get(query_logs_handler))
        .route("/api/v1/jobs/{id}/logs/stream", get(stream_logs_handler))
        .route("/api/v1/tribunals", get(list_tribunals_handler))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
