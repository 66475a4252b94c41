//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the JSON API under `/api` plus a `/healthz` liveness check.
//! Handlers translate HTTP into service calls and map service errors onto
//! status codes; every error response carries the shared `ErrorBody`.

pub mod ai;
pub mod courses;
pub mod documents;
pub mod entitlements;
pub mod extract;
pub mod tools;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::{ApiError, ErrorCode};
use crate::state::AppState;

/// Build the full router. `max_upload_bytes` caps every request body.
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/ai", post(ai::handle_ai))
        .route("/api/courses", get(courses::list_courses).post(courses::create_course))
        .route(
            "/api/courses/{id}",
            get(courses::get_course)
                .patch(courses::update_course)
                .delete(courses::delete_course),
        )
        .route("/api/courses/{id}/status", put(courses::set_status))
        .route("/api/courses/{id}/generate", post(courses::generate_course))
        .route("/api/courses/{id}/verify", post(courses::verify_course))
        .route("/api/courses/{id}/cleanup", post(courses::cleanup_course))
        .route(
            "/api/courses/{id}/document",
            post(documents::upload_document).delete(documents::remove_document),
        )
        .route("/api/verify", post(tools::verify))
        .route("/api/compare", post(tools::compare))
        .route("/api/organizations/{id}/entitlements", get(entitlements::list_entitlements))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Build an [`ApiError`], logging server-side failures.
pub(crate) fn api_error(status: StatusCode, err: &(impl ErrorCode + ?Sized)) -> ApiError {
    if status.is_server_error() {
        error!(code = err.error_code(), error = %err, %status, "request failed");
    }
    ApiError::new(status, err)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
