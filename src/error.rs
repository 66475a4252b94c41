//! Error codes and the JSON error body shared by every route.
//!
//! DESIGN
//! ======
//! Each service owns a `thiserror` enum and implements [`ErrorCode`] so the
//! route layer can render a uniform body without inspecting variants:
//! a grepable `code`, the display `message`, a `retryable` flag, and the
//! user-facing `title`/`suggestion` bundle from the error guide.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::services::error_guide;

/// Grepable error code + retry hint for service errors.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// JSON body returned for every failed API request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
    pub title: &'static str,
    pub suggestion: &'static str,
}

impl ErrorBody {
    pub fn from_error(err: &(impl ErrorCode + ?Sized)) -> Self {
        let message = err.to_string();
        let guide = error_guide::categorize(&message);
        Self {
            code: err.error_code(),
            message,
            retryable: err.retryable(),
            title: guide.title,
            suggestion: guide.suggestion,
        }
    }
}

/// A status code paired with an error body. Handlers return this as their
/// `Err` type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, err: &(impl ErrorCode + ?Sized)) -> Self {
        Self { status, body: ErrorBody::from_error(err) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
