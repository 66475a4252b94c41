//! JSON and path extractors whose rejections render as [`ApiError`].
//!
//! Axum's own `Json`/`Path` rejections answer with plain text. These
//! wrappers keep the rejection's status code and swap the body for the
//! shared `ErrorBody`.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ErrorCode};

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("invalid request body: {0}")]
    Body(String),
    #[error("request body too large: {0}")]
    TooLarge(String),
    #[error("invalid path parameter: {0}")]
    Path(String),
}

impl ErrorCode for RequestError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Body(_) => "E_INVALID_BODY",
            Self::TooLarge(_) => "E_BODY_TOO_LARGE",
            Self::Path(_) => "E_INVALID_PATH",
        }
    }
}

pub(crate) fn json_rejection(rejection: &JsonRejection) -> ApiError {
    let status = rejection.status();
    let err = if status == StatusCode::PAYLOAD_TOO_LARGE {
        RequestError::TooLarge(rejection.body_text())
    } else {
        RequestError::Body(rejection.body_text())
    };
    ApiError::new(status, &err)
}

pub(crate) fn path_rejection(rejection: &PathRejection) -> ApiError {
    ApiError::new(rejection.status(), &RequestError::Path(rejection.body_text()))
}

/// `Json<T>` with an [`ApiError`] rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(&rejection)),
        }
    }
}

/// `Path<T>` with an [`ApiError`] rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(path_rejection(&rejection)),
        }
    }
}
