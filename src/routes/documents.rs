//! Source document upload and removal.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::api_error;
use crate::routes::courses::{course_error, course_error_to_status};
use crate::routes::extract::ApiPath;
use crate::services::course::{self, Course};
use crate::services::upload::{self, IncomingFile, UploadError, UploadOutcome};
use crate::state::AppState;

pub(crate) fn upload_error_to_status(err: &UploadError) -> StatusCode {
    match err {
        UploadError::Multipart(_) | UploadError::MissingFile => StatusCode::BAD_REQUEST,
        UploadError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        UploadError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        UploadError::Course(e) => course_error_to_status(e),
        UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn upload_error(err: UploadError) -> ApiError {
    api_error(upload_error_to_status(&err), &err)
}

fn multipart_error(err: &MultipartError) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge(err.body_text())
    } else {
        UploadError::Multipart(err.body_text())
    }
}

/// Read the `file` part (and optional `text` part) of a multipart body.
async fn read_incoming(mut multipart: Multipart) -> Result<IncomingFile, UploadError> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut extracted_text = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or("document").to_string();
                let mime = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(&e))?;
                file = Some((name, mime, bytes.to_vec()));
            }
            Some("text") => {
                let text = field.text().await.map_err(|e| multipart_error(&e))?;
                extracted_text = Some(text);
            }
            _ => {}
        }
    }

    let (name, mime_type, bytes) = file.ok_or(UploadError::MissingFile)?;
    Ok(IncomingFile { name, mime_type, bytes, extracted_text })
}

/// `POST /api/courses/{id}/document` — upload a new source document version.
pub async fn upload_document(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadOutcome>), ApiError> {
    let multipart = multipart.map_err(|e| upload_error(UploadError::Multipart(e.body_text())))?;
    let incoming = read_incoming(multipart).await.map_err(upload_error)?;
    let outcome = upload::upload_document(&state.pool, state.storage.as_ref(), id, &incoming)
        .await
        .map_err(upload_error)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// `DELETE /api/courses/{id}/document` — remove the stored source file.
pub async fn remove_document(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Course>, ApiError> {
    let updated = course::remove_document(&state.pool, state.storage.as_ref(), id)
        .await
        .map_err(course_error)?;
    Ok(Json(updated))
}
