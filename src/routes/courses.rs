//! Course routes — CRUD, generation, verification and secure cleanup.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::ai::ai_error_to_status;
use crate::routes::api_error;
use crate::routes::extract::{ApiJson, ApiPath};
use crate::services::ai::{self, GenerateError};
use crate::services::course::{self, Course, CourseError, CourseFilter, CoursePatch, CourseStatus, NewCourse};
use crate::state::AppState;

pub(crate) fn course_error_to_status(err: &CourseError) -> StatusCode {
    match err {
        CourseError::NotFound(_) => StatusCode::NOT_FOUND,
        CourseError::Invalid(_) => StatusCode::BAD_REQUEST,
        CourseError::ContentCleared(_) | CourseError::Superseded(_) => StatusCode::CONFLICT,
        CourseError::MissingSource(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CourseError::Encode(_) | CourseError::Storage(_) | CourseError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn course_error(err: CourseError) -> ApiError {
    api_error(course_error_to_status(&err), &err)
}

#[derive(Debug, Deserialize)]
pub struct ListCoursesQuery {
    pub client_name: Option<String>,
    pub status: Option<String>,
}

pub(crate) fn parse_filter(query: ListCoursesQuery) -> Result<CourseFilter, CourseError> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            CourseStatus::parse(raw).ok_or_else(|| CourseError::Invalid(format!("unknown course status '{raw}'")))?,
        ),
        None => None,
    };
    let client_name = query.client_name.filter(|c| !c.trim().is_empty());
    Ok(CourseFilter { client_name, status })
}

/// `GET /api/courses` — list courses, newest first.
pub async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<ListCoursesQuery>,
) -> Result<Json<Vec<Course>>, ApiError> {
    let filter = parse_filter(query).map_err(course_error)?;
    let courses = course::list_courses(&state.pool, &filter).await.map_err(course_error)?;
    Ok(Json(courses))
}

/// `POST /api/courses` — create a draft course.
pub async fn create_course(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewCourse>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    let created = course::create_course(&state.pool, &body).await.map_err(course_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/courses/{id}`
pub async fn get_course(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Course>, ApiError> {
    let found = course::get_course(&state.pool, id).await.map_err(course_error)?;
    Ok(Json(found))
}

/// `PATCH /api/courses/{id}` — partial update.
pub async fn update_course(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<CoursePatch>,
) -> Result<Json<Course>, ApiError> {
    let updated = course::update_course(&state.pool, id, &patch).await.map_err(course_error)?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusBody {
    pub status: CourseStatus,
}

/// `PUT /api/courses/{id}/status` — move the course through its lifecycle.
pub async fn set_status(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<SetStatusBody>,
) -> Result<Json<Course>, ApiError> {
    let updated = course::set_status(&state.pool, id, body.status).await.map_err(course_error)?;
    Ok(Json(updated))
}

/// `DELETE /api/courses/{id}` — delete the course and its stored file.
pub async fn delete_course(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<StatusCode, ApiError> {
    course::delete_course(&state.pool, state.storage.as_ref(), id)
        .await
        .map_err(course_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/courses/{id}/generate` — generate modules from the stored
/// source text, verify them and store both.
pub async fn generate_course(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Course>, ApiError> {
    let generated = ai::generate_course(&state.pool, state.llm.as_ref(), state.ai_max_tokens, id)
        .await
        .map_err(|e| match e {
            GenerateError::Course(e) => course_error(e),
            GenerateError::Ai(e) => api_error(ai_error_to_status(&e), &e),
        })?;
    Ok(Json(generated))
}

/// `POST /api/courses/{id}/verify` — re-run verification over stored content.
pub async fn verify_course(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Course>, ApiError> {
    let verified = course::verify_course(&state.pool, id).await.map_err(course_error)?;
    Ok(Json(verified))
}

/// `POST /api/courses/{id}/cleanup` — wipe sensitive content, keep the shell.
pub async fn cleanup_course(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Course>, ApiError> {
    let cleaned = course::secure_cleanup(&state.pool, state.storage.as_ref(), id)
        .await
        .map_err(course_error)?;
    Ok(Json(cleaned))
}

#[cfg(test)]
#[path = "courses_test.rs"]
mod tests;
