//! Course service — CRUD, generation results, secure cleanup.
//!
//! DESIGN
//! ======
//! One row per course in `courses`. Routes call these functions with the
//! shared pool; nothing is cached in memory. Timestamps are rendered by
//! Postgres as RFC 3339 UTC strings so no time crate is needed.
//!
//! ERROR HANDLING
//! ==============
//! Secure cleanup and delete remove the stored file before touching the row.
//! If the file cannot be removed the row is left intact, so a retry still
//! knows which object to remove.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use tracing::info;
use uuid::Uuid;

use super::storage::{ObjectStore, StorageError};
use super::verification::VerificationReport;

const COURSE_COLUMNS: &str = r#"id, client_name, title, source_text, course_data, config,
       compliance_standard, compliance_notes, verification_report, status,
       content_cleared, file_path, document_version,
       to_char(created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
       to_char(updated_at AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at"#;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CourseError {
    #[error("course not found: {0}")]
    NotFound(Uuid),
    #[error("invalid course: {0}")]
    Invalid(String),
    #[error("course {0} content has been cleared; upload a new source document first")]
    ContentCleared(Uuid),
    #[error("course {0} has no source text; the source document is empty")]
    MissingSource(Uuid),
    #[error("course {0} document was replaced by a newer upload")]
    Superseded(Uuid),
    #[error("could not encode course json: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::error::ErrorCode for CourseError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_COURSE_NOT_FOUND",
            Self::Invalid(_) => "E_COURSE_INVALID",
            Self::ContentCleared(_) => "E_CONTENT_CLEARED",
            Self::MissingSource(_) => "E_MISSING_SOURCE",
            Self::Superseded(_) => "E_DOCUMENT_SUPERSEDED",
            Self::Encode(_) => "E_ENCODE",
            Self::Storage(_) => "E_STORAGE",
            Self::Database(_) => "E_DATABASE",
        }
    }
}

/// Course lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Draft,
    Generated,
    Exported,
    Completed,
}

impl CourseStatus {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(Self::Draft),
            "generated" => Some(Self::Generated),
            "exported" => Some(Self::Exported),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Generated => "generated",
            Self::Exported => "exported",
            Self::Completed => "completed",
        }
    }
}

/// A course record. Mirrors the `courses` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Course {
    pub id: Uuid,
    pub client_name: String,
    pub title: String,
    pub source_text: Option<String>,
    pub course_data: Option<Value>,
    pub config: Value,
    pub compliance_standard: Option<String>,
    pub compliance_notes: Option<String>,
    pub verification_report: Option<Value>,
    pub status: CourseStatus,
    pub content_cleared: bool,
    pub file_path: Option<String>,
    pub document_version: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl Course {
    /// Source text ready for generation or verification.
    ///
    /// # Errors
    ///
    /// Fails when the content was cleared or no usable source text exists.
    pub fn usable_source(&self) -> Result<&str, CourseError> {
        if self.content_cleared {
            return Err(CourseError::ContentCleared(self.id));
        }
        match self.source_text.as_deref() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(CourseError::MissingSource(self.id)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCourse {
    pub client_name: String,
    pub title: String,
    pub source_text: Option<String>,
    pub config: Option<Value>,
    pub compliance_standard: Option<String>,
    pub compliance_notes: Option<String>,
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoursePatch {
    pub client_name: Option<String>,
    pub title: Option<String>,
    pub source_text: Option<String>,
    pub course_data: Option<Value>,
    pub config: Option<Value>,
    pub compliance_standard: Option<String>,
    pub compliance_notes: Option<String>,
    pub status: Option<CourseStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseFilter {
    pub client_name: Option<String>,
    pub status: Option<CourseStatus>,
}

// =============================================================================
// VALIDATION
// =============================================================================

fn required(field: &str, value: &str) -> Result<String, CourseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CourseError::Invalid(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Trim and check a new course. Returns the cleaned copy.
///
/// # Errors
///
/// Fails if `client_name` or `title` is blank or `config` is not an object.
pub fn validate_new(new: &NewCourse) -> Result<NewCourse, CourseError> {
    let config = new.config.clone().unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    if !config.is_object() {
        return Err(CourseError::Invalid("config must be a JSON object".into()));
    }
    Ok(NewCourse {
        client_name: required("client_name", &new.client_name)?,
        title: required("title", &new.title)?,
        source_text: new.source_text.clone(),
        config: Some(config),
        compliance_standard: new.compliance_standard.clone(),
        compliance_notes: new.compliance_notes.clone(),
    })
}

/// Trim and check a patch. Returns the cleaned copy.
///
/// # Errors
///
/// Fails if a present `client_name`/`title` is blank or `config` is not an object.
pub fn validate_patch(patch: &CoursePatch) -> Result<CoursePatch, CourseError> {
    if patch.config.as_ref().is_some_and(|c| !c.is_object()) {
        return Err(CourseError::Invalid("config must be a JSON object".into()));
    }
    Ok(CoursePatch {
        client_name: patch.client_name.as_deref().map(|v| required("client_name", v)).transpose()?,
        title: patch.title.as_deref().map(|v| required("title", v)).transpose()?,
        ..patch.clone()
    })
}

/// Decode a stored status. Anything outside the lifecycle is a decode
/// error, never a silent fallback.
pub(crate) fn decode_status(raw: &str) -> Result<CourseStatus, sqlx::Error> {
    CourseStatus::parse(raw).ok_or_else(|| sqlx::Error::Decode(format!("unknown course status '{raw}'").into()))
}

fn row_to_course(row: &PgRow) -> Result<Course, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Course {
        id: row.try_get("id")?,
        client_name: row.try_get("client_name")?,
        title: row.try_get("title")?,
        source_text: row.try_get("source_text")?,
        course_data: row.try_get("course_data")?,
        config: row.try_get("config")?,
        compliance_standard: row.try_get("compliance_standard")?,
        compliance_notes: row.try_get("compliance_notes")?,
        verification_report: row.try_get("verification_report")?,
        status: decode_status(&status)?,
        content_cleared: row.try_get("content_cleared")?,
        file_path: row.try_get("file_path")?,
        document_version: row.try_get("document_version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn one(id: Uuid, row: Option<PgRow>) -> Result<Course, CourseError> {
    let row = row.ok_or(CourseError::NotFound(id))?;
    Ok(row_to_course(&row)?)
}

/// Explain a guarded UPDATE that matched no row: the course is gone, or it
/// exists and the guard (`when_present`) rejected it.
async fn guarded_miss(pool: &PgPool, id: Uuid, when_present: CourseError) -> CourseError {
    match sqlx::query("SELECT 1 FROM courses WHERE id = $1").bind(id).fetch_optional(pool).await {
        Ok(Some(_)) => when_present,
        Ok(None) => CourseError::NotFound(id),
        Err(e) => e.into(),
    }
}

async fn guarded_one(
    pool: &PgPool,
    id: Uuid,
    row: Option<PgRow>,
    when_present: CourseError,
) -> Result<Course, CourseError> {
    match row {
        Some(row) => Ok(row_to_course(&row)?),
        None => Err(guarded_miss(pool, id, when_present).await),
    }
}

// =============================================================================
// CRUD
// =============================================================================

/// Create a new draft course.
///
/// # Errors
///
/// Returns a validation or database error.
pub async fn create_course(pool: &PgPool, new: &NewCourse) -> Result<Course, CourseError> {
    let new = validate_new(new)?;
    let id = Uuid::new_v4();
    let row = sqlx::query(&format!(
        "INSERT INTO courses (id, client_name, title, source_text, config, compliance_standard, compliance_notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {COURSE_COLUMNS}"
    ))
    .bind(id)
    .bind(&new.client_name)
    .bind(&new.title)
    .bind(&new.source_text)
    .bind(&new.config)
    .bind(&new.compliance_standard)
    .bind(&new.compliance_notes)
    .fetch_one(pool)
    .await?;

    info!(course_id = %id, client_name = %new.client_name, "course created");
    Ok(row_to_course(&row)?)
}

/// Fetch one course.
///
/// # Errors
///
/// Returns `NotFound` or a database error.
pub async fn get_course(pool: &PgPool, id: Uuid) -> Result<Course, CourseError> {
    let row = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    one(id, row)
}

/// List courses, newest first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_courses(pool: &PgPool, filter: &CourseFilter) -> Result<Vec<Course>, CourseError> {
    let mut builder = QueryBuilder::new(format!("SELECT {COURSE_COLUMNS} FROM courses WHERE TRUE"));
    if let Some(client_name) = filter.client_name.as_deref() {
        builder.push(" AND client_name = ");
        builder.push_bind(client_name.trim().to_string());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
    builder.push(" ORDER BY created_at DESC, id ASC");

    let rows = builder.build().fetch_all(pool).await?;
    rows.iter()
        .map(|row| row_to_course(row).map_err(CourseError::from))
        .collect()
}

/// Apply a partial update. Supplying `source_text` clears the
/// `content_cleared` flag.
///
/// # Errors
///
/// Returns a validation error, `NotFound`, or a database error.
pub async fn update_course(pool: &PgPool, id: Uuid, patch: &CoursePatch) -> Result<Course, CourseError> {
    let patch = validate_patch(patch)?;
    let row = sqlx::query(&format!(
        "UPDATE courses SET
             client_name = COALESCE($2, client_name),
             title = COALESCE($3, title),
             source_text = COALESCE($4, source_text),
             content_cleared = CASE WHEN $4::text IS NOT NULL THEN FALSE ELSE content_cleared END,
             course_data = COALESCE($5, course_data),
             config = COALESCE($6, config),
             compliance_standard = COALESCE($7, compliance_standard),
             compliance_notes = COALESCE($8, compliance_notes),
             status = COALESCE($9, status),
             updated_at = now()
         WHERE id = $1
         RETURNING {COURSE_COLUMNS}"
    ))
    .bind(id)
    .bind(&patch.client_name)
    .bind(&patch.title)
    .bind(&patch.source_text)
    .bind(&patch.course_data)
    .bind(&patch.config)
    .bind(&patch.compliance_standard)
    .bind(&patch.compliance_notes)
    .bind(patch.status.map(CourseStatus::as_str))
    .fetch_optional(pool)
    .await?;

    info!(course_id = %id, "course updated");
    one(id, row)
}

/// Set the lifecycle status.
///
/// # Errors
///
/// Returns `NotFound` or a database error.
pub async fn set_status(pool: &PgPool, id: Uuid, status: CourseStatus) -> Result<Course, CourseError> {
    let row = sqlx::query(&format!(
        "UPDATE courses SET status = $2, updated_at = now() WHERE id = $1 RETURNING {COURSE_COLUMNS}"
    ))
    .bind(id)
    .bind(status.as_str())
    .fetch_optional(pool)
    .await?;
    info!(course_id = %id, status = status.as_str(), "course status set");
    one(id, row)
}

/// Store generated course data with its verification report and mark the
/// course `generated`. A course cleared since generation started is left
/// untouched.
///
/// # Errors
///
/// Returns `NotFound`, `ContentCleared`, an encoding error, or a database
/// error.
pub async fn store_generation(
    pool: &PgPool,
    id: Uuid,
    course_data: &Value,
    report: &VerificationReport,
) -> Result<Course, CourseError> {
    let report = serde_json::to_value(report)?;
    let row = sqlx::query(&format!(
        "UPDATE courses SET course_data = $2, verification_report = $3, status = 'generated', updated_at = now()
         WHERE id = $1 AND NOT content_cleared
         RETURNING {COURSE_COLUMNS}"
    ))
    .bind(id)
    .bind(course_data)
    .bind(&report)
    .fetch_optional(pool)
    .await?;
    guarded_one(pool, id, row, CourseError::ContentCleared(id)).await
}

/// Replace the stored verification report of a course that still has its
/// content.
///
/// # Errors
///
/// Returns `NotFound`, `ContentCleared`, an encoding error, or a database
/// error.
pub async fn store_verification(pool: &PgPool, id: Uuid, report: &VerificationReport) -> Result<Course, CourseError> {
    let report = serde_json::to_value(report)?;
    let row = sqlx::query(&format!(
        "UPDATE courses SET verification_report = $2, updated_at = now()
         WHERE id = $1 AND NOT content_cleared
         RETURNING {COURSE_COLUMNS}"
    ))
    .bind(id)
    .bind(&report)
    .fetch_optional(pool)
    .await?;
    guarded_one(pool, id, row, CourseError::ContentCleared(id)).await
}

/// Re-run verification over stored course data and save the report.
///
/// # Errors
///
/// Fails when the course is missing, its content was cleared, it has no
/// source text, or nothing has been generated yet.
pub async fn verify_course(pool: &PgPool, id: Uuid) -> Result<Course, CourseError> {
    let course = get_course(pool, id).await?;
    let source = course.usable_source()?;
    let Some(generated) = course.course_data.as_ref() else {
        return Err(CourseError::Invalid(format!("course {id} has no generated content to verify")));
    };
    let report = super::verification::verify(&course.title, source, generated);
    info!(course_id = %id, status = ?report.status, ratio = report.coverage_ratio, "course verified");
    store_verification(pool, id, &report).await
}

/// Reserve the next document version. Returns the reserved version and the
/// file path attached before it, so concurrent uploads never share a
/// version or a storage key.
///
/// # Errors
///
/// Returns `NotFound` or a database error.
pub async fn claim_document_version(pool: &PgPool, id: Uuid) -> Result<(i32, Option<String>), CourseError> {
    let row = sqlx::query(
        "UPDATE courses SET document_version = document_version + 1, updated_at = now()
         WHERE id = $1
         RETURNING document_version, file_path",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(CourseError::NotFound(id))?;
    Ok((row.try_get("document_version")?, row.try_get("file_path")?))
}

/// Record a newly uploaded source document under a version reserved by
/// [`claim_document_version`]. When `source_text` is given it replaces the
/// stored text and clears the `content_cleared` flag.
///
/// # Errors
///
/// Returns `NotFound`, `Superseded` when a later upload reserved a newer
/// version, or a database error.
pub async fn attach_document(
    pool: &PgPool,
    id: Uuid,
    file_path: &str,
    version: i32,
    source_text: Option<&str>,
) -> Result<Course, CourseError> {
    let row = sqlx::query(&format!(
        "UPDATE courses SET
             file_path = $2,
             source_text = COALESCE($4, source_text),
             content_cleared = CASE WHEN $4::text IS NOT NULL THEN FALSE ELSE content_cleared END,
             updated_at = now()
         WHERE id = $1 AND document_version = $3
         RETURNING {COURSE_COLUMNS}"
    ))
    .bind(id)
    .bind(file_path)
    .bind(version)
    .bind(source_text)
    .fetch_optional(pool)
    .await?;
    let course = guarded_one(pool, id, row, CourseError::Superseded(id)).await?;
    info!(course_id = %id, file_path, version, "course document attached");
    Ok(course)
}

/// Remove the stored source file and forget its path.
///
/// # Errors
///
/// Returns `NotFound`, a storage error, or a database error.
pub async fn remove_document(pool: &PgPool, store: &dyn ObjectStore, id: Uuid) -> Result<Course, CourseError> {
    let course = get_course(pool, id).await?;
    if let Some(path) = course.file_path {
        store.remove(&[path]).await?;
    }
    let row = sqlx::query(&format!(
        "UPDATE courses SET file_path = NULL, updated_at = now() WHERE id = $1 RETURNING {COURSE_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    one(id, row)
}

/// Wipe sensitive content while keeping the course shell and configuration.
///
/// Nulls `source_text`, `course_data`, `verification_report`, `file_path`
/// and `compliance_notes`, sets `content_cleared`, and removes the stored
/// source file.
///
/// # Errors
///
/// Returns `NotFound`, a storage error, or a database error.
pub async fn secure_cleanup(pool: &PgPool, store: &dyn ObjectStore, id: Uuid) -> Result<Course, CourseError> {
    let course = get_course(pool, id).await?;
    if let Some(path) = course.file_path {
        store.remove(&[path]).await?;
    }
    let row = sqlx::query(&format!(
        "UPDATE courses SET
             source_text = NULL,
             course_data = NULL,
             verification_report = NULL,
             file_path = NULL,
             compliance_notes = NULL,
             content_cleared = TRUE,
             updated_at = now()
         WHERE id = $1
         RETURNING {COURSE_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    info!(course_id = %id, "course content securely cleared");
    one(id, row)
}

/// Delete a course and its stored source file.
///
/// # Errors
///
/// Returns `NotFound`, a storage error, or a database error.
pub async fn delete_course(pool: &PgPool, store: &dyn ObjectStore, id: Uuid) -> Result<(), CourseError> {
    let course = get_course(pool, id).await?;
    if let Some(path) = course.file_path {
        store.remove(&[path]).await?;
    }
    let result = sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CourseError::NotFound(id));
    }
    info!(course_id = %id, "course deleted");
    Ok(())
}

#[cfg(test)]
#[path = "course_test.rs"]
mod tests;
