//! Source document validation for uploads.
//!
//! Every check runs and every failure is reported, so a client can show the
//! full list at once instead of fixing problems one round-trip at a time.

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::course::{self, Course, CourseError};
use super::storage::{ObjectStore, StorageError, StoredObject};
use crate::error::ErrorCode;

const MIB: usize = 1024 * 1024;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const TEXT_MIME: &str = "text/plain";
pub const MARKDOWN_MIME: &str = "text/markdown";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("malformed multipart body: {0}")]
    Multipart(String),
    #[error("upload exceeds the request size limit: {0}")]
    TooLarge(String),
    #[error("multipart body has no `file` field")]
    MissingFile,
    #[error("upload rejected: {}", .0.join("; "))]
    Rejected(Vec<String>),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ErrorCode for UploadError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Multipart(_) => "E_MULTIPART",
            Self::TooLarge(_) => "E_UPLOAD_TOO_LARGE",
            Self::MissingFile => "E_MISSING_FILE",
            Self::Rejected(_) => "E_UPLOAD_REJECTED",
            Self::Course(e) => e.error_code(),
            Self::Storage(e) => e.error_code(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
}

impl DocumentKind {
    /// Classify a MIME type; parameters such as `; charset=utf-8` are ignored.
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match essence.as_str() {
            PDF_MIME => Some(Self::Pdf),
            DOCX_MIME => Some(Self::Docx),
            TEXT_MIME | MARKDOWN_MIME | "text/x-markdown" => Some(Self::Text),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_extension(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "md" | "markdown" => Some(Self::Text),
            _ => None,
        }
    }

    #[must_use]
    pub fn max_bytes(self) -> usize {
        match self {
            Self::Pdf => 20 * MIB,
            Self::Docx => 10 * MIB,
            Self::Text => 2 * MIB,
        }
    }

    fn magic_ok(self, bytes: &[u8]) -> bool {
        match self {
            Self::Pdf => bytes.starts_with(b"%PDF-"),
            Self::Docx => bytes.starts_with(b"PK\x03\x04"),
            Self::Text => std::str::from_utf8(bytes).is_ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Validation {
    Valid,
    Invalid { reasons: Vec<String> },
}

/// Metadata for one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub name: String,
    pub size: usize,
    pub mime_type: String,
    pub kind: Option<DocumentKind>,
    pub version: i32,
    pub validation: Validation,
}

/// Validate an upload. Generic MIME types (`application/octet-stream` or an
/// empty string) fall back to the file extension.
#[must_use]
pub fn validate_upload(name: &str, mime_type: &str, bytes: &[u8], version: i32) -> UploadedFile {
    let mut reasons = Vec::new();

    let generic_mime = mime_type.trim().is_empty() || mime_type.starts_with("application/octet-stream");
    let by_extension = DocumentKind::from_extension(name);
    let kind = if generic_mime { by_extension } else { DocumentKind::from_mime(mime_type) };

    if bytes.is_empty() {
        reasons.push("file is empty".to_string());
    }

    match kind {
        None => reasons.push(format!("unsupported file type '{mime_type}' (expected PDF, DOCX or plain text)")),
        Some(kind) => {
            if bytes.len() > kind.max_bytes() {
                reasons.push(format!(
                    "file is {} bytes, larger than the {} MiB limit for this type",
                    bytes.len(),
                    kind.max_bytes() / MIB
                ));
            }
            if by_extension != Some(kind) {
                reasons.push(format!("file extension of '{name}' does not match its type"));
            }
            if !bytes.is_empty() && !kind.magic_ok(bytes) {
                reasons.push("file contents do not match the declared type".to_string());
            }
        }
    }

    let validation = if reasons.is_empty() { Validation::Valid } else { Validation::Invalid { reasons } };
    UploadedFile {
        name: name.to_string(),
        size: bytes.len(),
        mime_type: mime_type.to_string(),
        kind,
        version,
        validation,
    }
}

/// Keep ASCII alphanumerics plus `.`, `-` and `_`; everything else becomes
/// `_`. Leading dots are stripped so the result is never hidden or `..`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() { "document".to_string() } else { trimmed.to_string() }
}

/// Storage key for version `version` of a course's source document.
#[must_use]
pub fn storage_path(course_id: Uuid, version: i32, name: &str) -> String {
    format!("courses/{course_id}/v{version}/{}", sanitize_file_name(name))
}

/// Source text for a validated upload: text files are decoded directly,
/// binary formats rely on text extracted by the client.
#[must_use]
pub fn source_text(kind: DocumentKind, bytes: &[u8], extracted: Option<&str>) -> Option<String> {
    let text = match kind {
        DocumentKind::Text => std::str::from_utf8(bytes).ok().map(str::to_string),
        DocumentKind::Pdf | DocumentKind::Docx => extracted.map(str::to_string),
    };
    text.filter(|t| !t.trim().is_empty())
}

// =============================================================================
// COURSE DOCUMENTS
// =============================================================================

/// One file as received from a multipart body.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// Text extracted by the client, required for PDF/DOCX to update the
    /// course's source text.
    pub extracted_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub course: Course,
    pub file: UploadedFile,
    pub stored: StoredObject,
}

/// Validate, store and attach a new version of a course's source document.
///
/// The version is reserved in the database before anything is stored, so
/// concurrent uploads write distinct keys. The previous version's object is
/// removed once the new one is attached. If attaching fails (including when
/// a later upload reserved a newer version first), the freshly stored object
/// is removed again.
///
/// # Errors
///
/// Returns `Rejected` with every validation failure, or a course/storage
/// error.
pub async fn upload_document(
    pool: &PgPool,
    store: &dyn ObjectStore,
    course_id: Uuid,
    incoming: &IncomingFile,
) -> Result<UploadOutcome, UploadError> {
    let existing = course::get_course(pool, course_id).await?;

    let mut file = validate_upload(&incoming.name, &incoming.mime_type, &incoming.bytes, existing.document_version + 1);
    let kind = match (&file.validation, file.kind) {
        (Validation::Valid, Some(kind)) => kind,
        (Validation::Invalid { reasons }, _) => return Err(UploadError::Rejected(reasons.clone())),
        (Validation::Valid, None) => return Err(UploadError::Rejected(vec!["unsupported file type".into()])),
    };
    let text = source_text(kind, &incoming.bytes, incoming.extracted_text.as_deref());

    let (version, previous) = course::claim_document_version(pool, course_id).await?;
    file.version = version;

    let path = storage_path(course_id, version, &incoming.name);
    let stored = store.put(&path, &incoming.bytes, &incoming.mime_type).await?;

    let course = match course::attach_document(pool, course_id, &path, version, text.as_deref()).await {
        Ok(course) => course,
        Err(e) => {
            if let Err(cleanup) = store.remove(std::slice::from_ref(&path)).await {
                warn!(%course_id, path = %path, error = %cleanup, "upload: orphaned object after failed attach");
            }
            return Err(e.into());
        }
    };

    if let Some(previous) = previous.filter(|p| *p != path) {
        if let Err(e) = store.remove(std::slice::from_ref(&previous)).await {
            warn!(%course_id, path = %previous, error = %e, "upload: previous version not removed");
        }
    }

    info!(%course_id, version, size = stored.size, text = text.is_some(), "upload: document attached");
    Ok(UploadOutcome { course, file, stored })
}

#[cfg(test)]
#[path = "upload_test.rs"]
mod tests;
