//! Stateless verification and SOP comparison.

use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::routes::extract::ApiJson;
use crate::services::compare::{SectionDiff, diff_sections};
use crate::services::verification::{self, VerificationReport};

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    pub title: String,
    pub source_text: String,
    pub course_data: Value,
}

#[derive(Debug, Deserialize)]
pub struct CompareBody {
    pub original: String,
    pub revised: String,
}

/// `POST /api/verify` — verify generated content against its source.
pub async fn verify(ApiJson(body): ApiJson<VerifyBody>) -> Json<VerificationReport> {
    Json(verification::verify(&body.title, &body.source_text, &body.course_data))
}

/// `POST /api/compare` — section-level diff of two SOP revisions.
pub async fn compare(ApiJson(body): ApiJson<CompareBody>) -> Json<SectionDiff> {
    Json(diff_sections(&body.original, &body.revised))
}
