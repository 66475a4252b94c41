//! AI proxy route.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::Value;

use crate::error::ApiError;
use crate::llm::types::LlmError;
use crate::routes::api_error;
use crate::routes::extract::ApiJson;
use crate::services::ai::{self, AiError, AiRequest, AiResponse};
use crate::state::AppState;

pub(crate) fn ai_error_to_status(err: &AiError) -> StatusCode {
    match err {
        AiError::LlmNotConfigured | AiError::Llm(LlmError::MissingApiKey { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        AiError::EmptyDocument | AiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        AiError::Llm(LlmError::ApiResponse { status: 429, .. }) => StatusCode::TOO_MANY_REQUESTS,
        AiError::Llm(_) | AiError::MalformedOutput(_) => StatusCode::BAD_GATEWAY,
    }
}

/// `POST /api/ai` — run one AI operation.
pub async fn handle_ai(State(state): State<AppState>, ApiJson(body): ApiJson<Value>) -> Result<Json<AiResponse>, ApiError> {
    let to_api = |e: AiError| api_error(ai_error_to_status(&e), &e);
    let request = AiRequest::from_value(body).map_err(to_api)?;
    let response = ai::run(state.llm.as_ref(), state.ai_max_tokens, &request)
        .await
        .map_err(to_api)?;
    Ok(Json(response))
}
