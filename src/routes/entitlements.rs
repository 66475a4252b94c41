//! Organization entitlement lookup.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::api_error;
use crate::routes::extract::ApiPath;
use crate::services::entitlement::Entitlements;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct EntitlementsResponse {
    pub organization_id: Uuid,
    pub entitlements: Entitlements,
}

/// `GET /api/organizations/{id}/entitlements`
pub async fn list_entitlements(
    State(state): State<AppState>,
    ApiPath(organization_id): ApiPath<Uuid>,
) -> Result<Json<EntitlementsResponse>, ApiError> {
    let entitlements = state
        .entitlements
        .load(&state.pool, organization_id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e))?;
    Ok(Json(EntitlementsResponse { organization_id, entitlements }))
}
