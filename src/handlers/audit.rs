// src/handlers/audit.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppError, models::actor::Actor, policy, state::AppState};

#[derive(Debug, Deserialize)]
pub struct AuditListQuery {
    pub limit: Option<i64>,
}

/// Lists the newest moderation-log entries. Staff only (route-gated).
pub async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let entries = state.store.list_audit(limit).await?;
    Ok(Json(entries))
}

/// Deletes one moderation-log entry.
///
/// Gated on the explicit owner capability; rank alone, however high,
/// does not grant it.
pub async fn delete_audit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !policy::can_delete_audit_log(&actor) {
        return Err(AppError::Forbidden("Owner capability required".to_string()));
    }

    if !state.store.delete_audit(id).await? {
        return Err(AppError::NotFound("Audit entry not found".to_string()));
    }

    Ok(Json(json!({ "message": "Audit entry deleted" })))
}
