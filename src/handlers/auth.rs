// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::actor::{Actor, LoginRequest},
    state::AppState,
    utils::{hash::verify_password, jwt::sign_jwt},
};

/// Authenticates an actor and returns a JWT token.
///
/// The same message is returned for unknown usernames and wrong passwords.
/// Deactivated accounts are rejected explicitly: the account exists, the
/// holder just may not use it.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let actor = state
        .store
        .actor_by_username(&payload.username)
        .await?
        .ok_or_else(|| AppError::AuthError("Invalid username or password".to_string()))?;

    if !verify_password(&payload.password, &actor.password_hash)? {
        return Err(AppError::AuthError("Invalid username or password".to_string()));
    }

    if !actor.is_active {
        return Err(AppError::Forbidden("Account is deactivated".to_string()));
    }

    let token = sign_jwt(
        actor.id,
        actor.role.as_str(),
        &state.config.jwt_secret,
        state.config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "actor": actor,
    })))
}

/// Returns the calling actor as freshly loaded by the auth middleware.
pub async fn me(Extension(actor): Extension<Actor>) -> impl IntoResponse {
    Json(actor)
}
