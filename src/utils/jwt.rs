// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, models::actor::Actor, state::AppState};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - stores the actor id (as string).
    pub sub: String,
    /// Role name at signing time. Informational only: authorization always
    /// runs against the actor's current stored state.
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

/// Signs a new JWT for the actor.
pub fn sign_jwt(
    id: i64,
    role: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        role: role.to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Axum middleware: authentication.
///
/// Validates the 'Authorization: Bearer <token>' header, then reloads the
/// actor from the store so role changes and deactivations take effect on
/// the very next request, not at token expiry. The fresh `Actor` is
/// injected into the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => return Err(AppError::AuthError("Missing bearer token".to_string())),
    };

    let claims = verify_jwt(token, &state.config.jwt_secret)?;
    let actor_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    let actor = state
        .store
        .actor_by_id(actor_id)
        .await?
        .ok_or_else(|| AppError::AuthError("Account no longer exists".to_string()))?;
    if !actor.is_active {
        return Err(AppError::Forbidden("Account is deactivated".to_string()));
    }

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

/// Axum middleware: staff gate.
///
/// Must be used AFTER `auth_middleware`. Rejects actors below staff level.
pub async fn staff_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let actor = req
        .extensions()
        .get::<Actor>()
        .ok_or_else(|| AppError::AuthError("Not authenticated".to_string()))?;

    if !actor.role.is_staff() {
        return Err(AppError::Forbidden("Staff level required".to_string()));
    }

    Ok(next.run(req).await)
}
