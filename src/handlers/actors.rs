// src/handlers/actors.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::record_audit,
    models::actor::{
        Actor, CreateActorRequest, UpdateActiveRequest, UpdateDepartmentsRequest,
        UpdateRoleRequest,
    },
    notify::StaffEvent,
    policy,
    state::AppState,
    store::NewActor,
    utils::hash::hash_password,
};

/// Lists every actor, active and deactivated. Staff only (route-gated).
pub async fn list_actors(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let actors = state.store.list_actors().await?;
    Ok(Json(actors))
}

/// Creates an actor with an explicitly assigned role.
///
/// Creating with a role counts as assigning that role, so the caller must
/// be allowed to assign it. Owner capability is never settable here.
pub async fn create_actor(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateActorRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if !policy::can_create_actor(&actor) {
        return Err(AppError::Forbidden("You cannot create accounts".to_string()));
    }
    if !policy::can_assign_role(&actor, payload.role) {
        return Err(AppError::Forbidden("You cannot assign this role".to_string()));
    }

    let password_hash = hash_password(&payload.password)?;
    let created = state
        .store
        .create_actor(NewActor {
            username: payload.username,
            password_hash,
            role: payload.role,
            departments: payload.departments,
            is_owner: false,
        })
        .await?;

    record_audit(
        &state,
        &actor,
        "actor.created",
        format!("{} ({})", created.username, created.role),
    )
    .await;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Changes an actor's role.
///
/// The caller needs assignment rights over both the new role and the
/// target's current one; anything else would let management demote a peer
/// they could never have appointed.
pub async fn update_role(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let target = state
        .store
        .actor_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Actor not found".to_string()))?;

    if !policy::can_assign_role(&actor, payload.role)
        || !policy::can_assign_role(&actor, target.role)
    {
        return Err(AppError::Forbidden(
            "You cannot change this actor's role".to_string(),
        ));
    }

    let old_role = target.role;
    let updated = state.store.update_actor_role(id, payload.role).await?;

    state
        .notifier
        .send(StaffEvent::RoleChanged {
            username: updated.username.clone(),
            from: old_role,
            to: updated.role,
        })
        .await;

    record_audit(
        &state,
        &actor,
        "actor.role_changed",
        format!("{}: {} -> {}", updated.username, old_role, updated.role),
    )
    .await;

    Ok(Json(updated))
}

/// Toggles the active flag (soft deactivation).
///
/// Deactivating yourself is blocked; locking out the last admin over a
/// misclick is not worth supporting.
pub async fn update_active(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateActiveRequest>,
) -> Result<impl IntoResponse, AppError> {
    if id == actor.id && !payload.is_active {
        return Err(AppError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }

    let target = state
        .store
        .actor_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Actor not found".to_string()))?;

    if !policy::can_assign_role(&actor, target.role) {
        return Err(AppError::Forbidden(
            "You cannot manage this actor".to_string(),
        ));
    }

    let updated = state.store.set_actor_active(id, payload.is_active).await?;

    record_audit(
        &state,
        &actor,
        "actor.active_changed",
        format!(
            "{}: {}",
            updated.username,
            if updated.is_active { "activated" } else { "deactivated" }
        ),
    )
    .await;

    Ok(Json(updated))
}

/// Replaces an actor's department tags.
pub async fn update_departments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateDepartmentsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let target = state
        .store
        .actor_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Actor not found".to_string()))?;

    if !policy::can_assign_role(&actor, target.role) {
        return Err(AppError::Forbidden(
            "You cannot manage this actor".to_string(),
        ));
    }

    let updated = state
        .store
        .set_actor_departments(id, payload.departments)
        .await?;

    record_audit(
        &state,
        &actor,
        "actor.departments_changed",
        format!("{}: [{}]", updated.username, updated.departments.join(", ")),
    )
    .await;

    Ok(Json(updated))
}
