// src/models/actor.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::roles::Role;

/// A portal account: any authenticated staff member or candidate.
///
/// Actors are never hard-deleted; leaving the team flips `is_active`, which
/// blocks authentication and fails every authorization check regardless of
/// role. `is_owner` is the explicit super-user capability, set only by
/// deployment seed data and never over the API.
#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub id: i64,

    /// Unique login name.
    pub username: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password_hash: String,

    pub role: Role,

    pub is_active: bool,

    pub is_owner: bool,

    /// Department tags scoping exam management ("moderation", "support", …).
    pub departments: Vec<String>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for staff creating an actor (role is assigned explicitly and is
/// checked against the caller's assignment rights).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateActorRequest {
    #[validate(length(
        min = 3,
        max = 32,
        message = "Username length must be between 3 and 32 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub password: String,
    pub role: Role,
    #[serde(default)]
    #[validate(custom(function = super::validate_departments))]
    pub departments: Vec<String>,
}

/// DTO for changing an actor's role.
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// DTO for toggling the active flag (soft deactivation).
#[derive(Debug, Deserialize)]
pub struct UpdateActiveRequest {
    pub is_active: bool,
}

/// DTO for replacing an actor's department tags.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDepartmentsRequest {
    #[validate(custom(function = super::validate_departments))]
    pub departments: Vec<String>,
}
