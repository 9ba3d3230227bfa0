// src/handlers/mod.rs

pub mod actors;
pub mod audit;
pub mod auth;
pub mod exams;
pub mod requests;
pub mod sessions;
pub mod written;

use crate::models::actor::Actor;
use crate::state::AppState;
use crate::store::NewAuditEntry;

/// Appends to the moderation log. Best-effort: a failed write is logged
/// and never fails the mutation it describes.
pub(crate) async fn record_audit(state: &AppState, actor: &Actor, action: &str, details: String) {
    let entry = NewAuditEntry {
        actor_id: actor.id,
        actor_username: actor.username.clone(),
        action: action.to_string(),
        details,
    };
    if let Err(err) = state.store.record_audit(entry).await {
        tracing::warn!("Failed to record audit entry '{}': {}", action, err);
    }
}
