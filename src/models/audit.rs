// src/models/audit.rs

use serde::Serialize;

/// One line of the moderation log. Append-only; deletion is reserved for
/// the seeded owner account.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: i64,
    pub actor_username: String,
    /// Short machine name of the action ("actor.role_changed", …).
    pub action: String,
    pub details: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
