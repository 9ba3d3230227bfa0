// src/policy.rs
//
// Pure allow/deny decisions. No I/O, no side effects: callers perform the
// mutation only after an allow. Every predicate denies outright for
// deactivated actors, on top of the middleware doing the same, so a stale
// session can never act through a disabled account.

use crate::models::actor::Actor;
use crate::models::request::Request;
use crate::roles::{Role, STAFF_LEVEL};

/// Staff create accounts; everyone below does not.
pub fn can_create_actor(actor: &Actor) -> bool {
    actor.is_active && actor.role.is_staff()
}

/// Top management assigns any role. Other staff assign only roles strictly
/// below the staff threshold, which blocks promotion to peer or higher rank.
/// Non-staff never assign roles.
pub fn can_assign_role(actor: &Actor, target_role: Role) -> bool {
    if !actor.is_active {
        return false;
    }
    match actor.role {
        Role::TopManagement => true,
        r if r.is_staff() => target_role.level() < STAFF_LEVEL,
        _ => false,
    }
}

/// Reviewing takes the category's minimum level, forbids self-review, and
/// only applies while the request is still undecided (pending or review).
pub fn can_review_request(actor: &Actor, request: &Request) -> bool {
    actor.is_active
        && actor
            .role
            .has_minimum_level(request.category.required_reviewer_level())
        && actor.id != request.requested_by
        && !request.status.is_terminal()
}

/// Moderation-log deletion is an explicit owner capability set by seed
/// data. No role, however high, implies it.
pub fn can_delete_audit_log(actor: &Actor) -> bool {
    actor.is_active && actor.is_owner
}

/// Creating exams is management business, scoped to the actor's
/// departments. Top management is unscoped.
pub fn can_create_exam(actor: &Actor, department: &str) -> bool {
    if !actor.is_active {
        return false;
    }
    match actor.role {
        Role::TopManagement => true,
        r if r.is_staff() => actor.departments.iter().any(|d| d == department),
        _ => false,
    }
}

/// Managing an exam (viewing answer keys, deleting, running sessions)
/// takes senior level plus department membership. Top management is
/// unscoped.
pub fn can_manage_exam(actor: &Actor, department: &str) -> bool {
    if !actor.is_active {
        return false;
    }
    match actor.role {
        Role::TopManagement => true,
        r if r.is_senior_or_above() => actor.departments.iter().any(|d| d == department),
        _ => false,
    }
}
