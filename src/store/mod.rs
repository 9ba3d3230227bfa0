// src/store/mod.rs
pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::audit::AuditEntry;
use crate::models::exam::{Exam, ExamType, NewQuestion, Question};
use crate::models::request::{Priority, Request, RequestCategory, RequestStatus};
use crate::models::session::{ExamSession, SessionStatus};
use crate::roles::Role;

/// Input for inserting an actor. The password arrives already hashed.
pub struct NewActor {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub departments: Vec<String>,
    pub is_owner: bool,
}

/// Input for inserting an exam together with its questions.
/// Question order follows the order of the vector.
pub struct NewExam {
    pub title: String,
    pub description: String,
    pub exam_type: ExamType,
    pub department: String,
    pub created_by: i64,
    pub questions: Vec<NewQuestion>,
}

/// Everything needed to open a session. Both entry points (an examiner
/// starting one directly, and an approved exam request spawning one)
/// build this same input, so sessions are created identically either way.
#[derive(Clone)]
pub struct NewSession {
    pub exam_id: i64,
    pub candidate_id: i64,
    pub examiner_id: i64,
}

pub struct NewRequest {
    pub category: RequestCategory,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub requested_by: i64,
    pub assigned_to: Option<i64>,
    pub metadata: serde_json::Value,
}

pub struct NewAuditEntry {
    pub actor_id: i64,
    pub actor_username: String,
    pub action: String,
    pub details: String,
}

#[derive(Default)]
pub struct SessionFilter {
    pub exam_id: Option<i64>,
    pub candidate_id: Option<i64>,
    pub examiner_id: Option<i64>,
}

#[derive(Default)]
pub struct RequestFilter {
    pub requested_by: Option<i64>,
    pub status: Option<RequestStatus>,
}

/// Maps a session status that rejected a write to the conflict the caller
/// should see. Both store backends report the same errors through this.
pub(crate) fn status_conflict(status: SessionStatus) -> AppError {
    if status.is_terminal() {
        return AppError::session_completed();
    }
    match status {
        SessionStatus::WrittenSubmitted => AppError::already_submitted(),
        SessionStatus::PendingWritten => {
            AppError::Conflict("Written answers have not been submitted yet".to_string())
        }
        SessionStatus::InProgress => {
            AppError::Conflict("Session is not in the written phase".to_string())
        }
        _ => AppError::session_completed(),
    }
}

/// Persistence backend. `PgStore` is the production implementation; the
/// in-memory one backs the integration tests.
///
/// Multi-step operations (creating an exam with its questions, deciding a
/// request together with the session it spawns) are all-or-nothing in every
/// implementation.
#[async_trait]
pub trait Store: Send + Sync {
    // actors
    async fn create_actor(&self, new: NewActor) -> Result<Actor, AppError>;
    async fn actor_by_id(&self, id: i64) -> Result<Option<Actor>, AppError>;
    async fn actor_by_username(&self, username: &str) -> Result<Option<Actor>, AppError>;
    async fn list_actors(&self) -> Result<Vec<Actor>, AppError>;
    async fn update_actor_role(&self, id: i64, role: Role) -> Result<Actor, AppError>;
    async fn set_actor_active(&self, id: i64, is_active: bool) -> Result<Actor, AppError>;
    async fn set_actor_departments(
        &self,
        id: i64,
        departments: Vec<String>,
    ) -> Result<Actor, AppError>;

    // exams
    async fn create_exam(&self, new: NewExam) -> Result<(Exam, Vec<Question>), AppError>;
    async fn exam_by_id(&self, id: i64) -> Result<Option<Exam>, AppError>;
    async fn exam_with_questions(&self, id: i64)
        -> Result<Option<(Exam, Vec<Question>)>, AppError>;
    async fn list_exams(&self, department: Option<&str>) -> Result<Vec<Exam>, AppError>;
    async fn delete_exam(&self, id: i64) -> Result<bool, AppError>;

    // sessions
    async fn create_session(&self, new: NewSession) -> Result<ExamSession, AppError>;
    async fn session_by_id(&self, id: i64) -> Result<Option<ExamSession>, AppError>;
    async fn session_by_token(&self, token: &str) -> Result<Option<ExamSession>, AppError>;
    async fn list_sessions(&self, filter: SessionFilter) -> Result<Vec<ExamSession>, AppError>;
    /// Stores one answer, keyed by question id. Last write wins per key.
    /// Rejected with a conflict unless the current status is in `allowed`.
    async fn patch_answer(
        &self,
        session_id: i64,
        question_id: i64,
        answer: &str,
        allowed: &[SessionStatus],
    ) -> Result<(), AppError>;
    async fn submit_written(&self, session_id: i64) -> Result<ExamSession, AppError>;
    async fn finalize_session(
        &self,
        session_id: i64,
        score: i64,
        percentage: i64,
        status: SessionStatus,
        notes: Option<String>,
    ) -> Result<ExamSession, AppError>;

    // requests
    async fn create_request(&self, new: NewRequest) -> Result<Request, AppError>;
    async fn request_by_id(&self, id: i64) -> Result<Option<Request>, AppError>;
    async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<Request>, AppError>;
    async fn mark_request_review(&self, id: i64, reviewer_id: i64) -> Result<Request, AppError>;
    /// Writes the decision and, for an approved exam request, opens the
    /// session in the same step. If the spawn fails the request keeps its
    /// previous status.
    async fn decide_request(
        &self,
        id: i64,
        reviewer_id: i64,
        status: RequestStatus,
        response: Option<String>,
        spawn: Option<NewSession>,
    ) -> Result<(Request, Option<ExamSession>), AppError>;

    // audit log
    async fn record_audit(&self, entry: NewAuditEntry) -> Result<(), AppError>;
    async fn list_audit(&self, limit: i64) -> Result<Vec<AuditEntry>, AppError>;
    async fn delete_audit(&self, id: i64) -> Result<bool, AppError>;
}
