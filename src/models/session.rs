// src/models/session.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::exam::PublicQuestion;

/// Lifecycle of one exam attempt.
///
/// Examiner-run sessions start at `in_progress`; written exams start at
/// `pending_written` and pass through `written_submitted` when the candidate
/// turns in their answers via the access token. `passed` and `failed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    PendingWritten,
    WrittenSubmitted,
    Passed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::PendingWritten => "pending_written",
            SessionStatus::WrittenSubmitted => "written_submitted",
            SessionStatus::Passed => "passed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<SessionStatus> {
        match s {
            "in_progress" => Some(SessionStatus::InProgress),
            "pending_written" => Some(SessionStatus::PendingWritten),
            "written_submitted" => Some(SessionStatus::WrittenSubmitted),
            "passed" => Some(SessionStatus::Passed),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Passed | SessionStatus::Failed)
    }

    /// Statuses from which finalize may proceed. `pending_written` is
    /// excluded: the candidate's submission has to land first.
    pub fn can_finalize(self) -> bool {
        matches!(
            self,
            SessionStatus::InProgress | SessionStatus::WrittenSubmitted
        )
    }
}

/// One candidate's one attempt at one exam, owned by one examiner.
///
/// `max_score` is frozen at session start from the exam's question set and
/// never recomputed, so history stays interpretable even after the exam
/// definition is deleted. Every session is addressable by id (examiner view)
/// and by `access_token` (candidate view); the token path only accepts
/// writes while `status = pending_written`.
#[derive(Debug, Clone, Serialize)]
pub struct ExamSession {
    pub id: i64,
    pub exam_id: i64,
    pub candidate_id: i64,
    pub examiner_id: i64,
    pub status: SessionStatus,

    /// Unguessable token for the candidate-facing written sub-flow.
    /// Not serialized in listings; the examiner fetches it explicitly.
    #[serde(skip)]
    pub access_token: String,

    /// One entry per answered question, last write wins per key.
    pub answers: HashMap<i64, String>,

    pub score: Option<i64>,
    pub max_score: i64,
    pub percentage: Option<i64>,
    pub notes: Option<String>,

    pub started_at: chrono::DateTime<chrono::Utc>,
    pub written_submitted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for starting a session from the exam page.
#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub candidate_id: i64,
}

/// DTO for patching a single answer (examiner side and candidate side).
#[derive(Debug, Deserialize, Validate)]
pub struct AnswerPatchRequest {
    pub question_id: i64,
    #[validate(length(max = 4000))]
    pub answer: String,
}

/// DTO for finalizing a session.
///
/// `overrides` carries examiner-entered points for open/scenario/practical
/// questions, keyed by question id.
#[derive(Debug, Deserialize, Validate)]
pub struct FinalizeSessionRequest {
    #[serde(default)]
    pub overrides: HashMap<i64, i64>,
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
}

/// Candidate view of a written session, fetched by access token.
/// Correct answers are never included.
#[derive(Debug, Serialize)]
pub struct WrittenSessionView {
    pub status: SessionStatus,
    pub exam_title: String,
    pub exam_description: String,
    pub max_score: i64,
    /// Present only while the session still accepts answers.
    pub questions: Option<Vec<PublicQuestion>>,
    pub answers: HashMap<i64, String>,
    pub written_submitted_at: Option<chrono::DateTime<chrono::Utc>>,
}
