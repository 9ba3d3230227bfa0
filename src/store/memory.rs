// src/store/memory.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::audit::AuditEntry;
use crate::models::exam::{Exam, ExamType, Question};
use crate::models::request::{Request, RequestStatus};
use crate::models::session::{ExamSession, SessionStatus};
use crate::roles::Role;
use crate::utils::token::generate_session_token;

use super::{
    NewActor, NewAuditEntry, NewExam, NewRequest, NewSession, RequestFilter, SessionFilter,
    Store, status_conflict,
};

/// In-memory backend. One lock over the whole state keeps every multi-step
/// operation atomic without further ceremony; plenty for tests and demos.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    actors: HashMap<i64, Actor>,
    exams: HashMap<i64, Exam>,
    questions: HashMap<i64, Question>,
    sessions: HashMap<i64, ExamSession>,
    requests: HashMap<i64, Request>,
    audit: HashMap<i64, AuditEntry>,
    next_actor_id: i64,
    next_exam_id: i64,
    next_question_id: i64,
    next_session_id: i64,
    next_request_id: i64,
    next_audit_id: i64,
}

fn bump(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    /// Shared by `create_session` and the approval path of `decide_request`.
    /// Validates everything before touching any map, so a failure leaves the
    /// state untouched.
    fn insert_session(&mut self, new: &NewSession) -> Result<ExamSession, AppError> {
        let exam_type = self
            .exams
            .get(&new.exam_id)
            .map(|e| e.exam_type)
            .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))?;
        let candidate = self
            .actors
            .get(&new.candidate_id)
            .ok_or_else(|| AppError::NotFound("Candidate not found".to_string()))?;
        if !candidate.is_active {
            return Err(AppError::BadRequest(
                "Candidate account is deactivated".to_string(),
            ));
        }
        let max_score: i64 = self
            .questions
            .values()
            .filter(|q| q.exam_id == new.exam_id)
            .map(|q| q.points)
            .sum();
        let status = if exam_type == ExamType::Written {
            SessionStatus::PendingWritten
        } else {
            SessionStatus::InProgress
        };
        let id = bump(&mut self.next_session_id);
        let session = ExamSession {
            id,
            exam_id: new.exam_id,
            candidate_id: new.candidate_id,
            examiner_id: new.examiner_id,
            status,
            access_token: generate_session_token(),
            answers: HashMap::new(),
            score: None,
            max_score,
            percentage: None,
            notes: None,
            started_at: Utc::now(),
            written_submitted_at: None,
            completed_at: None,
        };
        self.sessions.insert(id, session.clone());
        Ok(session)
    }
}

#[async_trait]
impl Store for MemStore {
    async fn create_actor(&self, new: NewActor) -> Result<Actor, AppError> {
        let mut inner = self.inner.write().await;
        if inner
            .actors
            .values()
            .any(|a| a.username.eq_ignore_ascii_case(&new.username))
        {
            return Err(AppError::Conflict(format!(
                "Username '{}' is already taken",
                new.username
            )));
        }
        let id = bump(&mut inner.next_actor_id);
        let actor = Actor {
            id,
            username: new.username,
            password_hash: new.password_hash,
            role: new.role,
            is_active: true,
            is_owner: new.is_owner,
            departments: new.departments,
            created_at: Utc::now(),
        };
        inner.actors.insert(id, actor.clone());
        Ok(actor)
    }

    async fn actor_by_id(&self, id: i64) -> Result<Option<Actor>, AppError> {
        Ok(self.inner.read().await.actors.get(&id).cloned())
    }

    async fn actor_by_username(&self, username: &str) -> Result<Option<Actor>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .actors
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn list_actors(&self) -> Result<Vec<Actor>, AppError> {
        let inner = self.inner.read().await;
        let mut actors: Vec<Actor> = inner.actors.values().cloned().collect();
        actors.sort_by_key(|a| a.id);
        Ok(actors)
    }

    async fn update_actor_role(&self, id: i64, role: Role) -> Result<Actor, AppError> {
        let mut inner = self.inner.write().await;
        let actor = inner
            .actors
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Actor not found".to_string()))?;
        actor.role = role;
        Ok(actor.clone())
    }

    async fn set_actor_active(&self, id: i64, is_active: bool) -> Result<Actor, AppError> {
        let mut inner = self.inner.write().await;
        let actor = inner
            .actors
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Actor not found".to_string()))?;
        actor.is_active = is_active;
        Ok(actor.clone())
    }

    async fn set_actor_departments(
        &self,
        id: i64,
        departments: Vec<String>,
    ) -> Result<Actor, AppError> {
        let mut inner = self.inner.write().await;
        let actor = inner
            .actors
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Actor not found".to_string()))?;
        actor.departments = departments;
        Ok(actor.clone())
    }

    async fn create_exam(&self, new: NewExam) -> Result<(Exam, Vec<Question>), AppError> {
        let mut inner = self.inner.write().await;
        let exam_id = bump(&mut inner.next_exam_id);
        let exam = Exam {
            id: exam_id,
            title: new.title,
            description: new.description,
            exam_type: new.exam_type,
            department: new.department,
            created_by: new.created_by,
            created_at: Utc::now(),
        };
        let mut questions = Vec::with_capacity(new.questions.len());
        for (index, q) in new.questions.into_iter().enumerate() {
            let id = bump(&mut inner.next_question_id);
            let question = Question {
                id,
                exam_id,
                text: q.text,
                question_type: q.question_type,
                options: q.options,
                correct_answer: q.correct_answer,
                points: q.points,
                order_index: index as i64,
            };
            inner.questions.insert(id, question.clone());
            questions.push(question);
        }
        inner.exams.insert(exam_id, exam.clone());
        Ok((exam, questions))
    }

    async fn exam_by_id(&self, id: i64) -> Result<Option<Exam>, AppError> {
        Ok(self.inner.read().await.exams.get(&id).cloned())
    }

    async fn exam_with_questions(
        &self,
        id: i64,
    ) -> Result<Option<(Exam, Vec<Question>)>, AppError> {
        let inner = self.inner.read().await;
        let Some(exam) = inner.exams.get(&id).cloned() else {
            return Ok(None);
        };
        let mut questions: Vec<Question> = inner
            .questions
            .values()
            .filter(|q| q.exam_id == id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.order_index);
        Ok(Some((exam, questions)))
    }

    async fn list_exams(&self, department: Option<&str>) -> Result<Vec<Exam>, AppError> {
        let inner = self.inner.read().await;
        let mut exams: Vec<Exam> = inner
            .exams
            .values()
            .filter(|e| department.is_none_or(|d| e.department == d))
            .cloned()
            .collect();
        exams.sort_by_key(|e| std::cmp::Reverse(e.id));
        Ok(exams)
    }

    async fn delete_exam(&self, id: i64) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        if inner.exams.remove(&id).is_none() {
            return Ok(false);
        }
        inner.questions.retain(|_, q| q.exam_id != id);
        Ok(true)
    }

    async fn create_session(&self, new: NewSession) -> Result<ExamSession, AppError> {
        self.inner.write().await.insert_session(&new)
    }

    async fn session_by_id(&self, id: i64) -> Result<Option<ExamSession>, AppError> {
        Ok(self.inner.read().await.sessions.get(&id).cloned())
    }

    async fn session_by_token(&self, token: &str) -> Result<Option<ExamSession>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .sessions
            .values()
            .find(|s| s.access_token == token)
            .cloned())
    }

    async fn list_sessions(&self, filter: SessionFilter) -> Result<Vec<ExamSession>, AppError> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<ExamSession> = inner
            .sessions
            .values()
            .filter(|s| filter.exam_id.is_none_or(|id| s.exam_id == id))
            .filter(|s| filter.candidate_id.is_none_or(|id| s.candidate_id == id))
            .filter(|s| filter.examiner_id.is_none_or(|id| s.examiner_id == id))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.id));
        Ok(sessions)
    }

    async fn patch_answer(
        &self,
        session_id: i64,
        question_id: i64,
        answer: &str,
        allowed: &[SessionStatus],
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let exam_id = {
            let session = inner
                .sessions
                .get(&session_id)
                .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;
            if !allowed.contains(&session.status) {
                return Err(status_conflict(session.status));
            }
            session.exam_id
        };
        let belongs = inner
            .questions
            .get(&question_id)
            .is_some_and(|q| q.exam_id == exam_id);
        if !belongs {
            return Err(AppError::BadRequest(
                "Question does not belong to this exam".to_string(),
            ));
        }
        if let Some(session) = inner.sessions.get_mut(&session_id) {
            session.answers.insert(question_id, answer.to_string());
        }
        Ok(())
    }

    async fn submit_written(&self, session_id: i64) -> Result<ExamSession, AppError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;
        if session.status != SessionStatus::PendingWritten {
            return Err(status_conflict(session.status));
        }
        session.status = SessionStatus::WrittenSubmitted;
        session.written_submitted_at = Some(Utc::now());
        Ok(session.clone())
    }

    async fn finalize_session(
        &self,
        session_id: i64,
        score: i64,
        percentage: i64,
        status: SessionStatus,
        notes: Option<String>,
    ) -> Result<ExamSession, AppError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;
        if !session.status.can_finalize() {
            return Err(status_conflict(session.status));
        }
        session.status = status;
        session.score = Some(score);
        session.percentage = Some(percentage);
        if notes.is_some() {
            session.notes = notes;
        }
        session.completed_at = Some(Utc::now());
        Ok(session.clone())
    }

    async fn create_request(&self, new: NewRequest) -> Result<Request, AppError> {
        let mut inner = self.inner.write().await;
        let id = bump(&mut inner.next_request_id);
        let request = Request {
            id,
            category: new.category,
            title: new.title,
            description: new.description,
            priority: new.priority,
            requested_by: new.requested_by,
            assigned_to: new.assigned_to,
            status: RequestStatus::Pending,
            response: None,
            reviewed_by: None,
            reviewed_at: None,
            metadata: new.metadata,
            created_at: Utc::now(),
        };
        inner.requests.insert(id, request.clone());
        Ok(request)
    }

    async fn request_by_id(&self, id: i64) -> Result<Option<Request>, AppError> {
        Ok(self.inner.read().await.requests.get(&id).cloned())
    }

    async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<Request>, AppError> {
        let inner = self.inner.read().await;
        let mut requests: Vec<Request> = inner
            .requests
            .values()
            .filter(|r| filter.requested_by.is_none_or(|id| r.requested_by == id))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by_key(|r| std::cmp::Reverse(r.id));
        Ok(requests)
    }

    async fn mark_request_review(&self, id: i64, reviewer_id: i64) -> Result<Request, AppError> {
        let mut inner = self.inner.write().await;
        let request = inner
            .requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;
        match request.status {
            RequestStatus::Pending => {
                request.status = RequestStatus::Review;
                request.reviewed_by = Some(reviewer_id);
                request.reviewed_at = Some(Utc::now());
                Ok(request.clone())
            }
            RequestStatus::Review => Err(AppError::Conflict(
                "Request is already under review".to_string(),
            )),
            _ => Err(AppError::Conflict(
                "Request has already been decided".to_string(),
            )),
        }
    }

    async fn decide_request(
        &self,
        id: i64,
        reviewer_id: i64,
        status: RequestStatus,
        response: Option<String>,
        spawn: Option<NewSession>,
    ) -> Result<(Request, Option<ExamSession>), AppError> {
        let mut inner = self.inner.write().await;
        let mut request = inner
            .requests
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;
        if request.status.is_terminal() {
            return Err(AppError::Conflict(
                "Request has already been decided".to_string(),
            ));
        }
        // Spawn first: if it fails, the request below is never touched.
        let session = match spawn {
            Some(new) => Some(inner.insert_session(&new)?),
            None => None,
        };
        request.status = status;
        request.response = response;
        request.reviewed_by = Some(reviewer_id);
        request.reviewed_at = Some(Utc::now());
        inner.requests.insert(id, request.clone());
        Ok((request, session))
    }

    async fn record_audit(&self, entry: NewAuditEntry) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let id = bump(&mut inner.next_audit_id);
        inner.audit.insert(
            id,
            AuditEntry {
                id,
                actor_id: entry.actor_id,
                actor_username: entry.actor_username,
                action: entry.action,
                details: entry.details,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list_audit(&self, limit: i64) -> Result<Vec<AuditEntry>, AppError> {
        let inner = self.inner.read().await;
        let mut entries: Vec<AuditEntry> = inner.audit.values().cloned().collect();
        entries.sort_by_key(|e| std::cmp::Reverse(e.id));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn delete_audit(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.inner.write().await.audit.remove(&id).is_some())
    }
}
