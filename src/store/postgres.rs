// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::audit::AuditEntry;
use crate::models::exam::{Exam, ExamType, Question, QuestionType};
use crate::models::request::{Priority, Request, RequestCategory, RequestStatus};
use crate::models::session::{ExamSession, SessionStatus};
use crate::roles::Role;
use crate::utils::token::generate_session_token;

use super::{
    NewActor, NewAuditEntry, NewExam, NewRequest, NewSession, RequestFilter, SessionFilter,
    Store, status_conflict,
};

const ACTOR_COLUMNS: &str = "id, username, password_hash, role, is_active, is_owner, departments, created_at";
const EXAM_COLUMNS: &str = "id, title, description, exam_type, department, created_by, created_at";
const QUESTION_COLUMNS: &str =
    "id, exam_id, text, question_type, options, correct_answer, points, order_index";
const SESSION_COLUMNS: &str = "id, exam_id, candidate_id, examiner_id, status, access_token, answers, score, max_score, percentage, notes, started_at, written_submitted_at, completed_at";
const REQUEST_COLUMNS: &str = "id, category, title, description, priority, requested_by, assigned_to, status, response, reviewed_by, reviewed_at, metadata, created_at";
const AUDIT_COLUMNS: &str = "id, actor_id, actor_username, action, details, created_at";

/// Production backend on Postgres. Status machines are enforced with
/// guarded updates (`WHERE status = ...`), so concurrent transitions lose
/// cleanly with a conflict instead of overwriting each other.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn session_status(&self, session_id: i64) -> Result<SessionStatus, AppError> {
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM exam_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;
        parse_session_status(&status)
    }
}

// Stored enum tags are a closed set; anything else is corrupt data, not
// caller input.
fn parse_session_status(s: &str) -> Result<SessionStatus, AppError> {
    SessionStatus::parse(s)
        .ok_or_else(|| AppError::InternalServerError(format!("Unknown session status '{s}'")))
}

fn parse_exam_type(s: &str) -> Result<ExamType, AppError> {
    ExamType::parse(s)
        .ok_or_else(|| AppError::InternalServerError(format!("Unknown exam type '{s}'")))
}

fn parse_question_type(s: &str) -> Result<QuestionType, AppError> {
    QuestionType::parse(s)
        .ok_or_else(|| AppError::InternalServerError(format!("Unknown question type '{s}'")))
}

fn parse_request_status(s: &str) -> Result<RequestStatus, AppError> {
    RequestStatus::parse(s)
        .ok_or_else(|| AppError::InternalServerError(format!("Unknown request status '{s}'")))
}

fn parse_category(s: &str) -> Result<RequestCategory, AppError> {
    RequestCategory::parse(s)
        .ok_or_else(|| AppError::InternalServerError(format!("Unknown request category '{s}'")))
}

fn parse_priority(s: &str) -> Result<Priority, AppError> {
    Priority::parse(s)
        .ok_or_else(|| AppError::InternalServerError(format!("Unknown priority '{s}'")))
}

/// Maps a lost duplicate-username race to the same conflict the pre-check
/// reports. Postgres raises unique-index violations as error code 23505.
fn username_conflict(err: sqlx::Error, username: &str) -> AppError {
    if err.to_string().contains("unique constraint") || err.to_string().contains("23505") {
        AppError::Conflict(format!("Username '{username}' is already taken"))
    } else {
        err.into()
    }
}

#[derive(sqlx::FromRow)]
struct ActorRow {
    id: i64,
    username: String,
    password_hash: String,
    role: String,
    is_active: bool,
    is_owner: bool,
    departments: Json<Vec<String>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActorRow> for Actor {
    type Error = AppError;

    fn try_from(row: ActorRow) -> Result<Self, Self::Error> {
        // An out-of-set role tag surfaces as a denial, never a panic.
        let role: Role = row.role.parse()?;
        Ok(Actor {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            role,
            is_active: row.is_active,
            is_owner: row.is_owner,
            departments: row.departments.0,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExamRow {
    id: i64,
    title: String,
    description: String,
    exam_type: String,
    department: String,
    created_by: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExamRow> for Exam {
    type Error = AppError;

    fn try_from(row: ExamRow) -> Result<Self, Self::Error> {
        Ok(Exam {
            id: row.id,
            title: row.title,
            description: row.description,
            exam_type: parse_exam_type(&row.exam_type)?,
            department: row.department,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    exam_id: i64,
    text: String,
    question_type: String,
    options: Json<Vec<String>>,
    correct_answer: Option<String>,
    points: i64,
    order_index: i64,
}

impl TryFrom<QuestionRow> for Question {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: row.id,
            exam_id: row.exam_id,
            text: row.text,
            question_type: parse_question_type(&row.question_type)?,
            options: row.options.0,
            correct_answer: row.correct_answer,
            points: row.points,
            order_index: row.order_index,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    exam_id: i64,
    candidate_id: i64,
    examiner_id: i64,
    status: String,
    access_token: String,
    answers: Json<HashMap<i64, String>>,
    score: Option<i64>,
    max_score: i64,
    percentage: Option<i64>,
    notes: Option<String>,
    started_at: DateTime<Utc>,
    written_submitted_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for ExamSession {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(ExamSession {
            id: row.id,
            exam_id: row.exam_id,
            candidate_id: row.candidate_id,
            examiner_id: row.examiner_id,
            status: parse_session_status(&row.status)?,
            access_token: row.access_token,
            answers: row.answers.0,
            score: row.score,
            max_score: row.max_score,
            percentage: row.percentage,
            notes: row.notes,
            started_at: row.started_at,
            written_submitted_at: row.written_submitted_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: i64,
    category: String,
    title: String,
    description: String,
    priority: String,
    requested_by: i64,
    assigned_to: Option<i64>,
    status: String,
    response: Option<String>,
    reviewed_by: Option<i64>,
    reviewed_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for Request {
    type Error = AppError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(Request {
            id: row.id,
            category: parse_category(&row.category)?,
            title: row.title,
            description: row.description,
            priority: parse_priority(&row.priority)?,
            requested_by: row.requested_by,
            assigned_to: row.assigned_to,
            status: parse_request_status(&row.status)?,
            response: row.response,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: i64,
    actor_id: i64,
    actor_username: String,
    action: String,
    details: String,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        AuditEntry {
            id: row.id,
            actor_id: row.actor_id,
            actor_username: row.actor_username,
            action: row.action,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

/// Opens a session inside the caller's transaction. Freezes `max_score`
/// from the current question set and picks the initial status from the
/// exam type. Shared by `create_session` and `decide_request`.
async fn insert_session(
    conn: &mut PgConnection,
    new: &NewSession,
) -> Result<ExamSession, AppError> {
    let exam_type = sqlx::query_scalar::<_, String>("SELECT exam_type FROM exams WHERE id = $1")
        .bind(new.exam_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))?;
    let exam_type = parse_exam_type(&exam_type)?;

    let candidate_active =
        sqlx::query_scalar::<_, bool>("SELECT is_active FROM actors WHERE id = $1")
            .bind(new.candidate_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Candidate not found".to_string()))?;
    if !candidate_active {
        return Err(AppError::BadRequest(
            "Candidate account is deactivated".to_string(),
        ));
    }

    let max_score = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(points), 0)::BIGINT FROM questions WHERE exam_id = $1",
    )
    .bind(new.exam_id)
    .fetch_one(&mut *conn)
    .await?;

    let status = if exam_type == ExamType::Written {
        SessionStatus::PendingWritten
    } else {
        SessionStatus::InProgress
    };

    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "INSERT INTO exam_sessions (exam_id, candidate_id, examiner_id, status, access_token, max_score)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(new.exam_id)
    .bind(new.candidate_id)
    .bind(new.examiner_id)
    .bind(status.as_str())
    .bind(generate_session_token())
    .bind(max_score)
    .fetch_one(&mut *conn)
    .await?;
    row.try_into()
}

#[async_trait]
impl Store for PgStore {
    async fn create_actor(&self, new: NewActor) -> Result<Actor, AppError> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM actors WHERE LOWER(username) = LOWER($1)",
        )
        .bind(&new.username)
        .fetch_optional(&self.pool)
        .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!(
                "Username '{}' is already taken",
                new.username
            )));
        }

        let row = sqlx::query_as::<_, ActorRow>(&format!(
            "INSERT INTO actors (username, password_hash, role, is_active, is_owner, departments)
             VALUES ($1, $2, $3, TRUE, $4, $5)
             RETURNING {ACTOR_COLUMNS}"
        ))
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .bind(new.is_owner)
        .bind(Json(&new.departments))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| username_conflict(e, &new.username))?;
        row.try_into()
    }

    async fn actor_by_id(&self, id: i64) -> Result<Option<Actor>, AppError> {
        let row = sqlx::query_as::<_, ActorRow>(&format!(
            "SELECT {ACTOR_COLUMNS} FROM actors WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Actor::try_from).transpose()
    }

    async fn actor_by_username(&self, username: &str) -> Result<Option<Actor>, AppError> {
        let row = sqlx::query_as::<_, ActorRow>(&format!(
            "SELECT {ACTOR_COLUMNS} FROM actors WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Actor::try_from).transpose()
    }

    async fn list_actors(&self) -> Result<Vec<Actor>, AppError> {
        let rows = sqlx::query_as::<_, ActorRow>(&format!(
            "SELECT {ACTOR_COLUMNS} FROM actors ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Actor::try_from).collect()
    }

    async fn update_actor_role(&self, id: i64, role: Role) -> Result<Actor, AppError> {
        let row = sqlx::query_as::<_, ActorRow>(&format!(
            "UPDATE actors SET role = $2 WHERE id = $1 RETURNING {ACTOR_COLUMNS}"
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Actor not found".to_string()))?;
        row.try_into()
    }

    async fn set_actor_active(&self, id: i64, is_active: bool) -> Result<Actor, AppError> {
        let row = sqlx::query_as::<_, ActorRow>(&format!(
            "UPDATE actors SET is_active = $2 WHERE id = $1 RETURNING {ACTOR_COLUMNS}"
        ))
        .bind(id)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Actor not found".to_string()))?;
        row.try_into()
    }

    async fn set_actor_departments(
        &self,
        id: i64,
        departments: Vec<String>,
    ) -> Result<Actor, AppError> {
        let row = sqlx::query_as::<_, ActorRow>(&format!(
            "UPDATE actors SET departments = $2 WHERE id = $1 RETURNING {ACTOR_COLUMNS}"
        ))
        .bind(id)
        .bind(Json(&departments))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Actor not found".to_string()))?;
        row.try_into()
    }

    async fn create_exam(&self, new: NewExam) -> Result<(Exam, Vec<Question>), AppError> {
        let mut tx = self.pool.begin().await?;

        let exam_row = sqlx::query_as::<_, ExamRow>(&format!(
            "INSERT INTO exams (title, description, exam_type, department, created_by)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {EXAM_COLUMNS}"
        ))
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.exam_type.as_str())
        .bind(&new.department)
        .bind(new.created_by)
        .fetch_one(&mut *tx)
        .await?;

        let mut questions = Vec::with_capacity(new.questions.len());
        for (index, q) in new.questions.into_iter().enumerate() {
            let row = sqlx::query_as::<_, QuestionRow>(&format!(
                "INSERT INTO questions (exam_id, text, question_type, options, correct_answer, points, order_index)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 RETURNING {QUESTION_COLUMNS}"
            ))
            .bind(exam_row.id)
            .bind(&q.text)
            .bind(q.question_type.as_str())
            .bind(Json(&q.options))
            .bind(&q.correct_answer)
            .bind(q.points)
            .bind(index as i64)
            .fetch_one(&mut *tx)
            .await?;
            questions.push(Question::try_from(row)?);
        }

        tx.commit().await?;
        Ok((exam_row.try_into()?, questions))
    }

    async fn exam_by_id(&self, id: i64) -> Result<Option<Exam>, AppError> {
        let row = sqlx::query_as::<_, ExamRow>(&format!(
            "SELECT {EXAM_COLUMNS} FROM exams WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Exam::try_from).transpose()
    }

    async fn exam_with_questions(
        &self,
        id: i64,
    ) -> Result<Option<(Exam, Vec<Question>)>, AppError> {
        let Some(exam) = self.exam_by_id(id).await? else {
            return Ok(None);
        };
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE exam_id = $1 ORDER BY order_index"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        let questions = rows
            .into_iter()
            .map(Question::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some((exam, questions)))
    }

    async fn list_exams(&self, department: Option<&str>) -> Result<Vec<Exam>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EXAM_COLUMNS} FROM exams WHERE 1 = 1"
        ));
        if let Some(department) = department {
            qb.push(" AND department = ").push_bind(department);
        }
        qb.push(" ORDER BY id DESC");
        let rows: Vec<ExamRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Exam::try_from).collect()
    }

    async fn delete_exam(&self, id: i64) -> Result<bool, AppError> {
        // Questions go with the exam (FK cascade); sessions stay behind.
        let result = sqlx::query("DELETE FROM exams WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_session(&self, new: NewSession) -> Result<ExamSession, AppError> {
        let mut tx = self.pool.begin().await?;
        let session = insert_session(&mut tx, &new).await?;
        tx.commit().await?;
        Ok(session)
    }

    async fn session_by_id(&self, id: i64) -> Result<Option<ExamSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM exam_sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ExamSession::try_from).transpose()
    }

    async fn session_by_token(&self, token: &str) -> Result<Option<ExamSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM exam_sessions WHERE access_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ExamSession::try_from).transpose()
    }

    async fn list_sessions(&self, filter: SessionFilter) -> Result<Vec<ExamSession>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {SESSION_COLUMNS} FROM exam_sessions WHERE 1 = 1"
        ));
        if let Some(exam_id) = filter.exam_id {
            qb.push(" AND exam_id = ").push_bind(exam_id);
        }
        if let Some(candidate_id) = filter.candidate_id {
            qb.push(" AND candidate_id = ").push_bind(candidate_id);
        }
        if let Some(examiner_id) = filter.examiner_id {
            qb.push(" AND examiner_id = ").push_bind(examiner_id);
        }
        qb.push(" ORDER BY id DESC");
        let rows: Vec<SessionRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(ExamSession::try_from).collect()
    }

    async fn patch_answer(
        &self,
        session_id: i64,
        question_id: i64,
        answer: &str,
        allowed: &[SessionStatus],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let Some((status, exam_id)) = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, exam_id FROM exam_sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Err(AppError::NotFound("Session not found".to_string()));
        };
        let status = parse_session_status(&status)?;
        if !allowed.contains(&status) {
            return Err(status_conflict(status));
        }

        let belongs = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM questions WHERE id = $1 AND exam_id = $2)",
        )
        .bind(question_id)
        .bind(exam_id)
        .fetch_one(&mut *tx)
        .await?;
        if !belongs {
            return Err(AppError::BadRequest(
                "Question does not belong to this exam".to_string(),
            ));
        }

        sqlx::query(
            "UPDATE exam_sessions
             SET answers = jsonb_set(answers, ARRAY[$2::TEXT], to_jsonb($3::TEXT))
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(question_id.to_string())
        .bind(answer)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn submit_written(&self, session_id: i64) -> Result<ExamSession, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "UPDATE exam_sessions
             SET status = $2, written_submitted_at = NOW()
             WHERE id = $1 AND status = $3
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id)
        .bind(SessionStatus::WrittenSubmitted.as_str())
        .bind(SessionStatus::PendingWritten.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(status_conflict(self.session_status(session_id).await?)),
        }
    }

    async fn finalize_session(
        &self,
        session_id: i64,
        score: i64,
        percentage: i64,
        status: SessionStatus,
        notes: Option<String>,
    ) -> Result<ExamSession, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "UPDATE exam_sessions
             SET status = $2, score = $3, percentage = $4, notes = COALESCE($5, notes), completed_at = NOW()
             WHERE id = $1 AND status IN ('in_progress', 'written_submitted')
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id)
        .bind(status.as_str())
        .bind(score)
        .bind(percentage)
        .bind(&notes)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(status_conflict(self.session_status(session_id).await?)),
        }
    }

    async fn create_request(&self, new: NewRequest) -> Result<Request, AppError> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "INSERT INTO requests (category, title, description, priority, requested_by, assigned_to, status, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(new.category.as_str())
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.priority.as_str())
        .bind(new.requested_by)
        .bind(new.assigned_to)
        .bind(RequestStatus::Pending.as_str())
        .bind(&new.metadata)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn request_by_id(&self, id: i64) -> Result<Option<Request>, AppError> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Request::try_from).transpose()
    }

    async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<Request>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {REQUEST_COLUMNS} FROM requests WHERE 1 = 1"
        ));
        if let Some(requested_by) = filter.requested_by {
            qb.push(" AND requested_by = ").push_bind(requested_by);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY id DESC");
        let rows: Vec<RequestRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Request::try_from).collect()
    }

    async fn mark_request_review(&self, id: i64, reviewer_id: i64) -> Result<Request, AppError> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "UPDATE requests
             SET status = $2, reviewed_by = $3, reviewed_at = NOW()
             WHERE id = $1 AND status = $4
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(id)
        .bind(RequestStatus::Review.as_str())
        .bind(reviewer_id)
        .bind(RequestStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            return row.try_into();
        }

        let status = sqlx::query_scalar::<_, String>("SELECT status FROM requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;
        match parse_request_status(&status)? {
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
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_scalar::<_, String>(
            "SELECT status FROM requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;
        if parse_request_status(&current)?.is_terminal() {
            return Err(AppError::Conflict(
                "Request has already been decided".to_string(),
            ));
        }

        // A failed spawn aborts the whole transaction, leaving the request
        // in its previous status.
        let session = match &spawn {
            Some(new) => Some(insert_session(&mut tx, new).await?),
            None => None,
        };

        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "UPDATE requests
             SET status = $2, response = $3, reviewed_by = $4, reviewed_at = NOW()
             WHERE id = $1
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(&response)
        .bind(reviewer_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((row.try_into()?, session))
    }

    async fn record_audit(&self, entry: NewAuditEntry) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO audit_log (actor_id, actor_username, action, details)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(entry.actor_id)
        .bind(&entry.actor_username)
        .bind(&entry.action)
        .bind(&entry.details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_audit(&self, limit: i64) -> Result<Vec<AuditEntry>, AppError> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY id DESC LIMIT $1"
        ))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }

    async fn delete_audit(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM audit_log WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
