// src/handlers/sessions.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    config::PASS_THRESHOLD_PERCENT,
    error::AppError,
    handlers::record_audit,
    models::actor::Actor,
    models::exam::{Question, QuestionType},
    models::session::{
        AnswerPatchRequest, FinalizeSessionRequest, SessionStatus, StartSessionRequest,
    },
    notify::StaffEvent,
    policy,
    state::AppState,
    store::{NewSession, SessionFilter, status_conflict},
    utils::html::clean_html,
};

/// Statuses in which the examiner may still record answers. Everything
/// non-terminal: the examiner owns the session until it is finalized.
const EXAMINER_WRITABLE: [SessionStatus; 3] = [
    SessionStatus::InProgress,
    SessionStatus::PendingWritten,
    SessionStatus::WrittenSubmitted,
];

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub exam_id: Option<i64>,
    pub candidate_id: Option<i64>,
    pub examiner_id: Option<i64>,
}

/// Opens a session for a candidate on an exam the caller manages.
///
/// Written exams start at pending_written and are driven by the candidate
/// through the access token; every other type runs under the examiner.
/// The token is returned once here so the examiner can hand it out.
pub async fn start_session(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(exam_id): Path<i64>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exam = state
        .store
        .exam_by_id(exam_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))?;

    if !policy::can_manage_exam(&actor, &exam.department) {
        return Err(AppError::Forbidden(
            "You cannot run exams for this department".to_string(),
        ));
    }

    let session = state
        .store
        .create_session(NewSession {
            exam_id,
            candidate_id: payload.candidate_id,
            examiner_id: actor.id,
        })
        .await?;

    record_audit(
        &state,
        &actor,
        "session.started",
        format!(
            "session {} on '{}' for actor {}",
            session.id, exam.title, session.candidate_id
        ),
    )
    .await;

    let access_token = session.access_token.clone();
    Ok((
        StatusCode::CREATED,
        Json(json!({ "session": session, "access_token": access_token })),
    ))
}

/// Lists sessions. Senior staff see everything (with optional filters);
/// everyone else only the sessions they examine.
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<SessionListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let examiner_id = if actor.role.is_senior_or_above() {
        query.examiner_id
    } else {
        Some(actor.id)
    };
    let sessions = state
        .store
        .list_sessions(SessionFilter {
            exam_id: query.exam_id,
            candidate_id: query.candidate_id,
            examiner_id,
        })
        .await?;
    Ok(Json(sessions))
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .store
        .session_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    let involved = actor.id == session.examiner_id || actor.id == session.candidate_id;
    if !involved && !actor.role.is_senior_or_above() {
        return Err(AppError::Forbidden(
            "You are not involved in this session".to_string(),
        ));
    }

    Ok(Json(session))
}

/// Hands the examiner the candidate access token for the written sub-flow.
/// The token is deliberately absent from every serialized session.
pub async fn get_session_token(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .store
        .session_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    if actor.id != session.examiner_id {
        return Err(AppError::Forbidden(
            "Only the examiner may fetch the access token".to_string(),
        ));
    }

    Ok(Json(json!({ "access_token": session.access_token })))
}

/// Records one answer on the session (oral and practical exams, or
/// corrections while reviewing a submission). One question per call, so
/// concurrent writes to different questions both survive.
pub async fn patch_answer(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(payload): Json<AnswerPatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let session = state
        .store
        .session_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    if actor.id != session.examiner_id {
        return Err(AppError::Forbidden(
            "Only the examiner may record answers".to_string(),
        ));
    }

    state
        .store
        .patch_answer(id, payload.question_id, &payload.answer, &EXAMINER_WRITABLE)
        .await?;

    Ok(Json(json!({ "message": "Answer saved" })))
}

/// Finalizes a session: scores it, derives the verdict and closes it.
///
/// Allowed from in_progress or written_submitted; a pending written exam
/// has to be submitted by the candidate first. The stored result never
/// changes afterwards, a second finalize gets a conflict.
pub async fn finalize_session(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(payload): Json<FinalizeSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let session = state
        .store
        .session_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    if actor.id != session.examiner_id {
        return Err(AppError::Forbidden(
            "Only the examiner may finalize this session".to_string(),
        ));
    }
    if !session.status.can_finalize() {
        return Err(status_conflict(session.status));
    }
    // Guard the division. A session on a zero-point exam cannot produce a
    // percentage, so it cannot be finalized at all.
    if session.max_score == 0 {
        return Err(AppError::UnprocessableConfig(
            "Exam has no scoreable points".to_string(),
        ));
    }

    let questions = state
        .store
        .exam_with_questions(session.exam_id)
        .await?
        .map(|(_, questions)| questions)
        .unwrap_or_default();

    let score = calculate_score(&questions, &session.answers, &payload.overrides)?;
    let percentage = percentage_of(score, session.max_score);
    let status = if percentage >= PASS_THRESHOLD_PERCENT {
        SessionStatus::Passed
    } else {
        SessionStatus::Failed
    };
    let notes = payload.notes.map(|n| clean_html(&n));

    let finalized = state
        .store
        .finalize_session(id, score, percentage, status, notes)
        .await?;

    let candidate = state
        .store
        .actor_by_id(finalized.candidate_id)
        .await?
        .map(|a| a.username)
        .unwrap_or_else(|| format!("actor {}", finalized.candidate_id));
    let exam_title = state
        .store
        .exam_by_id(finalized.exam_id)
        .await?
        .map(|e| e.title)
        .unwrap_or_else(|| format!("exam {}", finalized.exam_id));

    state
        .notifier
        .send(StaffEvent::SessionCompleted {
            candidate: candidate.clone(),
            exam: exam_title,
            percentage,
            passed: status == SessionStatus::Passed,
        })
        .await;

    record_audit(
        &state,
        &actor,
        "session.finalized",
        format!(
            "session {}: {} scored {}% ({})",
            finalized.id,
            candidate,
            percentage,
            finalized.status.as_str()
        ),
    )
    .await;

    Ok(Json(finalized))
}

/// Computes the final score from stored answers plus examiner overrides.
///
/// Multiple-choice questions earn their full points on an exact string
/// match with the designated answer, otherwise zero. Every other type
/// scores only through an override. Overrides must reference real,
/// non-multiple-choice questions and stay within 0..=points.
fn calculate_score(
    questions: &[Question],
    answers: &HashMap<i64, String>,
    overrides: &HashMap<i64, i64>,
) -> Result<i64, AppError> {
    for (question_id, value) in overrides {
        let Some(question) = questions.iter().find(|q| q.id == *question_id) else {
            return Err(AppError::BadRequest(format!(
                "Override references unknown question {question_id}"
            )));
        };
        if question.question_type == QuestionType::MultipleChoice {
            return Err(AppError::BadRequest(format!(
                "Question {question_id} is auto-scored and cannot be overridden"
            )));
        }
        if *value < 0 || *value > question.points {
            return Err(AppError::BadRequest(format!(
                "Override for question {question_id} must be between 0 and {}",
                question.points
            )));
        }
    }

    let mut score = 0;
    for question in questions {
        match question.question_type {
            QuestionType::MultipleChoice => {
                if let (Some(answer), Some(correct)) =
                    (answers.get(&question.id), question.correct_answer.as_ref())
                {
                    if answer == correct {
                        score += question.points;
                    }
                }
            }
            _ => {
                score += overrides.get(&question.id).copied().unwrap_or(0);
            }
        }
    }
    Ok(score)
}

fn percentage_of(score: i64, max_score: i64) -> i64 {
    ((score as f64 / max_score as f64) * 100.0).round() as i64
}
