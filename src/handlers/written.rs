// src/handlers/written.rs
//
// Candidate side of written exams. No JWT here: the access token in the
// path is the whole credential, which is why these routes sit behind the
// rate limiter and why answer keys never appear in any response.

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::exam::PublicQuestion,
    models::session::{AnswerPatchRequest, ExamSession, SessionStatus, WrittenSessionView},
    state::AppState,
};

async fn session_by_token(state: &AppState, token: &str) -> Result<ExamSession, AppError> {
    state
        .store
        .session_by_token(token)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid access token".to_string()))
}

/// Candidate view of a written session.
///
/// While the session still accepts answers the questions are included
/// (without answer keys). After submission only the submitted state comes
/// back, questions omitted.
pub async fn get_written_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = session_by_token(&state, &token).await?;

    let (exam_title, exam_description, questions) =
        match state.store.exam_with_questions(session.exam_id).await? {
            Some((exam, questions)) => (exam.title, exam.description, Some(questions)),
            None => ("Exam no longer available".to_string(), String::new(), None),
        };

    let questions = if session.status == SessionStatus::PendingWritten {
        questions.map(|qs| qs.iter().map(PublicQuestion::from).collect())
    } else {
        None
    };

    Ok(Json(WrittenSessionView {
        status: session.status,
        exam_title,
        exam_description,
        max_score: session.max_score,
        questions,
        answers: session.answers,
        written_submitted_at: session.written_submitted_at,
    }))
}

/// Stores one answer, last write wins per question. Only accepted while
/// the session is pending_written.
pub async fn put_written_answer(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<AnswerPatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let session = session_by_token(&state, &token).await?;
    state
        .store
        .patch_answer(
            session.id,
            payload.question_id,
            &payload.answer,
            &[SessionStatus::PendingWritten],
        )
        .await?;

    Ok(Json(json!({ "message": "Answer saved" })))
}

/// Turns in the written answers. Unanswered questions are allowed; the
/// submission is final either way and repeats get a conflict.
pub async fn submit_written(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = session_by_token(&state, &token).await?;
    let submitted = state.store.submit_written(session.id).await?;

    Ok(Json(json!({
        "message": "Answers submitted",
        "submitted_at": submitted.written_submitted_at,
    })))
}
