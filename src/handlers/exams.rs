// src/handlers/exams.rs

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
    error::AppError,
    handlers::record_audit,
    models::actor::Actor,
    models::exam::CreateExamRequest,
    policy,
    state::AppState,
    store::NewExam,
    utils::html::clean_html,
};

#[derive(Debug, Deserialize)]
pub struct ExamListQuery {
    pub department: Option<String>,
}

/// Creates an exam together with its ordered questions, atomically.
///
/// Question order in the payload is the order candidates will see. The
/// description may be rendered later and is sanitized on write; option and
/// answer strings are stored verbatim because scoring compares them exactly.
pub async fn create_exam(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    for question in &payload.questions {
        question.check()?;
    }

    if !policy::can_create_exam(&actor, &payload.department) {
        return Err(AppError::Forbidden(
            "You cannot create exams for this department".to_string(),
        ));
    }

    let (exam, questions) = state
        .store
        .create_exam(NewExam {
            title: payload.title,
            description: clean_html(&payload.description),
            exam_type: payload.exam_type,
            department: payload.department,
            created_by: actor.id,
            questions: payload.questions,
        })
        .await?;

    record_audit(
        &state,
        &actor,
        "exam.created",
        format!("'{}' ({}, {})", exam.title, exam.exam_type.as_str(), exam.department),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "exam": exam, "questions": questions })),
    ))
}

/// Lists exam metadata, optionally filtered by department. Questions (and
/// with them the answer keys) are not included here.
pub async fn list_exams(
    State(state): State<AppState>,
    Query(query): Query<ExamListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let exams = state.store.list_exams(query.department.as_deref()).await?;
    Ok(Json(exams))
}

/// Returns an exam with its full question list, answer keys included.
/// Gated on exam management since this is the examiner's view.
pub async fn get_exam(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (exam, questions) = state
        .store
        .exam_with_questions(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))?;

    if !policy::can_manage_exam(&actor, &exam.department) {
        return Err(AppError::Forbidden(
            "You cannot manage exams for this department".to_string(),
        ));
    }

    Ok(Json(json!({ "exam": exam, "questions": questions })))
}

/// Deletes an exam definition and its questions. Existing sessions keep
/// their frozen max_score and stay readable.
pub async fn delete_exam(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = state
        .store
        .exam_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))?;

    if !policy::can_manage_exam(&actor, &exam.department) {
        return Err(AppError::Forbidden(
            "You cannot manage exams for this department".to_string(),
        ));
    }

    state.store.delete_exam(id).await?;

    record_audit(&state, &actor, "exam.deleted", format!("'{}'", exam.title)).await;

    Ok(Json(json!({ "message": "Exam deleted successfully" })))
}
