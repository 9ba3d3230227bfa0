// src/handlers/requests.rs

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
    models::request::{
        DecideRequestRequest, RequestCategory, RequestStatus, SubmitRequestRequest,
    },
    notify::StaffEvent,
    policy,
    state::AppState,
    store::{NewRequest, NewSession, RequestFilter},
    utils::html::clean_html,
};

#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<RequestStatus>,
    pub requested_by: Option<i64>,
}

/// Submits a request into the workflow.
///
/// Subject-bearing categories (promotion, demotion, exam authorization)
/// must name the actor they act on; exam authorizations must also carry
/// `metadata.exam_id` so an approval can spawn the session.
pub async fn submit_request(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<SubmitRequestRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.category.requires_subject() && payload.assigned_to.is_none() {
        return Err(AppError::BadRequest(format!(
            "{} requests must name the actor they concern",
            payload.category.as_str()
        )));
    }
    if let Some(assigned_to) = payload.assigned_to {
        if state.store.actor_by_id(assigned_to).await?.is_none() {
            return Err(AppError::BadRequest(
                "Assigned actor does not exist".to_string(),
            ));
        }
    }
    if payload.category == RequestCategory::ExamAuthorization
        && payload
            .metadata
            .get("exam_id")
            .and_then(|v| v.as_i64())
            .is_none()
    {
        return Err(AppError::BadRequest(
            "Exam authorization requests need metadata.exam_id".to_string(),
        ));
    }

    let request = state
        .store
        .create_request(NewRequest {
            category: payload.category,
            title: payload.title,
            description: clean_html(&payload.description),
            priority: payload.priority,
            requested_by: actor.id,
            assigned_to: payload.assigned_to,
            metadata: payload.metadata,
        })
        .await?;

    state
        .notifier
        .send(StaffEvent::RequestSubmitted {
            title: request.title.clone(),
            category: request.category,
            requester: actor.username.clone(),
        })
        .await;

    Ok((StatusCode::CREATED, Json(request)))
}

/// Lists requests. Senior staff browse everything with optional filters;
/// everyone else sees only their own submissions.
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<RequestListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let requested_by = if actor.role.is_senior_or_above() {
        query.requested_by
    } else {
        Some(actor.id)
    };
    let requests = state
        .store
        .list_requests(RequestFilter {
            requested_by,
            status: query.status,
        })
        .await?;
    Ok(Json(requests))
}

pub async fn get_request(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let request = state
        .store
        .request_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;

    if request.requested_by != actor.id && !actor.role.is_senior_or_above() {
        return Err(AppError::Forbidden(
            "You cannot view this request".to_string(),
        ));
    }

    Ok(Json(request))
}

/// Marks a pending request as picked up by a reviewer. One-way: a request
/// under review never returns to pending, a decision is the only exit.
pub async fn review_request(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let request = state
        .store
        .request_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;

    if !policy::can_review_request(&actor, &request) {
        return Err(AppError::Forbidden(
            "You cannot review this request".to_string(),
        ));
    }

    let updated = state.store.mark_request_review(id, actor.id).await?;
    Ok(Json(updated))
}

/// Decides a request.
///
/// Approving an exam authorization also opens the exam session (examiner =
/// requester, candidate = subject) in the same transaction; if the spawn
/// fails, the decision is not persisted either.
pub async fn decide_request(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(payload): Json<DecideRequestRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let request = state
        .store
        .request_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;

    if !policy::can_review_request(&actor, &request) {
        return Err(AppError::Forbidden(
            "You cannot decide this request".to_string(),
        ));
    }

    let status = payload.outcome.as_status();
    let spawn = if status == RequestStatus::Approved
        && request.category == RequestCategory::ExamAuthorization
    {
        let exam_id = request.exam_id().ok_or_else(|| {
            AppError::BadRequest("Request has no exam_id in its metadata".to_string())
        })?;
        let candidate_id = request.assigned_to.ok_or_else(|| {
            AppError::BadRequest("Request has no assigned candidate".to_string())
        })?;
        Some(NewSession {
            exam_id,
            candidate_id,
            examiner_id: request.requested_by,
        })
    } else {
        None
    };

    let response = payload.response.map(|r| clean_html(&r));
    let (decided, session) = state
        .store
        .decide_request(id, actor.id, status, response, spawn)
        .await?;

    state
        .notifier
        .send(StaffEvent::RequestDecided {
            title: decided.title.clone(),
            approved: status == RequestStatus::Approved,
            reviewer: actor.username.clone(),
        })
        .await;

    record_audit(
        &state,
        &actor,
        "request.decided",
        format!("'{}': {}", decided.title, decided.status.as_str()),
    )
    .await;

    Ok(Json(json!({ "request": decided, "session": session })))
}
