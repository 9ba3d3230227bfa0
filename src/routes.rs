// src/routes.rs

use std::sync::Arc;

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, patch, post, put},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{actors, audit, auth, exams, requests, sessions, written},
    state::AppState,
    utils::jwt::{auth_middleware, staff_middleware},
};

/// Assembles the main application router.
///
/// * Written (token) routes are public but rate limited.
/// * Everything else requires authentication; actor administration and the
///   moderation log additionally sit behind the staff gate.
/// * Global middleware (Trace, CORS) wraps the lot.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    // Brake on token guessing. Generous enough to never bite a legitimate
    // candidate saving answers.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(5)
            .burst_size(20)
            .finish()
            .expect("invalid governor configuration"),
    );

    let auth_routes = Router::new().route("/login", post(auth::login)).merge(
        Router::new()
            .route("/me", get(auth::me))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
    );

    let actor_routes = Router::new()
        .route("/", get(actors::list_actors).post(actors::create_actor))
        .route("/{id}/role", patch(actors::update_role))
        .route("/{id}/active", patch(actors::update_active))
        .route("/{id}/departments", patch(actors::update_departments))
        // Double middleware protection: Auth first, then staff check
        .layer(middleware::from_fn(staff_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let exam_routes = Router::new()
        .route("/", get(exams::list_exams).post(exams::create_exam))
        .route("/{id}", get(exams::get_exam).delete(exams::delete_exam))
        .route("/{id}/sessions", post(sessions::start_session))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let session_routes = Router::new()
        .route("/", get(sessions::list_sessions))
        .route("/{id}", get(sessions::get_session))
        .route("/{id}/token", get(sessions::get_session_token))
        .route("/{id}/answers", patch(sessions::patch_answer))
        .route("/{id}/finalize", post(sessions::finalize_session))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let request_routes = Router::new()
        .route(
            "/",
            get(requests::list_requests).post(requests::submit_request),
        )
        .route("/{id}", get(requests::get_request))
        .route("/{id}/review", post(requests::review_request))
        .route("/{id}/decide", post(requests::decide_request))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let written_routes = Router::new()
        .route("/{token}", get(written::get_written_session))
        .route("/{token}/answers", put(written::put_written_answer))
        .route("/{token}/submit", post(written::submit_written))
        .layer(GovernorLayer::new(governor_conf));

    let audit_routes = Router::new()
        .route("/", get(audit::list_audit))
        .route("/{id}", delete(audit::delete_audit))
        .layer(middleware::from_fn(staff_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/actors", actor_routes)
        .nest("/api/exams", exam_routes)
        .nest("/api/sessions", session_routes)
        .nest("/api/requests", request_routes)
        .nest("/api/written", written_routes)
        .nest("/api/audit", audit_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
