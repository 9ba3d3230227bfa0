// tests/request_flow_tests.rs
//
// The request workflow: submission rules, per-category reviewer levels,
// the one-way review marker, and exam authorizations spawning sessions.

use std::net::SocketAddr;
use std::sync::Arc;

use staff_portal::{
    config::Config,
    notify::NullNotifier,
    roles::Role,
    routes,
    state::AppState,
    store::{MemStore, NewActor, Store},
    utils::hash::hash_password,
};

const OWNER_USERNAME: &str = "portal_owner";
const OWNER_PASSWORD: &str = "owner-password-123";

async fn spawn_app() -> String {
    let store = Arc::new(MemStore::new());
    store
        .create_actor(NewActor {
            username: OWNER_USERNAME.to_string(),
            password_hash: hash_password(OWNER_PASSWORD).unwrap(),
            role: Role::TopManagement,
            departments: vec![],
            is_owner: true,
        })
        .await
        .unwrap();

    let config = Config {
        database_url: "unused-in-tests".to_string(),
        jwt_secret: "request_flow_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        owner_username: None,
        owner_password: None,
        webhook_url: None,
    };

    let state = AppState {
        store: store.clone(),
        notifier: Arc::new(NullNotifier),
        config,
    };
    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    address
}

async fn login(client: &reqwest::Client, address: &str, username: &str, password: &str) -> String {
    let body: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["token"].as_str().expect("Token not found").to_string()
}

/// Creates an actor (password "password123") and returns (id, username).
async fn create_actor(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    role: &str,
    departments: &[&str],
) -> (i64, String) {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let response = client
        .post(format!("{}/api/actors", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "username": username,
            "password": "password123",
            "role": role,
            "departments": departments,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    (body["id"].as_i64().unwrap(), username)
}

/// Submits a request and returns its body. Asserts creation succeeded.
async fn submit_request(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    payload: serde_json::Value,
) -> serde_json::Value {
    let response = client
        .post(format!("{}/api/requests", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    response.json().await.unwrap()
}

#[tokio::test]
async fn submission_rules_are_enforced() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (subject_id, _) = create_actor(&client, &address, &owner_token, "supporter", &[]).await;
    let (_, requester) = create_actor(&client, &address, &owner_token, "moderator", &[]).await;
    let token = login(&client, &address, &requester, "password123").await;

    // Promotion without a subject
    let no_subject = client
        .post(format!("{}/api/requests", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "category": "promotion",
            "title": "Promote someone",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(no_subject.status().as_u16(), 400);

    // Subject that does not exist
    let ghost_subject = client
        .post(format!("{}/api/requests", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "category": "promotion",
            "title": "Promote a ghost",
            "assigned_to": 999999,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(ghost_subject.status().as_u16(), 400);

    // Exam authorization without an exam link
    let no_exam = client
        .post(format!("{}/api/requests", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "category": "exam_authorization",
            "title": "Examine this candidate",
            "assigned_to": subject_id,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(no_exam.status().as_u16(), 400);

    // An absence needs neither; priority defaults to normal
    let body = submit_request(
        &client,
        &address,
        &token,
        serde_json::json!({
            "category": "absence",
            "title": "Away next week",
            "description": "Family visit.",
        }),
    )
    .await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["priority"], "normal");
    assert!(body["assigned_to"].is_null());
}

#[tokio::test]
async fn reviewer_level_depends_on_the_category() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (subject_id, _) = create_actor(&client, &address, &owner_token, "supporter", &[]).await;
    let (_, requester) = create_actor(&client, &address, &owner_token, "moderator", &[]).await;
    let (_, senior) =
        create_actor(&client, &address, &owner_token, "senior_moderator", &[]).await;
    let (_, manager) = create_actor(&client, &address, &owner_token, "management", &[]).await;

    let requester_token = login(&client, &address, &requester, "password123").await;
    let absence = submit_request(
        &client,
        &address,
        &requester_token,
        serde_json::json!({ "category": "absence", "title": "Out sick" }),
    )
    .await;
    let promotion = submit_request(
        &client,
        &address,
        &requester_token,
        serde_json::json!({
            "category": "promotion",
            "title": "Promote a supporter",
            "assigned_to": subject_id,
        }),
    )
    .await;

    // Senior moderators handle day-to-day categories
    let senior_token = login(&client, &address, &senior, "password123").await;
    let absence_decided = client
        .post(format!(
            "{}/api/requests/{}/decide",
            address,
            absence["id"].as_i64().unwrap()
        ))
        .header("Authorization", format!("Bearer {}", senior_token))
        .json(&serde_json::json!({ "outcome": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(absence_decided.status().as_u16(), 200);
    let body: serde_json::Value = absence_decided.json().await.unwrap();
    assert_eq!(body["request"]["status"], "approved");

    // Personnel decisions are out of their reach
    let promotion_id = promotion["id"].as_i64().unwrap();
    let denied = client
        .post(format!("{}/api/requests/{}/decide", address, promotion_id))
        .header("Authorization", format!("Bearer {}", senior_token))
        .json(&serde_json::json!({ "outcome": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status().as_u16(), 403);

    // Management clears the bar
    let manager_token = login(&client, &address, &manager, "password123").await;
    let decided = client
        .post(format!("{}/api/requests/{}/decide", address, promotion_id))
        .header("Authorization", format!("Bearer {}", manager_token))
        .json(&serde_json::json!({ "outcome": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(decided.status().as_u16(), 200);
}

#[tokio::test]
async fn nobody_reviews_their_own_request() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    // Management outranks every category threshold, so only self-review
    // can be the reason for a denial here.
    let (_, manager) = create_actor(&client, &address, &owner_token, "management", &[]).await;
    let token = login(&client, &address, &manager, "password123").await;

    let request = submit_request(
        &client,
        &address,
        &token,
        serde_json::json!({ "category": "rule_change", "title": "Rewrite rule 7" }),
    )
    .await;
    let request_id = request["id"].as_i64().unwrap();

    for path in ["review", "decide"] {
        let response = client
            .post(format!("{}/api/requests/{}/{}", address, request_id, path))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({ "outcome": "approved" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 403, "self-review must be denied");
    }
}

#[tokio::test]
async fn the_review_marker_is_one_way() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (_, requester) = create_actor(&client, &address, &owner_token, "moderator", &[]).await;
    let (reviewer_id, reviewer) =
        create_actor(&client, &address, &owner_token, "senior_moderator", &[]).await;

    let requester_token = login(&client, &address, &requester, "password123").await;
    let request = submit_request(
        &client,
        &address,
        &requester_token,
        serde_json::json!({ "category": "other", "title": "New channel idea" }),
    )
    .await;
    let request_id = request["id"].as_i64().unwrap();

    // Pick it up
    let reviewer_token = login(&client, &address, &reviewer, "password123").await;
    let marked = client
        .post(format!("{}/api/requests/{}/review", address, request_id))
        .header("Authorization", format!("Bearer {}", reviewer_token))
        .send()
        .await
        .unwrap();
    assert_eq!(marked.status().as_u16(), 200);
    let body: serde_json::Value = marked.json().await.unwrap();
    assert_eq!(body["status"], "review");
    assert_eq!(body["reviewed_by"], reviewer_id);

    // Picking it up twice conflicts
    let again = client
        .post(format!("{}/api/requests/{}/review", address, request_id))
        .header("Authorization", format!("Bearer {}", reviewer_token))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status().as_u16(), 409);

    // Deciding is the only exit
    let decided = client
        .post(format!("{}/api/requests/{}/decide", address, request_id))
        .header("Authorization", format!("Bearer {}", reviewer_token))
        .json(&serde_json::json!({ "outcome": "rejected", "response": "Not this quarter." }))
        .send()
        .await
        .unwrap();
    assert_eq!(decided.status().as_u16(), 200);

    // Decided requests accept neither a new review nor a second decision
    let late_review = client
        .post(format!("{}/api/requests/{}/review", address, request_id))
        .header("Authorization", format!("Bearer {}", reviewer_token))
        .send()
        .await
        .unwrap();
    assert_eq!(late_review.status().as_u16(), 403);

    let late_decide = client
        .post(format!("{}/api/requests/{}/decide", address, request_id))
        .header("Authorization", format!("Bearer {}", reviewer_token))
        .json(&serde_json::json!({ "outcome": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(late_decide.status().as_u16(), 403);
}

#[tokio::test]
async fn approving_an_exam_authorization_spawns_the_session() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (_, manager) =
        create_actor(&client, &address, &owner_token, "management", &["moderation"]).await;
    let (candidate_id, _) =
        create_actor(&client, &address, &owner_token, "supporter", &[]).await;
    let (requester_id, requester) =
        create_actor(&client, &address, &owner_token, "moderator", &[]).await;
    let (_, senior) =
        create_actor(&client, &address, &owner_token, "senior_moderator", &[]).await;

    // A written exam to authorize against
    let manager_token = login(&client, &address, &manager, "password123").await;
    let exam: serde_json::Value = client
        .post(format!("{}/api/exams", address))
        .header("Authorization", format!("Bearer {}", manager_token))
        .json(&serde_json::json!({
            "title": "Trial moderator entry",
            "exam_type": "written",
            "department": "moderation",
            "questions": [{
                "text": "Mute or warn first?",
                "question_type": "multiple_choice",
                "options": ["Mute", "Warn"],
                "correct_answer": "Warn",
                "points": 1,
            }],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let exam_id = exam["exam"]["id"].as_i64().unwrap();

    // A moderator below senior level asks for permission to examine
    let requester_token = login(&client, &address, &requester, "password123").await;
    let request = submit_request(
        &client,
        &address,
        &requester_token,
        serde_json::json!({
            "category": "exam_authorization",
            "title": "Let me run the entry exam",
            "assigned_to": candidate_id,
            "metadata": { "exam_id": exam_id },
        }),
    )
    .await;
    assert_eq!(request["metadata"]["exam_id"], exam_id);

    // Approval opens the session: candidate = subject, examiner = requester
    let senior_token = login(&client, &address, &senior, "password123").await;
    let decided: serde_json::Value = client
        .post(format!(
            "{}/api/requests/{}/decide",
            address,
            request["id"].as_i64().unwrap()
        ))
        .header("Authorization", format!("Bearer {}", senior_token))
        .json(&serde_json::json!({ "outcome": "approved", "response": "Go ahead." }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(decided["request"]["status"], "approved");
    let session = &decided["session"];
    assert_eq!(session["candidate_id"], candidate_id);
    assert_eq!(session["examiner_id"], requester_id);
    assert_eq!(session["status"], "pending_written");
    assert_eq!(session["max_score"], 1);

    // The requester now owns the session and can hand out the token
    let session_id = session["id"].as_i64().unwrap();
    let own_sessions: Vec<serde_json::Value> = client
        .get(format!("{}/api/sessions", address))
        .header("Authorization", format!("Bearer {}", requester_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(own_sessions.len(), 1);

    let token_response = client
        .get(format!("{}/api/sessions/{}/token", address, session_id))
        .header("Authorization", format!("Bearer {}", requester_token))
        .send()
        .await
        .unwrap();
    assert_eq!(token_response.status().as_u16(), 200);
}

#[tokio::test]
async fn approval_fails_cleanly_when_the_exam_is_gone() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (candidate_id, _) =
        create_actor(&client, &address, &owner_token, "supporter", &[]).await;
    let (_, requester) = create_actor(&client, &address, &owner_token, "moderator", &[]).await;
    let (_, senior) =
        create_actor(&client, &address, &owner_token, "senior_moderator", &[]).await;

    // The link is only checked on approval, so a dangling id submits fine
    let requester_token = login(&client, &address, &requester, "password123").await;
    let request = submit_request(
        &client,
        &address,
        &requester_token,
        serde_json::json!({
            "category": "exam_authorization",
            "title": "Authorize against a missing exam",
            "assigned_to": candidate_id,
            "metadata": { "exam_id": 424242 },
        }),
    )
    .await;
    let request_id = request["id"].as_i64().unwrap();

    let senior_token = login(&client, &address, &senior, "password123").await;
    let decided = client
        .post(format!("{}/api/requests/{}/decide", address, request_id))
        .header("Authorization", format!("Bearer {}", senior_token))
        .json(&serde_json::json!({ "outcome": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(decided.status().as_u16(), 404);

    // The failed spawn must not half-decide the request
    let reread: serde_json::Value = client
        .get(format!("{}/api/requests/{}", address, request_id))
        .header("Authorization", format!("Bearer {}", senior_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reread["status"], "pending");

    // And no session appeared
    let sessions: Vec<serde_json::Value> = client
        .get(format!("{}/api/sessions", address))
        .header("Authorization", format!("Bearer {}", requester_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn rejection_spawns_nothing_and_keeps_the_response() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (candidate_id, _) =
        create_actor(&client, &address, &owner_token, "supporter", &[]).await;
    let (_, requester) = create_actor(&client, &address, &owner_token, "moderator", &[]).await;
    let (_, senior) =
        create_actor(&client, &address, &owner_token, "senior_moderator", &[]).await;

    let requester_token = login(&client, &address, &requester, "password123").await;
    let request = submit_request(
        &client,
        &address,
        &requester_token,
        serde_json::json!({
            "category": "exam_authorization",
            "title": "Eager to examine",
            "assigned_to": candidate_id,
            "metadata": { "exam_id": 424242 },
        }),
    )
    .await;

    // Rejection never tries to spawn, so the dangling exam id is irrelevant
    let senior_token = login(&client, &address, &senior, "password123").await;
    let decided: serde_json::Value = client
        .post(format!(
            "{}/api/requests/{}/decide",
            address,
            request["id"].as_i64().unwrap()
        ))
        .header("Authorization", format!("Bearer {}", senior_token))
        .json(&serde_json::json!({ "outcome": "rejected", "response": "Not yet." }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(decided["request"]["status"], "rejected");
    assert_eq!(decided["request"]["response"], "Not yet.");
    assert!(decided["session"].is_null());
}

#[tokio::test]
async fn request_listing_is_scoped_below_senior_level() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (_, mod_a) = create_actor(&client, &address, &owner_token, "moderator", &[]).await;
    let (_, mod_b) = create_actor(&client, &address, &owner_token, "trial_moderator", &[]).await;
    let (_, senior) =
        create_actor(&client, &address, &owner_token, "senior_moderator", &[]).await;

    let token_a = login(&client, &address, &mod_a, "password123").await;
    let request = submit_request(
        &client,
        &address,
        &token_a,
        serde_json::json!({ "category": "other", "title": "Mentoring slot" }),
    )
    .await;
    let request_id = request["id"].as_i64().unwrap();

    // The author sees their own submission
    let own: Vec<serde_json::Value> = client
        .get(format!("{}/api/requests", address))
        .header("Authorization", format!("Bearer {}", token_a))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(own.len(), 1);

    // Another non-senior sees nothing, not even by direct id
    let token_b = login(&client, &address, &mod_b, "password123").await;
    let foreign_list: Vec<serde_json::Value> = client
        .get(format!("{}/api/requests", address))
        .header("Authorization", format!("Bearer {}", token_b))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(foreign_list.is_empty());

    let direct = client
        .get(format!("{}/api/requests/{}", address, request_id))
        .header("Authorization", format!("Bearer {}", token_b))
        .send()
        .await
        .unwrap();
    assert_eq!(direct.status().as_u16(), 403);

    // Senior staff browse all of it, with status filters
    let senior_token = login(&client, &address, &senior, "password123").await;
    let pending: Vec<serde_json::Value> = client
        .get(format!("{}/api/requests?status=pending", address))
        .header("Authorization", format!("Bearer {}", senior_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    let approved: Vec<serde_json::Value> = client
        .get(format!("{}/api/requests?status=approved", address))
        .header("Authorization", format!("Bearer {}", senior_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(approved.is_empty());
}
