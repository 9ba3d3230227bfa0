// tests/api_tests.rs

use std::net::SocketAddr;
use std::sync::Arc;

use staff_portal::{
    config::Config,
    notify::{Notifier, NullNotifier, StaffEvent},
    roles::Role,
    routes,
    state::AppState,
    store::{MemStore, NewActor, Store},
    utils::hash::hash_password,
};

const OWNER_USERNAME: &str = "portal_owner";
const OWNER_PASSWORD: &str = "owner-password-123";

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
///
/// Each call gets a fresh in-memory store with the owner account seeded,
/// the same way the deployment seed in `main` does it.
async fn spawn_app() -> String {
    spawn_app_with_notifier(Arc::new(NullNotifier)).await
}

/// Like `spawn_app`, but with the outbound notifier swapped so a test can
/// observe which events the handlers emit.
async fn spawn_app_with_notifier(notifier: Arc<dyn Notifier>) -> String {
    // 1. Fresh store per test, so tests never observe each other's data
    let store = Arc::new(MemStore::new());

    // 2. Seed the owner account
    store
        .create_actor(NewActor {
            username: OWNER_USERNAME.to_string(),
            password_hash: hash_password(OWNER_PASSWORD).expect("Failed to hash seed password"),
            role: Role::TopManagement,
            departments: vec![],
            is_owner: true,
        })
        .await
        .expect("Failed to seed owner actor");

    // 3. Create test configuration and state
    let config = Config {
        database_url: "unused-in-tests".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        owner_username: None,
        owner_password: None,
        webhook_url: None,
    };

    let state = AppState {
        store: store.clone(),
        notifier,
        config,
    };

    // 4. Create the router with the app state
    let app = routes::create_router(state);

    // 5. Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    // 6. Spawn the server in the background. The rate limiter keys on the
    // peer address, so the connect-info service is needed here exactly as
    // in `main`.
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

/// Collects outbound staff notifications instead of delivering them.
#[derive(Default)]
struct RecordingNotifier {
    events: std::sync::Mutex<Vec<StaffEvent>>,
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, event: StaffEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Logs in and returns the bearer token.
async fn login(client: &reqwest::Client, address: &str, username: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Login request failed");
    assert_eq!(response.status().as_u16(), 200, "Login should succeed");

    let body: serde_json::Value = response.json().await.expect("Failed to parse login json");
    body["token"].as_str().expect("Token not found").to_string()
}

/// Creates an actor through the API and returns (id, username). The fixed
/// password is "password123".
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
        .expect("Create actor request failed");
    assert_eq!(response.status().as_u16(), 201, "Actor creation should succeed");

    let body: serde_json::Value = response.json().await.unwrap();
    (body["id"].as_i64().unwrap(), username)
}

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn login_works_and_me_reflects_the_account() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": OWNER_USERNAME,
            "password": OWNER_PASSWORD,
        }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["type"], "Bearer");
    assert_eq!(body["actor"]["username"], OWNER_USERNAME);
    assert_eq!(body["actor"]["role"], "top_management");
    assert_eq!(body["actor"]["is_owner"], true);
    // The hash must never travel over the wire
    assert!(body["actor"].get("password_hash").is_none());

    let token = body["token"].as_str().unwrap();
    let me: serde_json::Value = client
        .get(format!("{}/api/auth/me", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["username"], OWNER_USERNAME);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act: wrong password for a real account, then a nonexistent account
    let wrong_password = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": OWNER_USERNAME,
            "password": "not-the-password",
        }))
        .send()
        .await
        .unwrap();
    let unknown_user = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": "nobody_here",
            "password": "not-the-password",
        }))
        .send()
        .await
        .unwrap();

    // Assert: same status, same message, no username oracle
    assert_eq!(wrong_password.status().as_u16(), 401);
    assert_eq!(unknown_user.status().as_u16(), 401);
    let body_a: serde_json::Value = wrong_password.json().await.unwrap();
    let body_b: serde_json::Value = unknown_user.json().await.unwrap();
    assert_eq!(body_a["error"], body_b["error"]);
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("{}/api/sessions", address))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn duplicate_usernames_are_rejected_case_insensitively() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (_, username) = create_actor(&client, &address, &token, "moderator", &[]).await;

    // Act: exact duplicate, then a case variant
    for dup in [username.clone(), username.to_uppercase()] {
        let response = client
            .post(format!("{}/api/actors", address))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({
                "username": dup,
                "password": "password123",
                "role": "supporter",
            }))
            .send()
            .await
            .unwrap();

        // Assert
        assert_eq!(response.status().as_u16(), 409);
    }
}

#[tokio::test]
async fn management_cannot_mint_peers() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (_, manager) = create_actor(&client, &address, &owner_token, "management", &[]).await;
    let manager_token = login(&client, &address, &manager, "password123").await;

    // Act: management creating another management account
    let peer = client
        .post(format!("{}/api/actors", address))
        .header("Authorization", format!("Bearer {}", manager_token))
        .json(&serde_json::json!({
            "username": "wannabe_peer",
            "password": "password123",
            "role": "management",
        }))
        .send()
        .await
        .unwrap();

    // Assert: peer-level assignment is denied, lower roles still work
    assert_eq!(peer.status().as_u16(), 403);
    create_actor(&client, &address, &manager_token, "moderator", &[]).await;
}

#[tokio::test]
async fn non_staff_cannot_reach_actor_admin() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (_, moderator) = create_actor(&client, &address, &owner_token, "moderator", &[]).await;
    let moderator_token = login(&client, &address, &moderator, "password123").await;

    // Act
    let listing = client
        .get(format!("{}/api/actors", address))
        .header("Authorization", format!("Bearer {}", moderator_token))
        .send()
        .await
        .unwrap();
    let creation = client
        .post(format!("{}/api/actors", address))
        .header("Authorization", format!("Bearer {}", moderator_token))
        .json(&serde_json::json!({
            "username": "sneaky_account",
            "password": "password123",
            "role": "supporter",
        }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(listing.status().as_u16(), 403);
    assert_eq!(creation.status().as_u16(), 403);
}

#[tokio::test]
async fn role_changes_check_both_the_new_and_the_current_role() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (_, manager) = create_actor(&client, &address, &owner_token, "management", &[]).await;
    let (target_id, _) =
        create_actor(&client, &address, &owner_token, "moderation_team", &[]).await;
    let manager_token = login(&client, &address, &manager, "password123").await;

    // 1. Below the staff line in both directions: allowed
    let demote = client
        .patch(format!("{}/api/actors/{}/role", address, target_id))
        .header("Authorization", format!("Bearer {}", manager_token))
        .json(&serde_json::json!({ "role": "moderator" }))
        .send()
        .await
        .unwrap();
    assert_eq!(demote.status().as_u16(), 200);
    let body: serde_json::Value = demote.json().await.unwrap();
    assert_eq!(body["role"], "moderator");

    // 2. Promotion to peer level: the new role is out of reach
    let promote = client
        .patch(format!("{}/api/actors/{}/role", address, target_id))
        .header("Authorization", format!("Bearer {}", manager_token))
        .json(&serde_json::json!({ "role": "junior_management" }))
        .send()
        .await
        .unwrap();
    assert_eq!(promote.status().as_u16(), 403);

    // 3. Demoting the owner: the current role is out of reach
    let owner_id = {
        let me: serde_json::Value = client
            .get(format!("{}/api/auth/me", address))
            .header("Authorization", format!("Bearer {}", owner_token))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        me["id"].as_i64().unwrap()
    };
    let topple = client
        .patch(format!("{}/api/actors/{}/role", address, owner_id))
        .header("Authorization", format!("Bearer {}", manager_token))
        .json(&serde_json::json!({ "role": "supporter" }))
        .send()
        .await
        .unwrap();
    assert_eq!(topple.status().as_u16(), 403);
}

#[tokio::test]
async fn role_changes_reach_the_staff_channel() {
    // Arrange: capture notifications instead of posting them anywhere
    let notifier = Arc::new(RecordingNotifier::default());
    let address = spawn_app_with_notifier(notifier.clone()).await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (id, username) = create_actor(&client, &address, &owner_token, "moderator", &[]).await;

    // Act
    let response = client
        .patch(format!("{}/api/actors/{}/role", address, id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .json(&serde_json::json!({ "role": "senior_moderator" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // Assert: exactly one event, naming the account and both roles
    let events = notifier.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        StaffEvent::RoleChanged { username: event_user, from, to } => {
            assert_eq!(event_user, &username);
            assert_eq!(*from, Role::Moderator);
            assert_eq!(*to, Role::SeniorModerator);
        }
        other => panic!("Expected a role change event, got {:?}", other),
    }
}

#[tokio::test]
async fn self_deactivation_is_blocked() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let me: serde_json::Value = client
        .get(format!("{}/api/auth/me", address))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Act
    let response = client
        .patch(format!(
            "{}/api/actors/{}/active",
            address,
            me["id"].as_i64().unwrap()
        ))
        .header("Authorization", format!("Bearer {}", owner_token))
        .json(&serde_json::json!({ "is_active": false }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn deactivation_cuts_off_live_tokens() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (id, manager) = create_actor(&client, &address, &owner_token, "management", &[]).await;

    // 1. The account logs in and works
    let manager_token = login(&client, &address, &manager, "password123").await;
    let before = client
        .get(format!("{}/api/actors", address))
        .header("Authorization", format!("Bearer {}", manager_token))
        .send()
        .await
        .unwrap();
    assert_eq!(before.status().as_u16(), 200);

    // 2. Owner flips the active flag
    let deactivate = client
        .patch(format!("{}/api/actors/{}/active", address, id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .json(&serde_json::json!({ "is_active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(deactivate.status().as_u16(), 200);

    // 3. The still-valid JWT no longer gets through
    let after = client
        .get(format!("{}/api/actors", address))
        .header("Authorization", format!("Bearer {}", manager_token))
        .send()
        .await
        .unwrap();
    assert_eq!(after.status().as_u16(), 403);

    // 4. And a fresh login is rejected too
    let relogin = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": manager, "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(relogin.status().as_u16(), 403);
}

#[tokio::test]
async fn department_tags_are_validated() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (id, _) = create_actor(&client, &address, &owner_token, "moderator", &[]).await;

    // Act: valid slugs, then a malformed one
    let ok = client
        .patch(format!("{}/api/actors/{}/departments", address, id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .json(&serde_json::json!({ "departments": ["moderation", "support"] }))
        .send()
        .await
        .unwrap();
    let bad = client
        .patch(format!("{}/api/actors/{}/departments", address, id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .json(&serde_json::json!({ "departments": ["Not A Slug!"] }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(ok.status().as_u16(), 200);
    let body: serde_json::Value = ok.json().await.unwrap();
    assert_eq!(body["departments"], serde_json::json!(["moderation", "support"]));
    assert_eq!(bad.status().as_u16(), 400);
}

#[tokio::test]
async fn audit_deletion_is_an_owner_capability() {
    // Arrange: creating an actor writes an audit entry
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner_token = login(&client, &address, OWNER_USERNAME, OWNER_PASSWORD).await;
    let (_, manager) = create_actor(&client, &address, &owner_token, "management", &[]).await;
    let manager_token = login(&client, &address, &manager, "password123").await;

    let entries: Vec<serde_json::Value> = client
        .get(format!("{}/api/audit", address))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!entries.is_empty());
    assert_eq!(entries[0]["action"], "actor.created");
    let entry_id = entries[0]["id"].as_i64().unwrap();

    // Act: management (staff, but not owner) tries to delete
    let denied = client
        .delete(format!("{}/api/audit/{}", address, entry_id))
        .header("Authorization", format!("Bearer {}", manager_token))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status().as_u16(), 403);

    // The owner may
    let deleted = client
        .delete(format!("{}/api/audit/{}", address, entry_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status().as_u16(), 200);

    // And the entry is gone
    let again = client
        .delete(format!("{}/api/audit/{}", address, entry_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status().as_u16(), 404);
}
