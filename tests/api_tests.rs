// tests/api_tests.rs

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use quiz_attempts::{
    config::Config, routes, state::AppState, store::memory::MemoryStore, utils::jwt::sign_jwt,
};
use tower::ServiceExt;

const SECRET: &str = "test_secret_for_integration_tests";

fn test_state(store: &MemoryStore) -> AppState {
    let config = Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: SECRET.to_string(),
        rust_log: "error".to_string(),
        server_port: 0,
        cache_ttl_secs: 3600,
        cache_max_entries: 1_000,
    };

    AppState {
        engine: Arc::new(engine(store)),
        config,
    }
}

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
async fn spawn_app(store: &MemoryStore) -> String {
    let app = routes::create_router(test_state(store));

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    // Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

fn bearer(user_id: i64, role: &str) -> String {
    format!("Bearer {}", sign_jwt(user_id, role, SECRET, 600).unwrap())
}

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let store = MemoryStore::new();
    let address = spawn_app(&store).await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(&format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn start_requires_a_token() {
    let store = MemoryStore::new();
    seed_quiz(&store, 1, 2, 1.0, |_| {});
    let address = spawn_app(&store).await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/api/quizzes/1/attempts", address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);

    let response = client
        .post(&format!("{}/api/quizzes/1/attempts", address))
        .header("Authorization", "Bearer not-a-jwt")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "unauthenticated");
}

#[tokio::test]
async fn test_attempt_flow() {
    // Arrange
    let store = MemoryStore::new();
    let quiz = seed_quiz(&store, 1, 2, 1.0, |_| {});
    let address = spawn_app(&store).await;
    let client = reqwest::Client::new();
    let token = bearer(STUDENT, "student");

    // 1. Start
    let start_resp = client
        .post(&format!("{}/api/quizzes/1/attempts", address))
        .header("Authorization", &token)
        .send()
        .await
        .expect("Start failed");
    assert_eq!(start_resp.status().as_u16(), 201);

    let started: serde_json::Value = start_resp.json().await.unwrap();
    assert_eq!(started["status"], "in_progress");
    assert_eq!(started["resumed"], false);
    assert_eq!(started["total_questions"], 2);
    assert!(started["question"]["options"][0].get("is_correct").is_none());
    let attempt_id = started["attempt_id"].as_i64().unwrap();
    let q1 = started["question"]["id"].as_i64().unwrap();

    // 2. Resume returns the same attempt
    let resumed: serde_json::Value = client
        .post(&format!("{}/api/quizzes/1/attempts", address))
        .header("Authorization", &token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resumed["resumed"], true);
    assert_eq!(resumed["attempt_id"].as_i64(), Some(attempt_id));

    // 3. Answer Q1 correctly
    let step: serde_json::Value = client
        .post(&format!("{}/api/attempts/{}/advance", address, attempt_id))
        .header("Authorization", &token)
        .json(&serde_json::json!({
            "current_index": 0,
            "selected_option_id": quiz.correct_for(q1),
            "time_taken": 12
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(step["is_last_question"], false);
    assert_eq!(step["next_index"], 1);
    assert!(step["time_remaining"].as_i64().unwrap() > 0);

    // 4. Let Q2 time out
    let step: serde_json::Value = client
        .post(&format!("{}/api/attempts/{}/advance", address, attempt_id))
        .header("Authorization", &token)
        .json(&serde_json::json!({ "current_index": 1 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(step["is_last_question"], true);
    assert!(step["question"].is_null());

    // 5. Submit, twice
    let submit_resp = client
        .post(&format!("{}/api/attempts/{}/submit", address, attempt_id))
        .header("Authorization", &token)
        .send()
        .await
        .expect("Submit failed");
    assert_eq!(submit_resp.status().as_u16(), 200);
    let result: serde_json::Value = submit_resp.json().await.unwrap();
    assert_eq!(result["score"], 1.0);
    assert_eq!(result["total_marks"], 2.0);
    assert_eq!(result["percentage"], 50.0);
    assert_eq!(result["passed"], true);
    assert_eq!(result["breakdown"].as_array().unwrap().len(), 2);

    let again: serde_json::Value = client
        .post(&format!("{}/api/attempts/{}/submit", address, attempt_id))
        .header("Authorization", &token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again, result);

    // 6. Read-only result
    let fetched: serde_json::Value = client
        .get(&format!("{}/api/attempts/{}/result", address, attempt_id))
        .header("Authorization", &token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched, result);
}

#[tokio::test]
async fn errors_carry_stable_kinds() {
    let store = MemoryStore::new();
    seed_quiz(&store, 1, 2, 1.0, |_| {});
    seed_quiz(&store, 2, 1, 1.0, |q| q.is_free = false);
    let address = spawn_app(&store).await;
    let client = reqwest::Client::new();
    let token = bearer(STUDENT, "student");

    let missing = client
        .post(&format!("{}/api/quizzes/404/attempts", address))
        .header("Authorization", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);
    let body: serde_json::Value = missing.json().await.unwrap();
    assert_eq!(body["kind"], "not_found");

    let unpaid = client
        .post(&format!("{}/api/quizzes/2/attempts", address))
        .header("Authorization", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(unpaid.status().as_u16(), 402);
    let body: serde_json::Value = unpaid.json().await.unwrap();
    assert_eq!(body["kind"], "quota_exceeded");

    let started: serde_json::Value = client
        .post(&format!("{}/api/quizzes/1/attempts", address))
        .header("Authorization", &token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let attempt_id = started["attempt_id"].as_i64().unwrap();

    let negative = client
        .post(&format!("{}/api/attempts/{}/advance", address, attempt_id))
        .header("Authorization", &token)
        .json(&serde_json::json!({ "current_index": -1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(negative.status().as_u16(), 400);
    let body: serde_json::Value = negative.json().await.unwrap();
    assert_eq!(body["kind"], "validation");

    let foreign = client
        .post(&format!("{}/api/attempts/{}/submit", address, attempt_id))
        .header("Authorization", bearer(OTHER_STUDENT, "student"))
        .send()
        .await
        .unwrap();
    assert_eq!(foreign.status().as_u16(), 403);
    let body: serde_json::Value = foreign.json().await.unwrap();
    assert_eq!(body["kind"], "authorization");
}

#[tokio::test]
async fn cache_invalidation_is_admin_only() {
    let store = MemoryStore::new();
    seed_quiz(&store, 1, 1, 1.0, |_| {});
    let app = routes::create_router(test_state(&store));

    let as_student = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/quizzes/1/cache/invalidate")
                .header("Authorization", bearer(STUDENT, "student"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(as_student.status(), StatusCode::FORBIDDEN);
    let bytes = axum::body::to_bytes(as_student.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["kind"], "authorization");

    let as_admin = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/quizzes/1/cache/invalidate")
                .header("Authorization", bearer(1, "admin"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(as_admin.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn republished_questions_are_seen_after_invalidation() {
    let store = MemoryStore::new();
    seed_quiz(&store, 1, 1, 1.0, |q| q.status = "draft".to_string());
    let app = routes::create_router(test_state(&store));

    let start = |app: axum::Router| async move {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/quizzes/1/attempts")
                .header("Authorization", bearer(STUDENT, "student"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    };

    assert_eq!(start(app.clone()).await.status(), StatusCode::CONFLICT);

    // Authoring publishes the quiz, then invalidates
    let mut published = base_quiz(1, 1, 1.0);
    published.status = "active".to_string();
    store.insert_quiz(published);
    assert_eq!(start(app.clone()).await.status(), StatusCode::CONFLICT);

    let invalidated = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/quizzes/1/cache/invalidate")
                .header("Authorization", bearer(1, "admin"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(invalidated.status(), StatusCode::NO_CONTENT);

    assert_eq!(start(app).await.status(), StatusCode::CREATED);
}
