//! End-to-end HTTP tests over a freshly built router, grounded in the
//! teacher's `axum_test::TestServer` testing idiom (formerly in
//! `gateway-server/src/lib.rs`'s `#[cfg(test)] mod tests`).

use axum::http::StatusCode;
use axum_test::TestServer;
use gateway_server::config::Settings;
use gateway_server::server::create_server;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Each test gets its own SQLite file under the OS temp dir so tests never
/// interleave state; a file (not `:memory:`) is used because the pool opens
/// more than one connection.
async fn test_server() -> TestServer {
    let n = DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir();
    let db_path = dir.join(format!("gateway-test-{}-{n}.db", std::process::id()));
    let backup_path = dir.join(format!("gateway-test-{}-{n}.json", std::process::id()));
    let _ = std::fs::remove_file(&db_path);
    let _ = std::fs::remove_file(&backup_path);

    let settings = Settings {
        database_url: format!("sqlite://{}?mode=rwc", db_path.display()),
        backup_file: backup_path.display().to_string(),
        health_check_enabled: false,
        ..Settings::default()
    };

    let (app, _health_checker) = create_server(settings).await.expect("server builds");
    TestServer::new(app).expect("test server starts")
}

#[tokio::test]
async fn ping_responds() {
    let server = test_server().await;
    let response = server.get("/ping").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "pong");
}

#[tokio::test]
async fn provider_crud_roundtrip() {
    let server = test_server().await;

    let created = server
        .post("/api/providers")
        .json(&json!({
            "name": "openai-primary",
            "base_url": "https://api.openai.com",
            "api_key": "sk-test-key",
            "models": ["gpt-4o", "gpt-4o-mini"],
        }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let body: serde_json::Value = created.json();
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["name"], "openai-primary");
    assert!(body.get("api_key_opaque").is_none(), "never returns the encrypted key");

    let fetched = server.get(&format!("/api/providers/{id}")).await;
    assert_eq!(fetched.status_code(), StatusCode::OK);

    let updated = server
        .patch(&format!("/api/providers/{id}"))
        .json(&json!({"is_active": false}))
        .await;
    assert_eq!(updated.status_code(), StatusCode::OK);
    assert_eq!(updated.json::<serde_json::Value>()["is_active"], false);

    let listed = server.get("/api/providers").await;
    let providers: Vec<serde_json::Value> = listed.json();
    assert_eq!(providers.len(), 1);

    let deleted = server.delete(&format!("/api/providers/{id}")).await;
    assert_eq!(deleted.status_code(), StatusCode::NO_CONTENT);

    let missing = server.get(&format!("/api/providers/{id}")).await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_provider_rejects_empty_models() {
    let server = test_server().await;
    let response = server
        .post("/api/providers")
        .json(&json!({
            "name": "bad",
            "base_url": "https://example.com",
            "api_key": "key",
            "models": [],
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
}

async fn create_provider(server: &TestServer, name: &str, base_url: &str, models: &[&str]) -> String {
    let response = server
        .post("/api/providers")
        .json(&json!({
            "name": name,
            "base_url": base_url,
            "api_key": "test-key",
            "models": models,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<serde_json::Value>()["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn route_crud_select_and_state() {
    let server = test_server().await;
    let provider_id = create_provider(&server, "p1", "https://api.openai.com", &["gpt-4o"]).await;

    let created = server
        .post("/api/model-routes")
        .json(&json!({
            "name": "default",
            "mode": "specific",
            "nodes": [{"api_id": provider_id, "strategy": "round-robin"}],
        }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let route: serde_json::Value = created.json();
    let route_id = route["id"].as_str().unwrap().to_string();
    assert_eq!(route["nodes"].as_array().unwrap().len(), 1);

    let selected = server
        .post(&format!("/api/model-routes/{route_id}/select"))
        .await;
    assert_eq!(selected.status_code(), StatusCode::OK);
    let selection: serde_json::Value = selected.json();
    assert_eq!(selection["provider_id"], provider_id);
    assert_eq!(selection["model"], "gpt-4o");

    let state = server.get(&format!("/api/model-routes/{route_id}/state")).await;
    assert_eq!(state.status_code(), StatusCode::OK);
    let state_body: serde_json::Value = state.json();
    assert!(state_body.as_object().unwrap().values().any(|v| v.as_u64().unwrap_or(0) >= 1));

    let deleted = server.delete(&format!("/api/model-routes/{route_id}")).await;
    assert_eq!(deleted.status_code(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn route_with_inactive_node_provider_has_no_active_candidate() {
    let server = test_server().await;
    let provider_id = create_provider(&server, "p1", "https://api.openai.com", &["gpt-4o"]).await;
    let deactivated = server
        .patch(&format!("/api/providers/{provider_id}"))
        .json(&json!({"is_active": false}))
        .await;
    assert_eq!(deactivated.status_code(), StatusCode::OK);

    let created = server
        .post("/api/model-routes")
        .json(&json!({
            "name": "default",
            "mode": "auto",
            "nodes": [{"api_id": provider_id, "strategy": "round-robin"}],
        }))
        .await;
    let route_id = created.json::<serde_json::Value>()["id"].as_str().unwrap().to_string();

    let selected = server
        .post(&format!("/api/model-routes/{route_id}/select"))
        .await;
    assert_eq!(selected.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn restore_backup_is_idempotent() {
    let server = test_server().await;
    create_provider(&server, "p1", "https://api.openai.com", &["gpt-4o"]).await;

    let first = server.post("/api/admin/providers/restore").await;
    assert_eq!(first.status_code(), StatusCode::OK);
    let second = server.post("/api/admin/providers/restore").await;
    assert_eq!(second.status_code(), StatusCode::OK);

    let providers: Vec<serde_json::Value> = server.get("/api/providers").await.json();
    assert_eq!(providers.len(), 1, "restore upserts by name, it never duplicates");
}

#[tokio::test]
async fn chat_completion_round_robins_across_healthy_providers() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-upstream",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hi there"},
                "finish_reason": "stop",
            }],
        })))
        .mount(&mock)
        .await;

    let server = test_server().await;
    let provider_id = create_provider(&server, "p1", &mock.uri(), &["gpt-4o"]).await;
    let route_created = server
        .post("/api/model-routes")
        .json(&json!({
            "name": "chat",
            "mode": "specific",
            "nodes": [{"api_id": provider_id, "strategy": "round-robin"}],
        }))
        .await;
    assert_eq!(route_created.status_code(), StatusCode::CREATED);

    let response = server
        .post("/v1/chat/completions")
        .json(&json!({
            "model": "chat",
            "messages": [{"role": "user", "content": "hello"}],
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["choices"][0]["message"]["content"], "hi there");
}

#[tokio::test]
async fn chat_completion_does_not_retry_on_4xx() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "bad key"})))
        .expect(1)
        .mount(&mock)
        .await;

    let server = test_server().await;
    let provider_id = create_provider(&server, "p1", &mock.uri(), &["gpt-4o"]).await;
    let route_created = server
        .post("/api/model-routes")
        .json(&json!({
            "name": "chat",
            "mode": "specific",
            "nodes": [{"api_id": provider_id, "strategy": "round-robin"}],
        }))
        .await;
    assert_eq!(route_created.status_code(), StatusCode::CREATED);

    let response = server
        .post("/v1/chat/completions")
        .json(&json!({
            "model": "chat",
            "messages": [{"role": "user", "content": "hello"}],
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    // `.expect(1)` above is verified when `mock` drops at end of scope.
}

#[tokio::test]
async fn unknown_route_name_is_not_found() {
    let server = test_server().await;
    let response = server
        .post("/v1/chat/completions")
        .json(&json!({
            "model": "does-not-exist",
            "messages": [{"role": "user", "content": "hello"}],
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
