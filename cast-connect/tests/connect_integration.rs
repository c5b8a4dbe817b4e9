//! Integration tests for cast-connect
//!
//! The Facebook page picker runs against a local axum server standing in
//! for the Graph API (`platforms.facebook.graph_base`).

use assert_cmd::Command;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use libcrosscast::{Database, Platform};
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

struct TestEnv {
    _temp_dir: TempDir,
    config_path: String,
    db_path: String,
}

/// Setup test environment with config and database
async fn setup_test_env(graph_base: &str) -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("test.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[platforms.facebook]
graph_base = "{}"
"#,
        db_path.display().to_string().replace('\\', "/"),
        graph_base
    );
    fs::write(&config_path, config_content).unwrap();

    let _db = Database::new(db_path.to_str().unwrap()).await.unwrap();

    TestEnv {
        _temp_dir: temp_dir,
        config_path: config_path.to_str().unwrap().to_string(),
        db_path: db_path.to_str().unwrap().to_string(),
    }
}

/// Fake Graph API answering `/me/accounts` with `status` and `body`
async fn fake_graph(status: StatusCode, body: Value) -> String {
    let app = Router::new().route(
        "/me/accounts",
        get(move || {
            let body = body.clone();
            async move { (status, Json(body)) }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn cast_connect(env: &TestEnv) -> Command {
    let mut cmd = Command::cargo_bin("cast-connect").unwrap();
    cmd.env("CROSSCAST_CONFIG", &env.config_path)
        .env("CROSSCAST_USER", "alice");
    cmd
}

#[tokio::test]
async fn test_connect_list_disconnect() {
    let env = setup_test_env("http://127.0.0.1:9").await;

    cast_connect(&env)
        .args([
            "connect",
            "reddit",
            "--token",
            "rd-token",
            "--refresh-token",
            "rd-refresh",
            "--expires-in",
            "3600",
            "--subreddit",
            "rust",
            "--username",
            "alice_r",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Connected reddit"));

    let db = Database::new(&env.db_path).await.unwrap();
    let stored = db
        .get_integration("alice", Platform::Reddit)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.secondary_token.as_deref(), Some("rd-refresh"));
    assert_eq!(stored.subreddit.as_deref(), Some("rust"));
    assert!(stored.expires_at.unwrap() > chrono::Utc::now().timestamp());

    cast_connect(&env)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("reddit | alice_r | active"))
        .stdout(predicate::str::contains("rd-token").not());

    cast_connect(&env)
        .args(["disconnect", "reddit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Disconnected reddit"));

    assert!(db.active_integrations("alice").await.unwrap().is_empty());

    cast_connect(&env)
        .args(["disconnect", "reddit"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Not found"));
}

#[tokio::test]
async fn test_list_json_never_contains_tokens() {
    let env = setup_test_env("http://127.0.0.1:9").await;

    cast_connect(&env)
        .args([
            "connect",
            "linkedin",
            "--token",
            "li-token",
            "--external-id",
            "member-7",
        ])
        .assert()
        .success();

    let output = cast_connect(&env)
        .args(["list", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed[0]["platform"], "linkedin");
    assert_eq!(parsed[0]["external_id"], "member-7");
    assert!(!String::from_utf8_lossy(&output.stdout).contains("li-token"));
}

#[tokio::test]
async fn test_connect_rejects_bad_input() {
    let env = setup_test_env("http://127.0.0.1:9").await;

    cast_connect(&env)
        .args(["connect", "myspace", "--token", "t"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown platform"));

    cast_connect(&env)
        .args(["connect", "twitter", "--token", "  "])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("access token cannot be empty"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_page_selection_flow() {
    let base = fake_graph(
        StatusCode::OK,
        json!({"data": [
            {"id": "p-1", "name": "Bakery", "access_token": "pt-1"},
            {"id": "p-2", "name": "Book Club", "access_token": "pt-2"}
        ]}),
    )
    .await;
    let env = setup_test_env(&base).await;

    let output = cast_connect(&env)
        .args(["pages", "--token", "user-token", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let parsed: Value = serde_json::from_slice(&output.stdout).unwrap();
    let selection_id = parsed["selection_id"].as_str().unwrap().to_string();
    assert_eq!(parsed["pages"].as_array().unwrap().len(), 2);
    assert!(!String::from_utf8_lossy(&output.stdout).contains("pt-1"));

    // A page that was not offered leaves the selection usable
    cast_connect(&env)
        .args(["select", &selection_id, "p-9"])
        .assert()
        .code(3);

    cast_connect(&env)
        .args(["select", &selection_id, "p-2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Book Club"));

    let db = Database::new(&env.db_path).await.unwrap();
    let facebook = db
        .get_integration("alice", Platform::Facebook)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(facebook.page_id.as_deref(), Some("p-2"));
    assert_eq!(facebook.page_token.as_deref(), Some("pt-2"));

    // Consumed
    cast_connect(&env)
        .args(["select", &selection_id, "p-2"])
        .assert()
        .code(3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pages_rejected_token_exits_1() {
    let base = fake_graph(
        StatusCode::BAD_REQUEST,
        json!({"error": {"message": "Invalid OAuth access token.", "type": "OAuthException", "code": 190}}),
    )
    .await;
    let env = setup_test_env(&base).await;

    cast_connect(&env)
        .args(["pages", "--token", "bad-token"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid OAuth access token."));
}
