#![allow(clippy::unwrap_used, clippy::expect_used)]
//! REST fallback tests, driven through the router directly.

use {
    axum::{
        body::Body,
        http::{Request, StatusCode, header},
    },
    codequest_config::CodequestConfig,
    codequest_gateway::{AppState, build_app},
    http_body_util::BodyExt,
    serde_json::Value,
    tower::ServiceExt,
};

fn app() -> axum::Router {
    build_app(AppState::new(CodequestConfig::default()))
}

async fn post_command(command: &str) -> (StatusCode, Value) {
    let body = serde_json::json!({ "command": command }).to_string();
    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/terminal")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn allowed_commands_return_simulated_output() {
    let (status, body) = post_command("whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"], "lara");
}

#[tokio::test]
async fn denied_commands_return_400_with_reason() {
    let (status, body) = post_command("sudo rm -rf /").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(body.get("output").is_none());
}

#[tokio::test]
async fn unknown_commands_are_denied_not_simulated() {
    let (status, body) = post_command("definitely-not-a-command").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn piped_commands_carry_the_warning_through() {
    let (status, body) = post_command("date | wc").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["warning"].is_string());
}

#[tokio::test]
async fn plain_get_serves_a_readiness_probe() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/terminal")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn health_reports_session_counts() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["sessions"], 0);
}
