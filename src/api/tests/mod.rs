use super::*;
use crate::db::Database;
use crate::downloader::test_helpers::{
    Behavior, ScriptedFetcher, TestRig, create_test_downloader, test_config, url, wait_for_event,
};
use crate::types::Event;
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::{Value, json};
use std::time::Duration;
use tempfile::tempdir;
use tower::ServiceExt;

mod queue;
mod system;

/// Router over a scripted downloader; keep the rig alive for the test
async fn create_test_app(
    behavior: Behavior,
    configure: impl FnOnce(&mut Config),
) -> (Router, Arc<MediaDownloader>, TestRig) {
    let rig = create_test_downloader(behavior, configure).await;
    let downloader = Arc::new(rig.downloader.clone());
    let app = create_router(downloader.clone(), downloader.get_config());
    (app, downloader, rig)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn submission(user: &str, tag: &str) -> Value {
    json!({ "user_id": user, "url": url(tag) })
}

#[tokio::test]
async fn test_api_server_spawns() {
    let (_app, downloader, _rig) = create_test_app(Behavior::Succeed, |_| {}).await;

    // Port 0 = OS assigns a free port
    let mut config = (*downloader.get_config()).clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let downloader = downloader.clone();
        let config = config.clone();
        async move { start_api_server(downloader, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server exited early");
    api_handle.abort();
}

#[tokio::test]
async fn test_cors_enabled() {
    let (app, _downloader, _rig) = create_test_app(Behavior::Succeed, |_| {}).await;

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/health")
        .header("Origin", "http://example.com")
        .header("Access-Control-Request-Method", "GET")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS preflight should include allow-origin"
    );
}

#[tokio::test]
async fn test_cors_restricted_origins() {
    let (app, _downloader, _rig) = create_test_app(Behavior::Succeed, |c| {
        c.api.cors_origins = vec!["http://allowed.example".to_string()];
    })
    .await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://allowed.example")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "http://allowed.example"
    );

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://other.example")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

#[tokio::test]
async fn test_swagger_ui_can_be_disabled() {
    let (app, _downloader, _rig) = create_test_app(Behavior::Succeed, |c| {
        c.api.swagger_ui = false;
    })
    .await;

    let response = app
        .oneshot(empty_request("GET", "/swagger-ui/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
