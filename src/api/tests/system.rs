use super::*;

#[tokio::test]
async fn test_health_check() {
    let (app, _downloader, _rig) = create_test_app(Behavior::Succeed, |_| {}).await;

    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["accepting"], true);
    assert_eq!(body["fetcher"], "scripted");
}

#[tokio::test]
async fn test_openapi_endpoint() {
    let (app, _downloader, _rig) = create_test_app(Behavior::Succeed, |_| {}).await;

    let response = app
        .oneshot(empty_request("GET", "/openapi.json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let spec = body_json(response).await;
    assert!(spec["openapi"].as_str().unwrap().starts_with("3."));
    assert!(spec["paths"]["/api/v1/downloads"]["post"].is_object());
}

#[tokio::test]
async fn test_sse_event_stream() {
    use tokio_stream::StreamExt;

    let (app, downloader, _rig) = create_test_app(Behavior::Succeed, |_| {}).await;

    let request = Request::builder()
        .uri("/events")
        .header("Accept", "text/event-stream")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert!(
        content_type.contains("text/event-stream"),
        "Content-Type should be text/event-stream, got: {content_type}"
    );

    // the stream subscribed when the handler ran, so this event reaches it
    downloader
        .submit(crate::types::Submission::new("alice", url("sse")))
        .await
        .unwrap();

    let mut body = response.into_body().into_data_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .expect("no SSE frame")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(text.contains("event: queued"), "unexpected frame: {text}");
    assert!(text.contains(r#""user_id":"alice""#));
}
