use super::*;

#[tokio::test]
async fn test_queue_stats_endpoint() {
    let (app, _downloader, _rig) = create_test_app(Behavior::Succeed, |c| {
        c.queue.capacity = 7;
    })
    .await;

    for (user, tag) in [("alice", "a1"), ("alice", "a2"), ("bob", "b1")] {
        app.clone()
            .oneshot(json_request("POST", "/downloads", submission(user, tag)))
            .await
            .unwrap();
    }

    let response = app
        .oneshot(empty_request("GET", "/queue/stats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stats = body_json(response).await;
    assert_eq!(stats["queued"], 3);
    assert_eq!(stats["running"], 0);
    assert_eq!(stats["capacity"], 7);
    assert_eq!(stats["accepting"], true);
    assert!(stats["oldest_queued_at"].is_string());

    let per_user = stats["per_user"].as_array().unwrap();
    assert_eq!(per_user.len(), 2);
    assert_eq!(per_user[0]["user_id"], "alice");
    assert_eq!(per_user[0]["queued"], 2);
    assert_eq!(per_user[1]["user_id"], "bob");
}

#[tokio::test]
async fn test_queue_stats_after_drain() {
    let (app, downloader, _rig) = create_test_app(Behavior::Succeed, |_| {}).await;

    app.clone()
        .oneshot(json_request("POST", "/downloads", submission("alice", "a1")))
        .await
        .unwrap();
    downloader.drain_and_stop(Duration::from_secs(1)).await;

    let stats = body_json(
        app.clone()
            .oneshot(empty_request("GET", "/queue/stats"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(stats["accepting"], false);
    assert_eq!(stats["queued"], 0);
    assert_eq!(stats["cancelled"], 1);

    let response = app
        .oneshot(json_request("POST", "/downloads", submission("alice", "a2")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"]["code"], "shutting_down");
}
