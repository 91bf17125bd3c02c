use super::*;

#[tokio::test]
async fn test_successful_request_delivers_artifact() {
    let rig = create_test_downloader(Behavior::Succeed, |_| {}).await;
    rig.downloader.start().await;

    let handle = rig
        .downloader
        .submit(Submission::new("alice", url("ok")).with_username("Alice"))
        .await
        .unwrap();
    let id = handle.id();
    let record = handle.wait().await.unwrap();

    assert_eq!(record.state(), RequestState::Succeeded);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.username.as_deref(), Some("Alice"));
    let artifact = record.result.artifact().unwrap();
    assert!(artifact.path.exists());
    assert!(artifact.path.starts_with(rig.downloader.request_dir(id)));

    let records = rig.sink.wait_for(1).await;
    assert_eq!(records[0].id, id);

    let view = rig.downloader.status(id).await.unwrap();
    assert_eq!(view.state, RequestState::Succeeded);
    assert!(matches!(view.result, Some(RequestResult::Succeeded { .. })));

    let snapshot = rig.downloader.snapshot().await;
    assert_eq!(snapshot.succeeded, 1);
    assert_eq!(snapshot.outstanding(), 0);
    assert!(snapshot.per_user.is_empty());
    assert_eq!(rig.downloader.held_artifacts().await, 1);
}

#[tokio::test]
async fn test_second_request_waits_for_first_with_one_worker() {
    let gate = Arc::new(Semaphore::new(0));
    let rig = create_test_downloader(Behavior::Succeed, |c| {
        c.queue.capacity = 2;
    })
    .await;
    rig.fetcher.script(&url("r1"), Behavior::Gate(gate.clone()));
    let mut events = rig.downloader.subscribe();
    rig.downloader.start().await;

    let r1 = rig
        .downloader
        .submit(Submission::new("u1", url("r1")))
        .await
        .unwrap();
    let r2 = rig
        .downloader
        .submit(Submission::new("u2", url("r2")))
        .await
        .unwrap();
    let r3 = rig.downloader.submit(Submission::new("u3", url("r3"))).await;
    assert!(matches!(
        r3,
        Err(Error::Rejected(Rejection::QueueFull { .. }))
    ));

    wait_for_event(&mut events, |e| matches!(e, Event::Started { id, .. } if *id == r1.id()))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(rig.fetcher.started_urls(), vec![url("r1")]);
    let view = rig.downloader.status(r2.id()).await.unwrap();
    assert_eq!(view.state, RequestState::Queued);

    gate.add_permits(1);
    let first = r1.wait().await.unwrap();
    let second = r2.wait().await.unwrap();
    assert_eq!(first.state(), RequestState::Succeeded);
    assert_eq!(second.state(), RequestState::Succeeded);
    assert!(second.finished_at >= first.finished_at);
    assert_eq!(rig.fetcher.started_urls(), vec![url("r1"), url("r2")]);
}

#[tokio::test]
async fn test_single_worker_serves_waiting_user_second() {
    let rig = create_test_downloader(Behavior::Succeed, |c| {
        c.queue.capacity = 20;
        c.queue.max_outstanding_per_user = 10;
    })
    .await;

    let mut handles = Vec::new();
    for i in 0..10 {
        handles.push(
            rig.downloader
                .submit(Submission::new("a", url(&format!("a{i}"))))
                .await
                .unwrap(),
        );
    }
    handles.push(
        rig.downloader
            .submit(Submission::new("b", url("b0")))
            .await
            .unwrap(),
    );

    rig.downloader.start().await;
    for handle in handles {
        handle.wait().await.unwrap();
    }

    let order = rig.fetcher.started_urls();
    assert_eq!(order.len(), 11);
    assert_eq!(order[0], url("a0"));
    assert_eq!(order[1], url("b0"));
    // the rest of A's requests keep FIFO order
    let rest: Vec<String> = (1..10).map(|i| url(&format!("a{i}"))).collect();
    assert_eq!(order[2..], rest[..]);
}

#[tokio::test]
async fn test_transient_failure_is_retried_until_success() {
    let rig = create_test_downloader(Behavior::Succeed, |_| {}).await;
    rig.fetcher.script(
        &url("flaky"),
        Behavior::FailTimes(2, FetchError::transient("HTTP Error 503")),
    );
    let mut events = rig.downloader.subscribe();
    rig.downloader.start().await;

    let handle = rig
        .downloader
        .submit(Submission::new("u", url("flaky")))
        .await
        .unwrap();
    let id = handle.id();
    let record = handle.wait().await.unwrap();

    assert_eq!(record.state(), RequestState::Succeeded);
    assert_eq!(record.attempts, 3);
    assert_eq!(
        rig.fetcher.calls(),
        vec![(url("flaky"), 1), (url("flaky"), 2), (url("flaky"), 3)]
    );

    let mut delays = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::RetryScheduled {
            id: event_id,
            attempt,
            delay_ms,
            error,
        } = event
        {
            assert_eq!(event_id, id);
            assert_eq!(error.kind, FailureKind::Transient);
            delays.push((attempt, delay_ms));
        }
    }
    assert_eq!(delays, vec![(1, 20), (2, 40)]);
}

#[tokio::test]
async fn test_always_transient_fails_after_max_attempts() {
    let rig = create_test_downloader(
        Behavior::Fail(FetchError::transient("connection reset")),
        |c| {
            c.retry.max_attempts = 4;
            c.retry.jitter = true;
        },
    )
    .await;
    let mut events = rig.downloader.subscribe();
    rig.downloader.start().await;

    let handle = rig
        .downloader
        .submit(Submission::new("u", url("down")))
        .await
        .unwrap();
    let record = handle.wait().await.unwrap();

    assert_eq!(record.state(), RequestState::Failed);
    assert_eq!(record.attempts, 4);
    assert_eq!(record.result.failure_kind(), Some(FailureKind::Transient));
    assert_eq!(rig.fetcher.calls().len(), 4);

    let delays: Vec<u64> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|e| match e {
            Event::RetryScheduled { delay_ms, .. } => Some(delay_ms),
            _ => None,
        })
        .collect();
    assert_eq!(delays.len(), 3);
    assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{delays:?}");
    assert!(delays.iter().all(|d| *d <= 200));
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let rig = create_test_downloader(
        Behavior::Fail(FetchError::permanent("Private video")),
        |_| {},
    )
    .await;
    rig.downloader.start().await;

    let handle = rig
        .downloader
        .submit(Submission::new("u", url("private")))
        .await
        .unwrap();
    let id = handle.id();
    let record = handle.wait().await.unwrap();

    assert_eq!(record.state(), RequestState::Failed);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.result.failure_kind(), Some(FailureKind::Permanent));
    assert!(!rig.downloader.request_dir(id).exists());
    assert_eq!(rig.downloader.snapshot().await.failed, 1);
}

#[tokio::test]
async fn test_unsupported_failure_is_not_retried() {
    let rig = create_test_downloader(
        Behavior::Fail(FetchError::unsupported("Unsupported URL")),
        |_| {},
    )
    .await;
    rig.downloader.start().await;

    let record = rig
        .downloader
        .submit(Submission::new("u", url("x")))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(record.attempts, 1);
    assert_eq!(record.result.failure_kind(), Some(FailureKind::Unsupported));
}

#[tokio::test]
async fn test_fetch_panic_is_internal_and_worker_survives() {
    let rig = create_test_downloader(Behavior::Succeed, |_| {}).await;
    rig.fetcher.script(&url("boom"), Behavior::Panic);
    rig.downloader.start().await;

    let boom = rig
        .downloader
        .submit(Submission::new("u", url("boom")))
        .await
        .unwrap();
    let ok = rig
        .downloader
        .submit(Submission::new("u", url("fine")))
        .await
        .unwrap();

    let record = boom.wait().await.unwrap();
    assert_eq!(record.state(), RequestState::Failed);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.result.failure_kind(), Some(FailureKind::Internal));

    let record = ok.wait().await.unwrap();
    assert_eq!(record.state(), RequestState::Succeeded);
}

#[tokio::test]
async fn test_timeout_cancels_fetch_and_fails_at_ceiling() {
    let rig = create_test_downloader(Behavior::HangUntilCancelled, |c| {
        c.queue.fetch_timeout = Duration::from_millis(50);
        c.retry.max_attempts = 2;
    })
    .await;
    rig.downloader.start().await;

    let record = rig
        .downloader
        .submit(Submission::new("u", url("slow")))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(record.state(), RequestState::Failed);
    assert_eq!(record.attempts, 2);
    assert_eq!(record.result.failure_kind(), Some(FailureKind::Timeout));
}

#[tokio::test]
async fn test_waiting_retry_is_visible_in_snapshot() {
    let rig = create_test_downloader(
        Behavior::Fail(FetchError::transient("HTTP Error 429")),
        |c| {
            c.retry.initial_delay = Duration::from_secs(30);
            c.retry.max_delay = Duration::from_secs(60);
        },
    )
    .await;
    let mut events = rig.downloader.subscribe();
    rig.downloader.start().await;

    let handle = rig
        .downloader
        .submit(Submission::new("u", url("throttled")))
        .await
        .unwrap();
    wait_for_event(&mut events, |e| matches!(e, Event::RetryScheduled { .. })).await;

    let snapshot = rig.downloader.snapshot().await;
    assert_eq!(snapshot.queued, 1);
    assert_eq!(snapshot.waiting_retry, 1);
    assert_eq!(snapshot.running, 0);

    let view = rig.downloader.status(handle.id()).await.unwrap();
    assert_eq!(view.state, RequestState::Queued);
    assert_eq!(view.attempt_count, 1);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let rig = create_test_downloader(Behavior::Succeed, |c| {
        c.queue.max_concurrent = 2;
    })
    .await;
    rig.downloader.start().await;
    rig.downloader.start().await;

    // two workers plus the two sweepers
    assert_eq!(rig.downloader.queue_state.tasks.lock().await.len(), 4);
}

#[tokio::test]
async fn test_unbounded_backoff_parks_request_in_queue() {
    let rig = create_test_downloader(Behavior::Fail(FetchError::transient("HTTP 503")), |c| {
        c.retry.initial_delay = Duration::from_secs(u64::MAX);
        c.retry.max_delay = Duration::from_secs(u64::MAX);
    })
    .await;
    let mut events = rig.downloader.subscribe();
    rig.downloader.start().await;

    let handle = rig
        .downloader
        .submit(Submission::new("alice", url("backoff")))
        .await
        .unwrap();
    let id = handle.id();
    wait_for_event(&mut events, |e| matches!(e, Event::RetryScheduled { id: e_id, .. } if *e_id == id))
        .await;

    let snapshot = rig.downloader.snapshot().await;
    assert_eq!(snapshot.running, 0);
    assert_eq!(snapshot.queued, 1);
    assert_eq!(snapshot.waiting_retry, 1);

    // the worker is still free for other users
    rig.fetcher.script(&url("other"), Behavior::Succeed);
    let other = rig
        .downloader
        .submit(Submission::new("bob", url("other")))
        .await
        .unwrap();
    assert_eq!(other.wait().await.unwrap().state(), RequestState::Succeeded);

    rig.downloader.cancel(id).await.unwrap();
    assert_eq!(handle.wait().await.unwrap().state(), RequestState::Cancelled);
}

#[tokio::test]
async fn test_abandoned_attempt_fails_request_and_frees_slot() {
    let rig = create_test_downloader(Behavior::Succeed, |_| {}).await;

    let handle = rig
        .downloader
        .submit(Submission::new("alice", url("lost")))
        .await
        .unwrap();
    let id = handle.id();
    let job = rig.downloader.dispatch_next().await.unwrap();
    assert_eq!(job.request.id, id);
    assert_eq!(rig.downloader.snapshot().await.running, 1);

    rig.downloader.abandon_request(id, "job task panicked").await;
    let record = handle.wait().await.unwrap();
    assert_eq!(record.state(), RequestState::Failed);
    assert_eq!(record.result.failure_kind(), Some(FailureKind::Internal));
    assert!(!rig.downloader.request_dir(id).exists());

    // a request that already finished is left alone
    rig.downloader.abandon_request(id, "job task panicked").await;
    let snapshot = rig.downloader.snapshot().await;
    assert_eq!(snapshot.running, 0);
    assert_eq!(snapshot.failed, 1);
    assert_eq!(rig.sink.wait_for(1).await.len(), 1);

    rig.downloader.start().await;
    let next = rig
        .downloader
        .submit(Submission::new("alice", url("after")))
        .await
        .unwrap();
    assert_eq!(next.wait().await.unwrap().state(), RequestState::Succeeded);
}

#[tokio::test]
async fn test_failing_sink_leaves_queue_state_intact() {
    let rig = create_test_downloader_with_sink(Behavior::Succeed, RecordingSink::failing(), |c| {
        c.queue.max_concurrent = 2;
    })
    .await;
    rig.fetcher
        .script(&url("gone"), Behavior::Fail(FetchError::permanent("Video unavailable")));
    rig.downloader.start().await;

    let mut handles = Vec::new();
    for (user, tag) in [("alice", "a1"), ("alice", "gone"), ("bob", "b1")] {
        handles.push(
            rig.downloader
                .submit(Submission::new(user, url(tag)))
                .await
                .unwrap(),
        );
    }
    let mut states = Vec::new();
    for handle in handles {
        states.push(handle.wait().await.unwrap().state());
    }
    assert_eq!(
        states,
        vec![
            RequestState::Succeeded,
            RequestState::Failed,
            RequestState::Succeeded
        ]
    );
    assert_eq!(rig.sink.wait_for(3).await.len(), 3);

    let snapshot = rig.downloader.snapshot().await;
    assert_eq!(snapshot.running, 0);
    assert_eq!(snapshot.queued, 0);
    assert_eq!(snapshot.succeeded, 2);
    assert_eq!(snapshot.failed, 1);
    assert!(snapshot.per_user.is_empty());
    assert_eq!(rig.downloader.held_artifacts().await, 2);

    let later = rig
        .downloader
        .submit(Submission::new("carol", url("c1")))
        .await
        .unwrap();
    assert_eq!(later.wait().await.unwrap().state(), RequestState::Succeeded);
    assert_eq!(rig.sink.wait_for(4).await.len(), 4);
}
