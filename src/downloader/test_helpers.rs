//! Shared test helpers for creating MediaDownloader instances in tests.

use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::error::{Error, FetchError, Result};
use crate::fetch::{FetchOperation, FetchRequest};
use crate::sink::ResultSink;
use crate::types::{Artifact, CompletionRecord, Event};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// How the scripted fetcher treats one URL
#[derive(Clone, Debug)]
pub(crate) enum Behavior {
    /// Write a small file and succeed
    Succeed,
    /// Fail every attempt with this error
    Fail(FetchError),
    /// Fail the first `n` attempts, then succeed
    FailTimes(u32, FetchError),
    /// Block until the token fires, then report cancellation
    HangUntilCancelled,
    /// Ignore the token, sleep, then succeed
    IgnoreCancel(Duration),
    /// Panic inside the fetch
    Panic,
    /// Wait for a permit on the gate (or cancellation), then succeed
    Gate(Arc<Semaphore>),
    /// Wait for a permit on the gate (or cancellation), then fail
    GateThenFail(Arc<Semaphore>, FetchError),
}

/// Fetcher whose behavior is scripted per URL
pub(crate) struct ScriptedFetcher {
    behaviors: Mutex<HashMap<String, Behavior>>,
    default: Behavior,
    calls: Mutex<Vec<(String, u32)>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    pub(crate) fn new(default: Behavior) -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            default,
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn script(&self, url: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(url.to_string(), behavior);
    }

    /// `(url, attempt)` of every fetch call, in call order
    pub(crate) fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }

    /// Every request handed to the fetcher, in call order
    pub(crate) fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// URLs in the order their first attempt started
    pub(crate) fn started_urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, attempt)| *attempt == 1)
            .map(|(url, _)| url)
            .collect()
    }

    fn behavior_for(&self, url: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

async fn write_artifact(request: &FetchRequest) -> std::result::Result<Artifact, FetchError> {
    let path = request.dest_dir.join("media.mp4");
    tokio::fs::write(&path, b"data")
        .await
        .map_err(|e| FetchError::internal(e.to_string()))?;
    Ok(Artifact {
        path,
        title: format!("clip {}", request.id),
        size_bytes: 4,
        duration_s: Some(1.0),
    })
}

#[async_trait]
impl FetchOperation for ScriptedFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<Artifact, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.url.clone(), request.attempt));
        self.requests.lock().unwrap().push(request.clone());

        match self.behavior_for(&request.url) {
            Behavior::Succeed => write_artifact(request).await,
            Behavior::Fail(error) => Err(error),
            Behavior::FailTimes(n, error) => {
                if request.attempt <= n {
                    Err(error)
                } else {
                    write_artifact(request).await
                }
            }
            Behavior::HangUntilCancelled => {
                cancel.cancelled().await;
                Err(FetchError::cancelled("cancelled"))
            }
            Behavior::IgnoreCancel(duration) => {
                tokio::time::sleep(duration).await;
                write_artifact(request).await
            }
            Behavior::Panic => panic!("scripted fetch panic"),
            Behavior::Gate(gate) => {
                tokio::select! {
                    permit = gate.acquire() => {
                        permit.unwrap().forget();
                        write_artifact(request).await
                    }
                    _ = cancel.cancelled() => Err(FetchError::cancelled("cancelled")),
                }
            }
            Behavior::GateThenFail(gate, error) => {
                tokio::select! {
                    permit = gate.acquire() => {
                        permit.unwrap().forget();
                        Err(error)
                    }
                    _ = cancel.cancelled() => Err(FetchError::cancelled("cancelled")),
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Sink that keeps every record it is handed in memory
///
/// Can be slowed down or made to fail after storing the record.
#[derive(Default)]
pub(crate) struct RecordingSink {
    records: Mutex<Vec<CompletionRecord>>,
    delay: Option<Duration>,
    fail: bool,
}

impl RecordingSink {
    /// Sink that takes `delay` to store each record
    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Sink whose every write reports an error
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn records(&self) -> Vec<CompletionRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Wait until at least `n` records arrived
    pub(crate) async fn wait_for(&self, n: usize) -> Vec<CompletionRecord> {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let records = self.records();
                if records.len() >= n {
                    return records;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("sink did not receive enough records")
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn record(&self, record: &CompletionRecord) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.records.lock().unwrap().push(record.clone());
        if self.fail {
            return Err(Error::Other("history store unavailable".into()));
        }
        Ok(())
    }
}

/// Config suited to tests: temp working dir, fast polling, short un-jittered backoff
pub(crate) fn test_config(work_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.queue.work_dir = work_dir.join("work");
    config.queue.max_concurrent = 1;
    config.queue.capacity = 10;
    config.queue.max_outstanding_per_user = 10;
    config.queue.fetch_timeout = Duration::from_secs(5);
    config.queue.poll_interval_ms = 10;
    config.rate_limit.requests = 100;
    config.retry.jitter = false;
    config.retry.initial_delay = Duration::from_millis(20);
    config.retry.max_delay = Duration::from_millis(200);
    config
}

/// Everything a downloader test needs; keep `_temp_dir` alive for the test
pub(crate) struct TestRig {
    pub(crate) downloader: MediaDownloader,
    pub(crate) fetcher: Arc<ScriptedFetcher>,
    pub(crate) sink: Arc<RecordingSink>,
    pub(crate) _temp_dir: tempfile::TempDir,
}

/// Helper to create a test MediaDownloader with a scripted fetcher.
///
/// `configure` adjusts the test config before the downloader is built. Workers
/// are not started.
pub(crate) async fn create_test_downloader(
    default: Behavior,
    configure: impl FnOnce(&mut Config),
) -> TestRig {
    create_test_downloader_with_sink(default, RecordingSink::default(), configure).await
}

/// Same as [`create_test_downloader`] with a specific sink
pub(crate) async fn create_test_downloader_with_sink(
    default: Behavior,
    sink: RecordingSink,
    configure: impl FnOnce(&mut Config),
) -> TestRig {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    configure(&mut config);

    let fetcher = Arc::new(ScriptedFetcher::new(default));
    let sink = Arc::new(sink);
    let downloader = MediaDownloader::new(config, fetcher.clone(), sink.clone())
        .await
        .unwrap();

    TestRig {
        downloader,
        fetcher,
        sink,
        _temp_dir: temp_dir,
    }
}

/// A supported URL unique to `tag`
pub(crate) fn url(tag: &str) -> String {
    format!("https://www.youtube.com/watch?v={tag}")
}

/// Collect events until one matches `pred` (or time out)
pub(crate) async fn wait_for_event(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => {}
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
