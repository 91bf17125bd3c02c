//! One fetch attempt: working directory, time budget, retry decision and delivery.

use crate::error::{FailureKind, FetchError};
use crate::fetch::FetchRequest;
use crate::retry::{next_delay, should_retry};
use crate::types::{Artifact, Event, RequestId, RequestResult, RequestState};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::retention::remove_request_dir;
use super::scheduling::Job;
use super::{Finished, MediaDownloader};

/// What the queue decided after an attempt
enum AttemptOutcome {
    Finished(Finished),
    Retry {
        attempt: u32,
        delay: Duration,
        error: FetchError,
    },
}

impl MediaDownloader {
    /// Run a claimed request to the end of its current attempt
    pub(crate) async fn run_job(&self, job: Job) {
        let Job {
            request,
            cancel_token,
        } = job;
        let id = request.id;

        let result = match prepare_dir(&request.dest_dir).await {
            Ok(()) => self.fetch_with_timeout(&request, cancel_token).await,
            Err(e) => Err(FetchError::internal(format!(
                "Failed to prepare working directory '{}': {}",
                request.dest_dir.display(),
                e
            ))),
        };

        if result.is_err()
            && let Err(e) = remove_request_dir(&request.dest_dir).await
        {
            tracing::warn!(request_id = id.0, error = %e, "Failed to clean up after attempt");
        }

        self.complete_attempt(id, result).await;
    }

    /// Call the fetcher in its own task, bounded by the configured time budget
    ///
    /// On timeout the attempt's token fires and the worker waits for the fetch
    /// to return before classifying the attempt as a timeout.
    async fn fetch_with_timeout(
        &self,
        request: &FetchRequest,
        cancel: CancellationToken,
    ) -> Result<Artifact, FetchError> {
        let budget = self.config.queue.fetch_timeout;
        let fetcher = Arc::clone(&self.fetcher);
        let fetch_request = request.clone();
        let token = cancel.clone();
        let mut handle =
            tokio::spawn(async move { fetcher.fetch(&fetch_request, token).await });

        match tokio::time::timeout(budget, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(panicked(request.id, join_err)),
            Err(_) => {
                tracing::warn!(
                    request_id = request.id.0,
                    timeout_secs = budget.as_secs_f64(),
                    "Fetch exceeded its time budget, cancelling"
                );
                cancel.cancel();
                if let Err(join_err) = handle.await {
                    return Err(panicked(request.id, join_err));
                }
                Err(FetchError::timeout(format!(
                    "Fetch did not finish within {}s",
                    budget.as_secs()
                )))
            }
        }
    }

    /// Record the result of an attempt: terminal state or a scheduled retry
    async fn complete_attempt(&self, id: RequestId, result: Result<Artifact, FetchError>) {
        let outcome = {
            let mut inner = self.queue_state.inner.lock().await;
            let accepting = inner.accepting;

            let Some(request) = inner.requests.get_mut(&id) else {
                tracing::error!(request_id = id.0, "Completed request missing from queue");
                return;
            };
            let attempt = request.attempt_count;
            let cancelled = request.cancel_requested
                || matches!(&result, Err(e) if e.kind == FailureKind::Cancelled);

            let decision = match result {
                _ if cancelled => Decision::Terminal(RequestResult::Cancelled),
                Ok(artifact) => Decision::Terminal(RequestResult::Succeeded { artifact }),
                Err(error) if accepting && should_retry(&self.config.retry, &error, attempt) => {
                    let delay = next_delay(&self.config.retry, attempt, request.last_delay);
                    request.last_delay = Some(delay);
                    request.not_before = Some(instant_after(delay));
                    request.state = RequestState::Queued;
                    Decision::Retry(AttemptOutcome::Retry {
                        attempt,
                        delay,
                        error,
                    })
                }
                Err(error) => Decision::Terminal(RequestResult::Failed { error }),
            };

            match decision {
                Decision::Terminal(result) => match inner.finalize(id, result) {
                    Some(finished) => AttemptOutcome::Finished(finished),
                    None => return,
                },
                Decision::Retry(retry) => {
                    inner.mark_requeued(id);
                    retry
                }
            }
        };

        match outcome {
            AttemptOutcome::Finished(finished) => self.deliver(finished).await,
            AttemptOutcome::Retry {
                attempt,
                delay,
                error,
            } => self.schedule_retry(id, attempt, delay, error),
        }
    }

    fn schedule_retry(&self, id: RequestId, attempt: u32, delay: Duration, error: FetchError) {
        tracing::warn!(
            request_id = id.0,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, retry scheduled"
        );
        self.emit_event(Event::RetryScheduled {
            id,
            attempt,
            delay_ms: delay.as_millis() as u64,
            error,
        });

        // Wake a worker once the backoff elapses; idle polling covers a missed wakeup
        let queue_state = self.queue_state.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => queue_state.work_available.notify_one(),
                _ = queue_state.shutdown.cancelled() => {}
            }
        });
    }

    /// Hand a terminal request to its waiters, the event stream and the sink
    pub(crate) async fn deliver(&self, finished: Finished) {
        let Finished {
            record,
            completion,
            dir,
        } = finished;
        let id = record.id;

        match &record.result {
            RequestResult::Succeeded { artifact } => {
                let expires_at = instant_after(self.config.retention.retention);
                self.artifacts.insert(id, dir, expires_at).await;
                tracing::info!(
                    request_id = id.0,
                    user_id = %record.user_id,
                    title = %artifact.title,
                    size_bytes = artifact.size_bytes,
                    attempts = record.attempts,
                    "Request succeeded"
                );
                self.emit_event(Event::Succeeded {
                    id,
                    artifact: artifact.clone(),
                });
            }
            RequestResult::Failed { error } => {
                discard_dir(id, &dir).await;
                tracing::error!(
                    request_id = id.0,
                    user_id = %record.user_id,
                    kind = %error.kind,
                    error = %error.message,
                    attempts = record.attempts,
                    "Request failed"
                );
                self.emit_event(Event::Failed {
                    id,
                    error: error.clone(),
                    attempts: record.attempts,
                });
            }
            RequestResult::Cancelled => {
                discard_dir(id, &dir).await;
                tracing::info!(request_id = id.0, user_id = %record.user_id, "Request cancelled");
                self.emit_event(Event::Cancelled { id });
            }
        }

        if let Some(tx) = completion {
            // the handle may have been dropped
            tx.send(record.clone()).ok();
        }

        let sink = Arc::clone(&self.sink);
        self.queue_state.sink_writes.spawn(async move {
            if let Err(e) = sink.record(&record).await {
                tracing::warn!(request_id = record.id.0, error = %e, "Result sink failed");
            }
        });
    }
}

impl MediaDownloader {
    /// Fail a request whose attempt ended without reaching a decision
    ///
    /// Used when the attempt task itself died. Does nothing if the request
    /// already reached a terminal state.
    pub(crate) async fn abandon_request(&self, id: RequestId, reason: &str) {
        let finished = {
            let mut inner = self.queue_state.inner.lock().await;
            let error = FetchError::internal(format!("attempt abandoned: {reason}"));
            inner.finalize(id, RequestResult::Failed { error })
        };
        if let Some(finished) = finished {
            tracing::error!(request_id = id.0, reason, "Attempt abandoned, request failed");
            self.deliver(finished).await;
        }
    }
}

enum Decision {
    Terminal(RequestResult),
    Retry(AttemptOutcome),
}

/// Furthest deadline used when `now + d` is not representable
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// `now + d`, clamped to a far-future instant when the sum overflows
pub(crate) fn instant_after(d: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(d)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Start every attempt from an empty directory
async fn prepare_dir(dir: &Path) -> std::io::Result<()> {
    remove_request_dir(dir).await?;
    tokio::fs::create_dir_all(dir).await
}

async fn discard_dir(id: RequestId, dir: &Path) {
    if let Err(e) = remove_request_dir(dir).await {
        tracing::warn!(
            request_id = id.0,
            dir = %dir.display(),
            error = %e,
            "Failed to delete working directory"
        );
    }
}

fn panicked(id: RequestId, err: tokio::task::JoinError) -> FetchError {
    tracing::error!(request_id = id.0, error = %err, "Fetch task panicked");
    FetchError::internal(format!("fetch task panicked: {}", err))
}
