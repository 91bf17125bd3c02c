//! Admission - validation, rate limiting and capacity checks.

use crate::error::{Rejection, Result};
use crate::platforms::Platform;
use crate::rate_limiter::RateDecision;
use crate::types::{
    Event, Quality, RequestHandle, RequestId, RequestState, Submission, UserId, UserPreferences,
};
use chrono::Utc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::{MediaDownloader, TrackedRequest};

/// A submission that passed validation
struct Validated {
    submission: Submission,
    platform: Platform,
    quality: Quality,
    max_duration_secs: Option<u64>,
}

impl MediaDownloader {
    /// Submit a request on behalf of a user
    ///
    /// Validates the URL and quality, consults the per-user rate limiter, then
    /// admits the request. With a history database, a submission without a
    /// quality uses the user's preferred quality and the user's duration
    /// ceiling applies to the fetch. Returns as soon as the request is queued; the fetch
    /// itself happens on a worker and its outcome arrives through the returned
    /// handle and the event stream.
    ///
    /// Validation failures do not count against the user's rate limit, and a
    /// request the queue rejects after the limiter allowed it is refunded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`](crate::Error::Rejected) with the reason the
    /// submission was not admitted.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use media_queue::*;
    /// # async fn example(downloader: MediaDownloader) -> Result<()> {
    /// let handle = downloader
    ///     .submit(Submission::new("42", "https://youtu.be/dQw4w9WgXcQ").with_quality("480p"))
    ///     .await?;
    /// println!("queued as #{} at position {}", handle.id(), handle.position());
    ///
    /// let record = handle.wait().await?;
    /// println!("finished: {}", record.state());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit(&self, submission: Submission) -> Result<RequestHandle> {
        let validated = self.validate(submission).await?;
        let user_id = validated.submission.user_id.clone();

        if let RateDecision::Denied { retry_after } =
            self.limiter.check_and_record(&user_id).await
        {
            return Err(Rejection::RateLimited { retry_after }.into());
        }

        match self.admit(validated).await {
            Ok(handle) => Ok(handle),
            Err(rejection) => {
                self.limiter.release(&user_id).await;
                Err(rejection.into())
            }
        }
    }

    /// Admit a request without consulting the rate limiter
    ///
    /// Validation, capacity, per-user and shutdown checks still apply.
    pub async fn enqueue(&self, submission: Submission) -> Result<RequestHandle> {
        let validated = self.validate(submission).await?;
        Ok(self.admit(validated).await?)
    }

    /// 1-based position of the user's first queued request
    pub async fn position(&self, user_id: &UserId) -> Option<usize> {
        let inner = self.queue_state.inner.lock().await;
        inner
            .queued
            .iter()
            .position(|id| {
                inner
                    .requests
                    .get(id)
                    .is_some_and(|r| &r.user_id == user_id)
            })
            .map(|p| p + 1)
    }

    async fn validate(&self, submission: Submission) -> std::result::Result<Validated, Rejection> {
        let platform = self.policy.check(&submission.url)?;
        let requested = submission
            .quality
            .as_deref()
            .map(str::parse::<Quality>)
            .transpose()?;

        let preferences = self.stored_preferences(&submission.user_id).await;
        let preferred = preferences.as_ref().and_then(|p| p.preferred_quality);
        let quality = requested
            .or(preferred)
            .unwrap_or(self.config.queue.default_quality);

        Ok(Validated {
            submission,
            platform,
            quality,
            max_duration_secs: preferences.and_then(|p| p.max_duration_secs),
        })
    }

    /// Preferences from the history database; lookup failures fall back to defaults
    async fn stored_preferences(&self, user_id: &UserId) -> Option<UserPreferences> {
        let db = self.history.as_ref()?;
        match db.get_user_preferences(user_id).await {
            Ok(preferences) => preferences,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Failed to load user preferences, using defaults"
                );
                None
            }
        }
    }

    async fn admit(&self, validated: Validated) -> std::result::Result<RequestHandle, Rejection> {
        let Validated {
            submission,
            platform,
            quality,
            max_duration_secs,
        } = validated;
        let queue_config = &self.config.queue;

        let (id, position, completion) = {
            let mut inner = self.queue_state.inner.lock().await;

            if !inner.accepting {
                return Err(Rejection::ShuttingDown);
            }

            let outstanding = inner.queued.len() + inner.running;
            if outstanding >= queue_config.capacity {
                tracing::debug!(
                    user_id = %submission.user_id,
                    outstanding,
                    capacity = queue_config.capacity,
                    "Queue full"
                );
                return Err(Rejection::QueueFull {
                    capacity: queue_config.capacity,
                    retry_after: queue_config.capacity_retry_hint,
                });
            }

            if inner.user_counts(&submission.user_id).outstanding()
                >= queue_config.max_outstanding_per_user
            {
                return Err(Rejection::UserLimit {
                    user_id: submission.user_id.to_string(),
                    limit: queue_config.max_outstanding_per_user,
                    retry_after: queue_config.capacity_retry_hint,
                });
            }

            let id = RequestId(inner.next_id);
            inner.next_id += 1;

            let (tx, rx) = oneshot::channel();
            let user_id = submission.user_id.clone();
            inner.requests.insert(
                id,
                TrackedRequest {
                    id,
                    user_id: submission.user_id,
                    username: submission.username,
                    url: submission.url,
                    platform,
                    quality,
                    max_duration_secs,
                    submitted_at: Utc::now(),
                    state: RequestState::Queued,
                    attempt_count: 0,
                    not_before: None,
                    last_delay: None,
                    cancel_token: CancellationToken::new(),
                    cancel_requested: false,
                    dir: self.request_dir(id),
                    completion: Some(tx),
                },
            );
            inner.queued.insert(id);
            inner.per_user.entry(user_id.clone()).or_default().queued += 1;

            let position = inner.queued.len();
            tracing::info!(
                request_id = id.0,
                user_id = %user_id,
                platform = %platform,
                quality = %quality,
                position,
                "Request queued"
            );
            (id, position, (rx, user_id))
        };

        let (rx, user_id) = completion;
        self.emit_event(Event::Queued {
            id,
            user_id,
            position,
        });
        self.queue_state.work_available.notify_one();

        Ok(RequestHandle::new(id, position, rx))
    }
}
