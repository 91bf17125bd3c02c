//! Cancellation and status lookups.

use crate::error::{DownloadError, Result};
use crate::types::{RequestId, RequestResult, RequestState, RequestView, UserId};

use super::{Finished, MediaDownloader, QueueInner};

/// What a cancel did under the lock
pub(super) enum Cancelled {
    /// Queued request removed; deliver it
    Queued(Finished),
    /// Running request signalled; it finishes when its fetch returns
    Signalled,
}

impl MediaDownloader {
    /// Cancel a request
    ///
    /// A queued request (including one waiting out a retry backoff) is removed
    /// and becomes `Cancelled` immediately. A running request has its
    /// cancellation token fired and becomes `Cancelled` once the fetch returns;
    /// any artifact it produced is discarded. Cancelling a running request
    /// twice is a no-op.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::AlreadyTerminal`] if the request recently finished
    /// - [`DownloadError::NotFound`] if the request is unknown
    pub async fn cancel(&self, id: RequestId) -> Result<()> {
        let outcome = {
            let mut inner = self.queue_state.inner.lock().await;
            cancel_locked(&mut inner, id)?
        };

        if let Cancelled::Queued(finished) = outcome {
            self.deliver(finished).await;
        } else {
            tracing::info!(request_id = id.0, "Cancellation signalled to running request");
        }
        Ok(())
    }

    /// Cancel every queued or running request of a user
    ///
    /// Returns the number of requests cancelled or signalled.
    pub async fn cancel_user(&self, user_id: &UserId) -> usize {
        let (finished, signalled) = {
            let mut inner = self.queue_state.inner.lock().await;
            let ids: Vec<RequestId> = inner
                .requests
                .values()
                .filter(|r| &r.user_id == user_id)
                .map(|r| r.id)
                .collect();

            let mut finished = Vec::new();
            let mut signalled = 0;
            for id in ids {
                match cancel_locked(&mut inner, id) {
                    Ok(Cancelled::Queued(f)) => finished.push(f),
                    Ok(Cancelled::Signalled) => signalled += 1,
                    Err(_) => {}
                }
            }
            (finished, signalled)
        };

        let count = finished.len() + signalled;
        for f in finished {
            self.deliver(f).await;
        }

        if count > 0 {
            tracing::info!(user_id = %user_id, count, "Cancelled all requests of user");
        }
        count
    }

    /// Current view of a request
    ///
    /// Live requests report their queue position; finished requests are
    /// answered from the bounded window of recent completions.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NotFound`] if the request is neither live nor recent.
    pub async fn status(&self, id: RequestId) -> Result<RequestView> {
        let inner = self.queue_state.inner.lock().await;
        if let Some(request) = inner.requests.get(&id) {
            let position = match request.state {
                RequestState::Queued => inner.position_of(id),
                _ => None,
            };
            return Ok(request.view(position));
        }

        inner
            .recent(id)
            .cloned()
            .ok_or_else(|| DownloadError::NotFound { id }.into())
    }
}

/// Cancel one request while holding the queue lock
pub(super) fn cancel_locked(
    inner: &mut QueueInner,
    id: RequestId,
) -> std::result::Result<Cancelled, DownloadError> {
    let Some(request) = inner.requests.get_mut(&id) else {
        return Err(match inner.recent(id) {
            Some(view) => DownloadError::AlreadyTerminal {
                id,
                state: view.state,
            },
            None => DownloadError::NotFound { id },
        });
    };

    match request.state {
        RequestState::Running => {
            request.cancel_requested = true;
            request.cancel_token.cancel();
            Ok(Cancelled::Signalled)
        }
        _ => inner
            .finalize(id, RequestResult::Cancelled)
            .map(Cancelled::Queued)
            .ok_or(DownloadError::NotFound { id }),
    }
}
