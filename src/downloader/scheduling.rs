//! Dispatch order: FIFO with one slot reserved against starvation.
//!
//! All slots but the last free one take the oldest ready request. The last
//! free slot prefers users with nothing running: among those, the user served
//! least recently (never served first) gets their oldest ready request. With a
//! single worker every dispatch fills the last slot, which degrades to
//! round-robin by least-recently-served user.

use crate::types::{RequestId, UserId};
use std::collections::HashMap;
use tokio::time::Instant;

use super::{MediaDownloader, QueueInner};
use crate::fetch::FetchRequest;
use crate::types::{Event, RequestState};
use tokio_util::sync::CancellationToken;

/// A queued request as seen by the scheduler
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'a> {
    pub(crate) id: RequestId,
    pub(crate) user_id: &'a UserId,
    /// False while the request waits out a retry backoff
    pub(crate) ready: bool,
}

/// Choose the next request to start
///
/// `candidates` must be in FIFO (ID) order. Returns `None` when nothing is ready.
pub(crate) fn pick_next(
    candidates: &[Candidate<'_>],
    running: usize,
    workers: usize,
    running_by_user: impl Fn(&UserId) -> usize,
    last_served: &HashMap<UserId, u64>,
) -> Option<RequestId> {
    let first_ready = candidates.iter().find(|c| c.ready)?;

    let filling_last_slot = running + 1 >= workers;
    if filling_last_slot
        && let Some(starved) = candidates
            .iter()
            .filter(|c| c.ready && running_by_user(c.user_id) == 0)
            .min_by_key(|c| (last_served.get(c.user_id).copied(), c.id))
    {
        return Some(starved.id);
    }

    Some(first_ready.id)
}

/// A request claimed by a worker
pub(crate) struct Job {
    pub(crate) request: FetchRequest,
    pub(crate) cancel_token: CancellationToken,
}

impl MediaDownloader {
    /// Claim the next ready request, if any, and mark it running
    pub(crate) async fn dispatch_next(&self) -> Option<Job> {
        let mut inner = self.queue_state.inner.lock().await;

        let id = select_ready(&inner, Instant::now(), self.config.queue.max_concurrent)?;
        let request = inner.mark_running(id)?;

        request.state = RequestState::Running;
        request.attempt_count += 1;
        request.not_before = None;
        request.cancel_token = CancellationToken::new();

        let user_id = request.user_id.clone();
        let job = Job {
            request: FetchRequest {
                id,
                url: request.url.clone(),
                platform: request.platform,
                quality: request.quality,
                max_duration_secs: request.max_duration_secs,
                dest_dir: request.dir.clone(),
                attempt: request.attempt_count,
            },
            cancel_token: request.cancel_token.clone(),
        };

        tracing::debug!(
            request_id = id.0,
            user_id = %user_id,
            attempt = job.request.attempt,
            running = inner.running,
            queued = inner.queued.len(),
            "Dispatching request"
        );
        drop(inner);

        self.emit_event(Event::Started {
            id,
            attempt: job.request.attempt,
        });
        Some(job)
    }
}

fn select_ready(inner: &QueueInner, now: Instant, workers: usize) -> Option<RequestId> {
    let candidates: Vec<Candidate<'_>> = inner
        .queued
        .iter()
        .filter_map(|id| inner.requests.get(id))
        .map(|r| Candidate {
            id: r.id,
            user_id: &r.user_id,
            ready: r.not_before.is_none_or(|t| t <= now),
        })
        .collect();

    pick_next(
        &candidates,
        inner.running,
        workers,
        |user| inner.user_counts(user).running,
        &inner.last_served,
    )
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn users(names: &[&str]) -> Vec<UserId> {
        names.iter().map(|n| UserId::from(*n)).collect()
    }

    fn candidates<'a>(users: &'a [UserId], ready: &[bool]) -> Vec<Candidate<'a>> {
        users
            .iter()
            .zip(ready)
            .enumerate()
            .map(|(i, (u, r))| Candidate {
                id: RequestId(i as u64 + 1),
                user_id: u,
                ready: *r,
            })
            .collect()
    }

    #[test]
    fn test_fifo_when_slots_are_plentiful() {
        let users = users(&["a", "a", "b"]);
        let c = candidates(&users, &[true, true, true]);
        // 3 workers, none running: not the last slot
        let picked = pick_next(&c, 0, 3, |_| 0, &HashMap::new());
        assert_eq!(picked, Some(RequestId(1)));
    }

    #[test]
    fn test_last_slot_goes_to_user_with_nothing_running() {
        let users = users(&["a", "a", "b"]);
        let c = candidates(&users, &[true, true, true]);
        // 2 workers, "a" holds the only running slot
        let running = |u: &UserId| usize::from(u.as_str() == "a");
        let picked = pick_next(&c, 1, 2, running, &HashMap::new());
        assert_eq!(picked, Some(RequestId(3)));
    }

    #[test]
    fn test_last_slot_falls_back_to_fifo() {
        let users = users(&["a", "a"]);
        let c = candidates(&users, &[true, true]);
        let running = |u: &UserId| usize::from(u.as_str() == "a");
        let picked = pick_next(&c, 1, 2, running, &HashMap::new());
        assert_eq!(picked, Some(RequestId(1)));
    }

    #[test]
    fn test_single_worker_round_robins_by_least_recently_served() {
        let users = users(&["a", "a", "a", "b"]);
        let c = candidates(&users, &[true, true, true, true]);
        let mut served = HashMap::new();

        // nobody served yet: oldest request wins
        assert_eq!(pick_next(&c, 0, 1, |_| 0, &served), Some(RequestId(1)));

        // "a" just ran: never-served "b" goes next
        served.insert(UserId::from("a"), 1);
        let remaining: Vec<_> = c[1..].to_vec();
        assert_eq!(pick_next(&remaining, 0, 1, |_| 0, &served), Some(RequestId(4)));

        // both served, "b" more recently: back to "a"
        served.insert(UserId::from("b"), 2);
        let remaining: Vec<_> = c[1..3].to_vec();
        assert_eq!(pick_next(&remaining, 0, 1, |_| 0, &served), Some(RequestId(2)));
    }

    #[test]
    fn test_backoff_requests_are_skipped() {
        let users = users(&["a", "b"]);
        let c = candidates(&users, &[false, true]);
        assert_eq!(pick_next(&c, 0, 3, |_| 0, &HashMap::new()), Some(RequestId(2)));

        let c = candidates(&users, &[false, false]);
        assert_eq!(pick_next(&c, 0, 3, |_| 0, &HashMap::new()), None);
    }

    #[test]
    fn test_starved_user_in_backoff_is_not_preferred() {
        let users = users(&["a", "b"]);
        let c = candidates(&users, &[true, false]);
        let running = |u: &UserId| usize::from(u.as_str() == "a");
        // "b" has nothing running but is not ready; "a" gets the slot
        assert_eq!(pick_next(&c, 1, 2, running, &HashMap::new()), Some(RequestId(1)));
    }
}
