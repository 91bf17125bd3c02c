//! Per-user sliding-window admission limiter
//!
//! Each user may be admitted at most `requests` times within any trailing
//! `window`. The decision and the recording of an admission happen under one
//! lock, so concurrent submissions can never both take the last slot.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::types::UserId;

/// Outcome of [`RateLimiter::check_and_record`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    /// Admission recorded
    Allowed,
    /// Window is full
    Denied {
        /// Time until the oldest admission leaves the window
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Whether the admission was recorded
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Admission timestamps inside the trailing window, oldest first
#[derive(Debug, Default)]
struct SlidingWindow {
    admissions: VecDeque<Instant>,
}

impl SlidingWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.admissions.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }

    fn try_admit(&mut self, now: Instant, window: Duration, limit: usize) -> RateDecision {
        self.prune(now, window);
        if self.admissions.len() < limit {
            self.admissions.push_back(now);
            return RateDecision::Allowed;
        }
        let retry_after = self
            .admissions
            .front()
            .map(|&oldest| window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or_default();
        RateDecision::Denied { retry_after }
    }
}

/// Rate limiter with per-user tracking
pub struct RateLimiter {
    /// Per-user admission windows
    windows: Mutex<HashMap<UserId, SlidingWindow>>,
    /// Configuration
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter from configuration
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Decide whether `user_id` may be admitted now, recording the admission if so
    pub async fn check_and_record(&self, user_id: &UserId) -> RateDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let decision = windows.entry(user_id.clone()).or_default().try_admit(
            now,
            self.config.window,
            self.config.requests as usize,
        );

        if let RateDecision::Denied { retry_after } = decision {
            tracing::debug!(
                user_id = %user_id,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit reached"
            );
        }
        decision
    }

    /// Refund the most recent admission of `user_id`
    ///
    /// Used when the queue rejects a request the limiter had already allowed.
    pub async fn release(&self, user_id: &UserId) {
        let mut windows = self.windows.lock().await;
        if let Some(window) = windows.get_mut(user_id) {
            window.admissions.pop_back();
            if window.admissions.is_empty() {
                windows.remove(user_id);
            }
        }
    }

    /// Drop users whose windows hold no live admissions
    ///
    /// Returns the number of users evicted.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| {
            w.prune(now, self.config.window);
            !w.admissions.is_empty()
        });
        let evicted = before - windows.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = windows.len(), "Swept idle rate-limit windows");
        }
        evicted
    }

    /// Number of users currently tracked
    pub async fn tracked_users(&self) -> usize {
        self.windows.lock().await.len()
    }

    /// Configuration in use
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            requests,
            window: Duration::from_secs(window_secs),
            sweep_interval: Duration::from_secs(300),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_per_minute_denies_fourth() {
        let limiter = limiter(3, 60);
        let user = UserId::from("alice");

        let mut decisions = Vec::new();
        for _ in 0..4 {
            decisions.push(limiter.check_and_record(&user).await);
            tokio::time::advance(Duration::from_millis(200)).await;
        }

        let allowed = decisions.iter().filter(|d| d.is_allowed()).count();
        assert_eq!(allowed, 3);
        match decisions[3] {
            RateDecision::Denied { retry_after } => {
                assert!(retry_after <= Duration::from_secs(60));
                // oldest admission was 600ms before the fourth attempt
                assert_eq!(retry_after, Duration::from_millis(59_400));
            }
            RateDecision::Allowed => panic!("fourth request should be denied"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = limiter(2, 10);
        let user = UserId::from("bob");

        assert!(limiter.check_and_record(&user).await.is_allowed());
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(limiter.check_and_record(&user).await.is_allowed());
        assert!(!limiter.check_and_record(&user).await.is_allowed());

        // first admission leaves the window at t=10
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.check_and_record(&user).await.is_allowed());
        assert!(!limiter.check_and_record(&user).await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_are_independent() {
        let limiter = limiter(1, 60);
        assert!(limiter.check_and_record(&"a".into()).await.is_allowed());
        assert!(limiter.check_and_record(&"b".into()).await.is_allowed());
        assert!(!limiter.check_and_record(&"a".into()).await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_refunds_admission() {
        let limiter = limiter(1, 60);
        let user = UserId::from("carol");
        assert!(limiter.check_and_record(&user).await.is_allowed());
        limiter.release(&user).await;
        assert_eq!(limiter.tracked_users().await, 0);
        assert!(limiter.check_and_record(&user).await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_only_idle_users() {
        let limiter = limiter(3, 10);
        limiter.check_and_record(&"old".into()).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        limiter.check_and_record(&"fresh".into()).await;
        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(limiter.sweep().await, 1);
        assert_eq!(limiter.tracked_users().await, 1);
        assert_eq!(limiter.sweep().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_window_denies_without_overflow() {
        let limiter = limiter(1, u64::MAX);
        let user = UserId::from("dave");
        assert!(limiter.check_and_record(&user).await.is_allowed());
        tokio::time::advance(Duration::from_secs(5)).await;

        match limiter.check_and_record(&user).await {
            RateDecision::Denied { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(u64::MAX - 5));
            }
            RateDecision::Allowed => panic!("second request should be denied"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_admissions_never_exceed_limit() {
        let limiter = Arc::new(limiter(5, 60));
        let user = UserId::from("burst");

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                let user = user.clone();
                tokio::spawn(async move { limiter.check_and_record(&user).await })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;
        let allowed = results
            .into_iter()
            .filter(|r| r.as_ref().unwrap().is_allowed())
            .count();
        assert_eq!(allowed, 5);
    }
}
