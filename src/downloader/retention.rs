//! Finished artifacts held on disk until delivery is confirmed or they expire.

use crate::error::{DownloadError, Result};
use crate::types::{ArtifactRemoval, Event, RequestId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::MediaDownloader;

struct StoredArtifact {
    dir: PathBuf,
    expires_at: Instant,
}

/// Working directories of succeeded requests, keyed by request
#[derive(Clone, Default)]
pub(crate) struct ArtifactStore {
    entries: Arc<Mutex<HashMap<RequestId, StoredArtifact>>>,
}

impl ArtifactStore {
    pub(crate) async fn insert(&self, id: RequestId, dir: PathBuf, expires_at: Instant) {
        self.entries
            .lock()
            .await
            .insert(id, StoredArtifact { dir, expires_at });
    }

    async fn take(&self, id: RequestId) -> Option<PathBuf> {
        self.entries.lock().await.remove(&id).map(|a| a.dir)
    }

    async fn take_expired(&self, now: Instant) -> Vec<(RequestId, PathBuf)> {
        let mut entries = self.entries.lock().await;
        let expired: Vec<RequestId> = entries
            .iter()
            .filter(|(_, a)| a.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|a| (id, a.dir)))
            .collect()
    }

    async fn drain_all(&self) -> Vec<(RequestId, PathBuf)> {
        self.entries
            .lock()
            .await
            .drain()
            .map(|(id, a)| (id, a.dir))
            .collect()
    }

    /// Number of artifacts currently held
    pub(crate) async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Remove a request's working directory, tolerating one that is already gone
pub(crate) async fn remove_request_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Delete request directories an earlier process left in `work_dir`
///
/// Only directories named like a request ID are touched. Returns how many
/// were removed.
pub(crate) async fn remove_stale_request_dirs(work_dir: &Path) -> std::io::Result<usize> {
    let mut entries = tokio::fs::read_dir(work_dir).await?;
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let named_like_request = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.parse::<u64>().is_ok());
        if !named_like_request || !entry.file_type().await?.is_dir() {
            continue;
        }
        match remove_request_dir(&entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(
                dir = %entry.path().display(),
                error = %e,
                "Failed to delete stale request directory"
            ),
        }
    }
    Ok(removed)
}

impl MediaDownloader {
    /// Confirm an artifact was delivered and delete it
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NoArtifact`] when no artifact is held for the
    /// request (never succeeded, already confirmed, or already expired).
    pub async fn confirm_delivery(&self, id: RequestId) -> Result<()> {
        let dir = self
            .artifacts
            .take(id)
            .await
            .ok_or(DownloadError::NoArtifact { id })?;

        self.remove_artifact(id, &dir, ArtifactRemoval::Delivered).await;
        Ok(())
    }

    /// Delete every artifact whose retention window has elapsed
    ///
    /// Safe to call concurrently with [`confirm_delivery`](Self::confirm_delivery)
    /// and with itself: each artifact is removed exactly once. Returns the
    /// number of artifacts removed by this call.
    pub async fn sweep_expired_artifacts(&self) -> usize {
        let expired = self.artifacts.take_expired(Instant::now()).await;
        let count = expired.len();

        for (id, dir) in expired {
            self.remove_artifact(id, &dir, ArtifactRemoval::Expired).await;
        }

        if count > 0 {
            tracing::info!(removed = count, "Expired artifacts swept");
        }
        count
    }

    /// Number of finished artifacts awaiting delivery
    pub async fn held_artifacts(&self) -> usize {
        self.artifacts.len().await
    }

    /// Delete every held artifact (shutdown)
    pub(crate) async fn remove_all_artifacts(&self) -> usize {
        let all = self.artifacts.drain_all().await;
        let count = all.len();
        for (id, dir) in all {
            self.remove_artifact(id, &dir, ArtifactRemoval::Shutdown).await;
        }
        count
    }

    async fn remove_artifact(&self, id: RequestId, dir: &Path, reason: ArtifactRemoval) {
        if let Err(e) = remove_request_dir(dir).await {
            tracing::warn!(
                request_id = id.0,
                dir = %dir.display(),
                error = %e,
                "Failed to delete artifact directory"
            );
        } else {
            tracing::debug!(request_id = id.0, ?reason, "Artifact removed");
        }
        self.emit_event(Event::ArtifactRemoved { id, reason });
    }
}
