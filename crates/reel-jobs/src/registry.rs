//! Process-wide job registry.
//!
//! Maps a [`JobId`] to its latest progress snapshot. Entries are created by the
//! first `set`, removed by `clear` or by the reaper once they go stale.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use reel_models::{JobId, ProgressPayload};

/// Latest known state of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub progress: u8,
    pub status: String,
    pub last_updated: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn payload(&self) -> ProgressPayload {
        ProgressPayload {
            progress: self.progress,
            status: self.status.clone(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= 100
    }
}

#[derive(Debug)]
struct Entry {
    snapshot: JobSnapshot,
    // Monotonic clock for reaping; wall clock lives in the snapshot.
    touched: Instant,
}

/// Shared handle to the registry. Clones see the same map.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, Entry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a job's progress. Values above 100 are stored as 100.
    pub async fn set(&self, job_id: &JobId, progress: u8, status: impl Into<String>) {
        let entry = Entry {
            snapshot: JobSnapshot {
                progress: progress.min(100),
                status: status.into(),
                last_updated: Utc::now(),
            },
            touched: Instant::now(),
        };
        self.jobs.write().await.insert(job_id.clone(), entry);
    }

    pub async fn get(&self, job_id: &JobId) -> Option<JobSnapshot> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|entry| entry.snapshot.clone())
    }

    /// Remove a job. Clearing an absent id is a no-op; returns whether it existed.
    pub async fn clear(&self, job_id: &JobId) -> bool {
        self.jobs.write().await.remove(job_id).is_some()
    }

    /// Remove a job after `delay`, giving pollers time to observe its last value.
    pub fn clear_after(&self, job_id: JobId, delay: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.clear(&job_id).await;
        })
    }

    /// Remove every job untouched for longer than `retention`, whatever its progress.
    pub async fn sweep(&self, retention: Duration) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|job_id, entry| {
            let keep = entry.touched.elapsed() <= retention;
            if !keep {
                debug!(job_id = %job_id, progress = entry.snapshot.progress, "Reaping stale job");
            }
            keep
        });
        before - jobs.len()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
