//! Folds an executor's progress channel into the registry.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use reel_models::{JobId, ProgressEvent};

use crate::registry::JobRegistry;

/// Capacity of a job's progress channel.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Create the channel an executor writes a job's progress events into.
pub fn progress_channel() -> (mpsc::Sender<ProgressEvent>, mpsc::Receiver<ProgressEvent>) {
    mpsc::channel(PROGRESS_CHANNEL_CAPACITY)
}

/// Write every event for `job_id` into the registry until the sender closes.
///
/// The stored percentage never goes below what the registry already held when
/// an event arrives, so status text written by the boundary before the engine
/// started cannot make a subscriber see progress regress. Returns the last
/// event received.
pub async fn fold_progress(
    registry: JobRegistry,
    job_id: JobId,
    mut events: mpsc::Receiver<ProgressEvent>,
) -> Option<ProgressEvent> {
    let mut last = None;

    while let Some(event) = events.recv().await {
        let floor = registry
            .get(&job_id)
            .await
            .map(|snapshot| snapshot.progress)
            .unwrap_or(0);
        registry
            .set(&job_id, event.percent().max(floor), event.status())
            .await;
        last = Some(event);
    }

    last
}

/// Run [`fold_progress`] on its own task.
pub fn spawn_updater(
    registry: JobRegistry,
    job_id: JobId,
    events: mpsc::Receiver<ProgressEvent>,
) -> JoinHandle<Option<ProgressEvent>> {
    tokio::spawn(fold_progress(registry, job_id, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_events_are_folded_in_order() {
        let registry = JobRegistry::new();
        let job = JobId::parse("merge_fold").unwrap();
        let (tx, rx) = progress_channel();
        let updater = spawn_updater(registry.clone(), job.clone(), rx);

        tx.send(ProgressEvent::progress(0, "Starting merge process..."))
            .await
            .unwrap();
        tx.send(ProgressEvent::progress(48, "Merging videos: 48%"))
            .await
            .unwrap();
        tx.send(ProgressEvent::completed("Complete!")).await.unwrap();
        drop(tx);

        let last = assert_ok!(updater.await);
        assert_eq!(last, Some(ProgressEvent::completed("Complete!")));

        let snap = registry.get(&job).await.unwrap();
        assert_eq!(snap.progress, 100);
        assert_eq!(snap.status, "Complete!");
    }

    #[tokio::test]
    async fn test_start_event_does_not_lower_boundary_progress() {
        let registry = JobRegistry::new();
        let job = JobId::parse("remove_bg_fold").unwrap();
        registry.set(&job, 5, "Processing video...").await;

        let (tx, rx) = progress_channel();
        tx.send(ProgressEvent::progress(
            0,
            "Starting optimized background removal...",
        ))
        .await
        .unwrap();
        drop(tx);
        fold_progress(registry.clone(), job.clone(), rx).await;

        let snap = registry.get(&job).await.unwrap();
        assert_eq!(snap.progress, 5);
        assert_eq!(snap.status, "Starting optimized background removal...");
    }

    #[tokio::test]
    async fn test_empty_channel_leaves_registry_untouched() {
        let registry = JobRegistry::new();
        let job = JobId::parse("enhance_empty").unwrap();
        let (tx, rx) = progress_channel();
        drop(tx);

        assert_eq!(fold_progress(registry.clone(), job.clone(), rx).await, None);
        assert!(registry.get(&job).await.is_none());
    }
}
