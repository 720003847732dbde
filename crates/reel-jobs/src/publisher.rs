//! Progress publisher.
//!
//! Turns registry polling into a stream of [`ProgressPayload`]s for one job.
//! The stream ends after the terminal snapshot (progress 100), after the
//! entry it was following disappears, or when the maximum lifetime elapses.
//! Dropping the stream stops polling.

use futures_util::stream::{self, Stream};
use std::pin::Pin;
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use reel_models::{JobId, ProgressPayload};

use crate::config::PublisherConfig;
use crate::registry::JobRegistry;

/// Gauge of open progress streams.
pub const ACTIVE_SUBSCRIBERS_METRIC: &str = "reel_progress_subscribers";

/// Boxed progress stream handed to the HTTP layer.
pub type ProgressStream = Pin<Box<dyn Stream<Item = ProgressPayload> + Send>>;

/// Creates per-job progress streams over a shared registry.
#[derive(Debug, Clone)]
pub struct ProgressPublisher {
    registry: JobRegistry,
    config: PublisherConfig,
}

impl ProgressPublisher {
    pub fn new(registry: JobRegistry, config: PublisherConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> PublisherConfig {
        self.config
    }

    /// Subscribe to `job_id`.
    ///
    /// The first poll happens immediately. Every later poll emits the current
    /// snapshot whether or not it changed. A job that has not been created yet
    /// is waited for until the lifetime runs out.
    pub fn subscribe(&self, job_id: JobId) -> ProgressStream {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let state = Subscription {
            registry: self.registry.clone(),
            job_id,
            ticker,
            deadline: Instant::now() + self.config.max_lifetime,
            seen: false,
            finished: false,
            _guard: SubscriberGuard::new(),
        };

        Box::pin(stream::unfold(state, |mut sub| async move {
            let payload = sub.next_payload().await?;
            Some((payload, sub))
        }))
    }
}

struct Subscription {
    registry: JobRegistry,
    job_id: JobId,
    ticker: Interval,
    deadline: Instant,
    seen: bool,
    finished: bool,
    _guard: SubscriberGuard,
}

impl Subscription {
    async fn next_payload(&mut self) -> Option<ProgressPayload> {
        if self.finished {
            return None;
        }

        loop {
            tokio::select! {
                _ = self.ticker.tick() => {}
                _ = sleep_until(self.deadline) => {
                    debug!(job_id = %self.job_id, "Progress stream lifetime elapsed");
                    return None;
                }
            }

            match self.registry.get(&self.job_id).await {
                Some(snapshot) => {
                    self.seen = true;
                    if snapshot.is_complete() {
                        self.finished = true;
                    }
                    return Some(snapshot.payload());
                }
                None if self.seen => {
                    debug!(job_id = %self.job_id, "Job left the registry, closing progress stream");
                    return None;
                }
                None => continue,
            }
        }
    }
}

/// Keeps the subscriber gauge in step with live streams.
struct SubscriberGuard;

impl SubscriberGuard {
    fn new() -> Self {
        metrics::gauge!(ACTIVE_SUBSCRIBERS_METRIC).increment(1.0);
        Self
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        metrics::gauge!(ACTIVE_SUBSCRIBERS_METRIC).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;

    fn publisher(registry: &JobRegistry) -> ProgressPublisher {
        ProgressPublisher::new(registry.clone(), PublisherConfig::default())
    }

    fn job(s: &str) -> JobId {
        JobId::parse(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_current_snapshot_immediately() {
        let registry = JobRegistry::new();
        registry.set(&job("a"), 40, "Merging videos: 40%").await;

        let start = Instant::now();
        let mut stream = publisher(&registry).subscribe(job("a"));
        let first = stream.next().await.unwrap();

        assert_eq!(first.progress, 40);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeats_unchanged_snapshots() {
        let registry = JobRegistry::new();
        registry.set(&job("a"), 12, "Cleaning audio: 12%").await;

        let items: Vec<_> = publisher(&registry).subscribe(job("a")).take(3).collect().await;
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|p| p.progress == 12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_after_terminal_event() {
        let registry = JobRegistry::new();
        registry.set(&job("a"), 60, "Enhancing to 4K: 60%").await;

        let mut stream = publisher(&registry).subscribe(job("a"));
        assert_eq!(stream.next().await.unwrap().progress, 60);

        registry.set(&job("a"), 100, "Complete!").await;
        let last = stream.next().await.unwrap();
        assert_eq!(last.progress, 100);
        assert_eq!(last.status, "Complete!");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_job_times_out_silently() {
        let registry = JobRegistry::new();
        let start = Instant::now();

        let items: Vec<_> = publisher(&registry).subscribe(job("ghost")).collect().await;

        assert!(items.is_empty());
        assert_eq!(start.elapsed(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_job_created_later() {
        let registry = JobRegistry::new();
        let mut stream = publisher(&registry).subscribe(job("late"));

        let writer = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            writer.set(&job("late"), 0, "Uploading file(s)...").await;
        });

        let first = stream.next().await.unwrap();
        assert_eq!(first.status, "Uploading file(s)...");
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_when_followed_job_disappears() {
        let registry = JobRegistry::new();
        registry.set(&job("a"), 30, "Removing background: 30%").await;

        let mut stream = publisher(&registry).subscribe(job("a"));
        assert!(stream.next().await.is_some());

        registry.clear(&job("a")).await;
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_seen_by_subscriber_is_monotonic() {
        let registry = JobRegistry::new();
        registry.set(&job("a"), 0, "Uploading file(s)...").await;

        let writer = registry.clone();
        tokio::spawn(async move {
            for p in [5u8, 20, 20, 55, 99] {
                tokio::time::sleep(Duration::from_millis(700)).await;
                writer.set(&job("a"), p, format!("Removing background: {p}%")).await;
            }
            tokio::time::sleep(Duration::from_millis(700)).await;
            writer.set(&job("a"), 100, "Complete!").await;
        });

        let items: Vec<_> = publisher(&registry).subscribe(job("a")).collect().await;
        let values: Vec<u8> = items.iter().map(|p| p.progress).collect();

        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.iter().filter(|v| **v == 100).count(), 1);
        assert_eq!(values.last(), Some(&100));
    }
}
