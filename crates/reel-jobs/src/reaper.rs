//! Background sweep removing abandoned jobs.

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use crate::config::JobsConfig;
use crate::registry::JobRegistry;

/// Counter of jobs removed by the reaper.
pub const REAPED_JOBS_METRIC: &str = "reel_jobs_reaped_total";

/// Owns the reaper task; dropping the handle stops it.
#[derive(Debug)]
pub struct ReaperHandle {
    task: JoinHandle<()>,
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the periodic sweep. The first sweep runs one interval after start.
pub fn spawn_reaper(registry: JobRegistry, config: JobsConfig) -> ReaperHandle {
    info!(
        "Starting job reaper (interval: {:?}, retention: {:?})",
        config.reap_interval, config.retention
    );

    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + config.reap_interval, config.reap_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let reaped = registry.sweep(config.retention).await;
            if reaped > 0 {
                info!(reaped, "Reaped stale jobs");
                metrics::counter!(REAPED_JOBS_METRIC).increment(reaped as u64);
            }
        }
    });

    ReaperHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::JobId;
    use std::time::Duration;

    fn config() -> JobsConfig {
        JobsConfig {
            retention: Duration::from_secs(3600),
            reap_interval: Duration::from_secs(300),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_removes_jobs_past_retention() {
        let registry = JobRegistry::new();
        let job = JobId::parse("enhance_abandoned").unwrap();
        registry.set(&job, 42, "Enhancing to 4K: 42%").await;

        let _reaper = spawn_reaper(registry.clone(), config());

        tokio::time::sleep(Duration::from_secs(3500)).await;
        assert!(registry.get(&job).await.is_some());

        // Next sweep after the hour mark catches it.
        tokio::time::sleep(Duration::from_secs(450)).await;
        assert!(registry.get(&job).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_reaper() {
        let registry = JobRegistry::new();
        let job = JobId::parse("clean_kept").unwrap();
        registry.set(&job, 10, "Cleaning audio: 10%").await;

        let reaper = spawn_reaper(registry.clone(), config());
        drop(reaper);

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert!(registry.get(&job).await.is_some());
    }
}
