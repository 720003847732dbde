//! Application state.

use reel_jobs::{JobRegistry, JobsConfig, ProgressPublisher, PublisherConfig};
use reel_media::{EngineConfig, TransformExecutor};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: JobsConfig,
    pub executor: TransformExecutor,
    pub registry: JobRegistry,
    pub publisher: ProgressPublisher,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        engine: EngineConfig,
        jobs: JobsConfig,
        publisher: PublisherConfig,
    ) -> Self {
        let registry = JobRegistry::new();
        Self {
            config,
            jobs,
            executor: TransformExecutor::new(engine),
            publisher: ProgressPublisher::new(registry.clone(), publisher),
            registry,
        }
    }

    /// Build every component from environment variables.
    pub fn from_env(config: ApiConfig) -> Self {
        Self::new(
            config,
            EngineConfig::from_env(),
            JobsConfig::from_env(),
            PublisherConfig::from_env(),
        )
    }
}
