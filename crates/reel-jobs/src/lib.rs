//! In-memory job tracking for the reel transform service.
//!
//! This crate provides:
//! - The process-wide job registry and its reaper
//! - The updater folding executor progress events into the registry
//! - The progress publisher streaming registry snapshots to subscribers

pub mod config;
pub mod publisher;
pub mod reaper;
pub mod registry;
pub mod updater;

pub use config::{JobsConfig, PublisherConfig};
pub use publisher::{ProgressPublisher, ProgressStream};
pub use reaper::{spawn_reaper, ReaperHandle};
pub use registry::{JobRegistry, JobSnapshot};
pub use updater::{fold_progress, progress_channel, spawn_updater};
