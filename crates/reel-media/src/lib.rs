#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the reel transforms.
//!
//! This crate provides:
//! - A pure filter graph builder compiling a `TransformRequest` into an engine plan
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - The transform executor and its per-job progress channel
//! - Per-job scratch workspaces removed on drop

pub mod command;
pub mod error;
pub mod executor;
pub mod filters;
pub mod graph;
pub mod logging;
pub mod probe;
pub mod progress;
pub mod workspace;

pub use command::{resolve_binary, EngineInput, FfmpegCommand};
pub use error::{MediaError, MediaResult};
pub use executor::{EngineConfig, TransformExecutor, TransformState, COMPLETE_STATUS};
pub use filters::{build_plan, EnginePlan, GraphArg};
pub use graph::{FilterChain, FilterGraph};
pub use logging::JobLogger;
pub use probe::{probe_media, MediaInfo};
pub use progress::{ProgressGate, ProgressParser, Timeline};
pub use workspace::{delivery_file_name, sanitize_file_name, JobWorkspace};
