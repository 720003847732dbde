//! Shared data models for the reel media transform service.
//!
//! This crate provides Serde-serializable types for:
//! - Job identifiers and progress payloads
//! - Operations and their validated option payloads
//! - Transform requests handed to the executor

pub mod color;
pub mod error;
pub mod job;
pub mod operation;
pub mod request;

pub use color::{Color, KeyColor};
pub use error::{ValidationError, ValidationResult};
pub use job::{JobId, ProgressEvent, ProgressPayload};
pub use operation::{
    Background, ChromaKeyOptions, MergeOptions, Operation, OperationKind, RemoveBackgroundMode,
    SilentInput,
};
pub use request::{RemoveBackgroundForm, TransformRequest};
