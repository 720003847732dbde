//! Job identifiers and progress messages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ValidationError, ValidationResult};
use crate::operation::OperationKind;

/// Longest caller-supplied job id accepted.
const MAX_JOB_ID_LEN: usize = 128;

/// Unique identifier for a transform job; the registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a new id prefixed with the operation, e.g. `merge_3f2a...`.
    pub fn generate(kind: OperationKind) -> Self {
        Self(format!("{}_{}", kind.job_prefix(), Uuid::new_v4().simple()))
    }

    /// Validate a caller-supplied id.
    ///
    /// Ids travel through query strings and response headers, so only
    /// `[A-Za-z0-9_-]` is accepted.
    pub fn parse(raw: &str) -> ValidationResult<Self> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_JOB_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValidationError::InvalidJobId(raw.chars().take(64).collect()))
        }
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event written by the executor into a job's progress channel.
///
/// Within one job the percentages are non-decreasing and `Completed`
/// is sent at most once, always last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Engine progress, already clamped to `0..=99`.
    Progress { percent: u8, status: String },
    /// Output verified on disk; the only event that maps to 100.
    Completed { status: String },
}

impl ProgressEvent {
    /// Create a progress event, clamping into the non-terminal range.
    pub fn progress(percent: u8, status: impl Into<String>) -> Self {
        Self::Progress {
            percent: percent.min(99),
            status: status.into(),
        }
    }

    /// Create the terminal success event.
    pub fn completed(status: impl Into<String>) -> Self {
        Self::Completed {
            status: status.into(),
        }
    }

    /// Percentage this event maps to in the registry.
    pub fn percent(&self) -> u8 {
        match self {
            ProgressEvent::Progress { percent, .. } => *percent,
            ProgressEvent::Completed { .. } => 100,
        }
    }

    /// Human readable phase label.
    pub fn status(&self) -> &str {
        match self {
            ProgressEvent::Progress { status, .. } | ProgressEvent::Completed { status } => status,
        }
    }
}

/// JSON body of one server-sent progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressPayload {
    /// Completion percentage (0-100)
    pub progress: u8,
    /// Current phase label
    pub status: String,
}
