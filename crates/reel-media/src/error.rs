//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use reel_models::ValidationError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while compiling or running a transform.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("FFmpeg finished but output file is missing: {0}")]
    OutputMissing(PathBuf),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// True for request problems detected before the engine was spawned.
    pub fn is_validation(&self) -> bool {
        matches!(self, MediaError::Validation(_) | MediaError::FileNotFound(_))
    }

    /// Single line message suitable for a client response.
    ///
    /// Engine failures carry the last stderr line, which is where ffmpeg
    /// states the actual reason.
    pub fn user_message(&self) -> String {
        match self {
            MediaError::FfmpegFailed {
                message,
                stderr: Some(stderr),
                ..
            } => match stderr.lines().rev().find(|l| !l.trim().is_empty()) {
                Some(last) => format!("{message}: {}", last.trim()),
                None => message.clone(),
            },
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_uses_last_stderr_line() {
        let err = MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some("line one\nStream specifier ':a' matches no streams.\n\n".to_string()),
            Some(1),
        );
        assert_eq!(
            err.user_message(),
            "FFmpeg exited with non-zero status: Stream specifier ':a' matches no streams."
        );
    }

    #[test]
    fn test_validation_classification() {
        assert!(MediaError::from(ValidationError::NoInput).is_validation());
        assert!(!MediaError::OutputMissing(PathBuf::from("x.mp4")).is_validation());
    }
}
