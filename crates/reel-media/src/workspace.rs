//! Per-job scratch directories.
//!
//! Every file a job touches (uploads, background image, engine output) lives
//! under one [`JobWorkspace`]. Dropping the workspace removes the directory,
//! so cleanup happens on every exit path without explicit bookkeeping.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use reel_models::OperationKind;

use crate::error::MediaResult;

/// Fallback when an upload carries no usable file name.
const DEFAULT_UPLOAD_NAME: &str = "upload.mp4";

/// Longest sanitized file name kept.
const MAX_FILE_NAME_LEN: usize = 120;

/// Owned scratch directory for one job.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Create a workspace under `root`, or under the OS temp dir when `None`.
    ///
    /// Uploads are written before the job id field has been read, so the
    /// directory is named after the operation only.
    pub fn create(root: Option<&Path>, kind: OperationKind) -> MediaResult<Self> {
        let prefix = format!("reel_{}_", kind.job_prefix());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        tracing::debug!(operation = %kind, path = %dir.path().display(), "Created job workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for the `index`-th uploaded media file.
    pub fn input_path(&self, index: usize, original_name: &str) -> PathBuf {
        self.dir
            .path()
            .join(format!("input_{index}_{}", sanitize_file_name(original_name)))
    }

    /// Path for an auxiliary upload such as a background image.
    pub fn asset_path(&self, label: &str, original_name: &str) -> PathBuf {
        self.dir
            .path()
            .join(format!("{label}_{}", sanitize_file_name(original_name)))
    }

    /// Path the engine writes its output to.
    pub fn output_path(&self, kind: OperationKind) -> PathBuf {
        self.dir
            .path()
            .join(format!("{}_output.mp4", kind.output_prefix()))
    }
}

/// Replace everything outside `[A-Za-z0-9.-]` with `_` after dropping any
/// directory components a client may have sent.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_LEN)
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        DEFAULT_UPLOAD_NAME.to_string()
    } else {
        cleaned
    }
}

/// File name offered to the client for a finished job.
pub fn delivery_file_name(kind: OperationKind, original_name: &str) -> String {
    match kind {
        OperationKind::Merge => "merged_video.mp4".to_string(),
        _ => format!("{}_{}", kind.output_prefix(), sanitize_file_name(original_name)),
    }
}
