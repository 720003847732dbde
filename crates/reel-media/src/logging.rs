//! Structured job logging.

use tracing::{debug, error, info, warn, Span};

use reel_models::{JobId, OperationKind};

/// Percent step between `info` level progress lines; everything else is `debug`.
const MILESTONE_STEP: u8 = 25;

/// Logs job lifecycle events with consistent `job_id` and `operation` fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: OperationKind,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: OperationKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Progress lines are `info` at 25% milestones and `debug` otherwise.
    pub fn log_progress(&self, percent: u8, status: &str) {
        if percent % MILESTONE_STEP == 0 {
            info!(job_id = %self.job_id, operation = %self.operation, percent, "{}", status);
        } else {
            debug!(job_id = %self.job_id, operation = %self.operation, percent, "{}", status);
        }
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Span carrying the job fields, for instrumenting the engine run.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = %self.operation)
    }
}
