//! Errors surfaced by the job engine API.

use db::DbError;
use jobs_core::{ConfigError, InvalidJobType, JobId, JobStatus};

/// Error type for engine operations.
///
/// Backend failures never appear here; they are recorded on the job.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    InvalidJobType(#[from] InvalidJobType),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Cannot {operation} job {job_id} in status {status}")]
    InvalidTransition {
        job_id: JobId,
        status: JobStatus,
        operation: &'static str,
    },

    #[error("Store error: {0}")]
    Store(#[from] DbError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    /// Map a store lookup failure, turning a missing record into `NotFound`.
    pub(crate) fn lookup(job_id: &JobId, err: DbError) -> Self {
        if err.is_not_found() {
            EngineError::NotFound(job_id.clone())
        } else {
            EngineError::Store(err)
        }
    }

    /// Whether the caller misused the API rather than hitting an outage.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidJobType(_)
                | EngineError::NotFound(_)
                | EngineError::InvalidTransition { .. }
        )
    }
}
