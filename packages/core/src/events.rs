//! Notification types for job state changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId, JobStatus};

/// Published once for every persisted job transition.
///
/// `previous_status` is `None` for the notification emitted on enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobNotification {
    pub job_id: JobId,
    pub previous_status: Option<JobStatus>,
    pub new_status: JobStatus,
    /// Snapshot of the job after the transition.
    pub job: Job,
    pub timestamp: DateTime<Utc>,
}

impl JobNotification {
    /// Build a notification from the updated job snapshot.
    pub fn new(previous_status: Option<JobStatus>, job: Job) -> Self {
        Self {
            job_id: job.id.clone(),
            previous_status,
            new_status: job.status,
            timestamp: job.updated_at,
            job,
        }
    }

    /// Whether this notification reports a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.new_status.is_terminal()
    }

    /// Short description of this notification for logging.
    pub fn description(&self) -> String {
        match (self.previous_status, self.new_status) {
            (None, _) => format!("Job {} ({}) enqueued", self.job_id, self.job.job_type),
            (Some(_), JobStatus::Processing) => format!(
                "Job {} started (attempt {}/{})",
                self.job_id, self.job.attempts, self.job.max_attempts
            ),
            (Some(_), JobStatus::Retrying) => format!(
                "Job {} failed: {} (will retry)",
                self.job_id,
                self.job.error.as_deref().unwrap_or("unknown error")
            ),
            (Some(_), JobStatus::Failed) => format!(
                "Job {} failed: {}",
                self.job_id,
                self.job.error.as_deref().unwrap_or("unknown error")
            ),
            (Some(_), JobStatus::Completed) => format!(
                "Job {} completed after {} attempt(s)",
                self.job_id, self.job.attempts
            ),
            (Some(prev), JobStatus::Queued) => {
                format!("Job {} {} -> queued", self.job_id, prev)
            }
        }
    }
}
