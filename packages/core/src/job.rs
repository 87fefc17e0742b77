//! Job domain types for content-processing work items.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a job.
///
/// New ids are ULIDs so they sort chronologically, but any string coming
/// back from persistence or another process is accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rejected job type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid job type: {0}")]
pub struct InvalidJobType(pub String);

/// Kind of accessibility artifact a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Ocr,
    Tts,
    Transcribe,
    Summarize,
    ImageDescription,
    VideoProcess,
}

impl JobType {
    /// Every supported job type.
    pub const ALL: [JobType; 6] = [
        JobType::Ocr,
        JobType::Tts,
        JobType::Transcribe,
        JobType::Summarize,
        JobType::ImageDescription,
        JobType::VideoProcess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Ocr => "ocr",
            JobType::Tts => "tts",
            JobType::Transcribe => "transcribe",
            JobType::Summarize => "summarize",
            JobType::ImageDescription => "image_description",
            JobType::VideoProcess => "video_process",
        }
    }
}

impl FromStr for JobType {
    type Err = InvalidJobType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| InvalidJobType(s.to_string()))
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status of a job in its lifecycle.
///
/// ```text
/// queued -> processing -> completed
///              |  ^
///              v  |
///           retrying -> (cancel) failed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker.
    #[default]
    Queued,
    /// A backend call is in flight.
    Processing,
    /// Last attempt failed; waiting for the backoff timer.
    Retrying,
    /// Finished successfully. Terminal.
    Completed,
    /// Out of attempts or cancelled. Terminal.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// States a dispatch trigger may move into `processing`.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Retrying)
    }

    /// Cancellation is only allowed before a backend call is in flight.
    pub fn can_cancel(&self) -> bool {
        self.is_dispatchable()
    }

    /// Only terminally failed jobs can be retried by hand.
    pub fn can_retry(&self) -> bool {
        matches!(self, JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "retrying" => Ok(JobStatus::Retrying),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of asynchronous work turning one piece of content into one
/// accessibility artifact.
///
/// Status-gated fields are only changed through the transition methods
/// below so that `result` appears only on completed jobs and `error` only
/// on retrying or failed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Kind of work (used for routing to backends).
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Content entity being processed, e.g. a lesson.
    pub subject_id: String,
    /// Specific input artifact, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
    /// Current status.
    pub status: JobStatus,
    /// Number of dispatch attempts so far.
    #[serde(default)]
    pub attempts: u32,
    /// Attempts allowed in one attempt cycle.
    pub max_attempts: u32,
    /// Backend output, stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Reason for the last failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Backend options, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Changes on every state transition.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(job_type: JobType, subject_id: impl Into<String>, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type,
            subject_id: subject_id.into(),
            attachment_id: None,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            result: None,
            error: None,
            options: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the attachment this job processes.
    pub fn with_attachment(mut self, attachment_id: Option<String>) -> Self {
        self.attachment_id = attachment_id;
        self
    }

    /// Set the backend options for this job.
    pub fn with_options(mut self, options: Option<serde_json::Value>) -> Self {
        self.options = options;
        self
    }

    /// Whether another automatic attempt is allowed.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Enter `processing`, counting the attempt up front.
    pub fn begin_attempt(&mut self) {
        self.status = JobStatus::Processing;
        self.attempts = self.attempts.saturating_add(1).min(self.max_attempts);
        self.error = None;
        self.touch();
    }

    pub fn complete(&mut self, result: serde_json::Value) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.touch();
    }

    pub fn mark_retrying(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Retrying;
        self.result = None;
        self.error = Some(error.into());
        self.touch();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(error.into());
        self.touch();
    }

    /// Start a fresh attempt cycle after a terminal failure.
    pub fn reset_for_retry(&mut self) {
        self.status = JobStatus::Queued;
        self.attempts = 0;
        self.result = None;
        self.error = None;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Parameters for a new job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub job_type: JobType,
    pub subject_id: String,
    pub attachment_id: Option<String>,
    pub options: Option<serde_json::Value>,
}

impl NewJob {
    pub fn new(job_type: JobType, subject_id: impl Into<String>) -> Self {
        Self {
            job_type,
            subject_id: subject_id.into(),
            attachment_id: None,
            options: None,
        }
    }

    /// Parse the job type from its wire name.
    pub fn parse(job_type: &str, subject_id: impl Into<String>) -> Result<Self, InvalidJobType> {
        Ok(Self::new(job_type.parse()?, subject_id))
    }

    pub fn with_attachment(mut self, attachment_id: impl Into<String>) -> Self {
        self.attachment_id = Some(attachment_id.into());
        self
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Build the queued job record.
    pub fn into_job(self, max_attempts: u32) -> Job {
        Job::new(self.job_type, self.subject_id, max_attempts)
            .with_attachment(self.attachment_id)
            .with_options(self.options)
    }
}
