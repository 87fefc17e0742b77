//! The job record store contract.

use futures_util::future::BoxFuture;
use jobs_core::{Job, JobId, JobStatus, JobType};

use crate::DbError;

/// Future returned by store operations.
pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, DbError>>;

/// Durable keyed storage for jobs.
///
/// Writes replace the whole record atomically. The store does not know the
/// job state machine; the engine decides which transitions are legal and
/// uses [`JobStore::put_if`] to apply them.
pub trait JobStore: Send + Sync + 'static {
    /// Load a job, failing with [`DbError::NotFound`] for unknown ids.
    fn get<'a>(&'a self, id: &'a JobId) -> StoreFuture<'a, Job>;

    /// Insert or fully replace a job.
    fn put<'a>(&'a self, job: &'a Job) -> StoreFuture<'a, ()>;

    /// Replace a job only if its stored status is one of `expected`.
    ///
    /// Returns `false` without writing when the status has moved on or the
    /// record does not exist.
    fn put_if<'a>(&'a self, job: &'a Job, expected: &'a [JobStatus]) -> StoreFuture<'a, bool>;

    /// List jobs matching `filter`, oldest first.
    fn list<'a>(&'a self, filter: &'a JobFilter) -> StoreFuture<'a, Vec<Job>>;
}

/// Filter options for listing jobs.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub subject_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        self.job_type = Some(job_type);
        self
    }

    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Whether `job` passes the field filters (limit/offset excluded).
    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.job_type.is_none_or(|t| job.job_type == t)
            && self
                .subject_id
                .as_ref()
                .is_none_or(|s| &job.subject_id == s)
    }
}
