//! Processing backend trait and registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use jobs_core::{Job, JobId, JobType};

/// Failure reported by a processing backend.
///
/// The engine never surfaces this to callers; it becomes the job's
/// `error` and feeds the retry decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProcessingError {
    message: String,
}

impl ProcessingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ProcessingError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProcessingError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result type for backends: an opaque payload shaped by the job type.
pub type BackendResult = Result<serde_json::Value, ProcessingError>;

/// Future type for async backends.
pub type BackendFuture = Pin<Box<dyn Future<Output = BackendResult> + Send>>;

/// One unit of work handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingRequest {
    pub job_id: JobId,
    pub job_type: JobType,
    pub subject_id: String,
    pub attachment_id: Option<String>,
    pub options: Option<serde_json::Value>,
    /// 1-based attempt number within the current attempt cycle.
    pub attempt: u32,
}

impl From<&Job> for ProcessingRequest {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            job_type: job.job_type,
            subject_id: job.subject_id.clone(),
            attachment_id: job.attachment_id.clone(),
            options: job.options.clone(),
            attempt: job.attempts,
        }
    }
}

/// Performs the actual OCR/TTS/summarization work for a job.
///
/// The returned future must eventually resolve. Workers also enforce the
/// configured job timeout, so a hung backend call counts as a failed
/// attempt rather than blocking the job forever.
pub trait ProcessingBackend: Send + Sync + 'static {
    fn execute(&self, request: &ProcessingRequest) -> BackendFuture;
}

/// Registry routing requests to a backend per job type.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<JobType, Arc<dyn ProcessingBackend>>,
}

impl BackendRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Register a backend for a job type.
    pub fn register<B: ProcessingBackend>(&mut self, job_type: JobType, backend: B) {
        self.backends.insert(job_type, Arc::new(backend));
    }

    /// Use one backend for every job type.
    pub fn register_all<B: ProcessingBackend>(&mut self, backend: B) {
        let backend: Arc<dyn ProcessingBackend> = Arc::new(backend);
        for job_type in JobType::ALL {
            self.backends.insert(job_type, backend.clone());
        }
    }

    /// Get the backend for a job type.
    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn ProcessingBackend>> {
        self.backends.get(&job_type).cloned()
    }

    pub fn has_backend(&self, job_type: JobType) -> bool {
        self.backends.contains_key(&job_type)
    }

    /// List all registered job types.
    pub fn job_types(&self) -> Vec<JobType> {
        self.backends.keys().copied().collect()
    }
}

impl ProcessingBackend for BackendRegistry {
    fn execute(&self, request: &ProcessingRequest) -> BackendFuture {
        match self.get(request.job_type) {
            Some(backend) => backend.execute(request),
            None => {
                let result: BackendResult = Err(ProcessingError::new(format!(
                    "no backend registered for job type: {}",
                    request.job_type
                )));
                Box::pin(async move { result })
            }
        }
    }
}

/// A simple function-based backend.
pub struct FnBackend<F>
where
    F: Fn(&ProcessingRequest) -> BackendFuture + Send + Sync + 'static,
{
    handler: F,
}

impl<F> FnBackend<F>
where
    F: Fn(&ProcessingRequest) -> BackendFuture + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> ProcessingBackend for FnBackend<F>
where
    F: Fn(&ProcessingRequest) -> BackendFuture + Send + Sync + 'static,
{
    fn execute(&self, request: &ProcessingRequest) -> BackendFuture {
        (self.handler)(request)
    }
}
