#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use actors::{
    BackendFuture, EngineError, FnBackend, JobEngine, ProcessingBackend, ProcessingError,
    ProcessingRequest,
};
use db::{DbError, JobFilter, JobStore, MemoryJobStore, StoreFuture};
use futures_util::FutureExt;
use jobs_core::{EngineConfig, Job, JobId, JobNotification, JobStatus};
use serde_json::json;

/// Guard for every wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Engine config with millisecond backoff so retry paths finish quickly.
pub fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_workers(2)
        .with_job_timeout(Duration::from_secs(5))
        .with_backoff(Duration::from_millis(5), Duration::from_millis(20))
}

pub async fn start_engine<B: ProcessingBackend>(
    config: EngineConfig,
    backend: B,
) -> Result<(JobEngine, Arc<MemoryJobStore>), EngineError> {
    let store = Arc::new(MemoryJobStore::new());
    let engine = start_on_store(config, backend, store.clone()).await?;
    Ok((engine, store))
}

/// Start an engine on a store that may already hold jobs.
pub async fn start_on_store<B: ProcessingBackend>(
    config: EngineConfig,
    backend: B,
    store: Arc<dyn JobStore>,
) -> Result<JobEngine, EngineError> {
    let (engine, _handle) = JobEngine::builder(store, Arc::new(backend))
        .with_config(config)
        .start()
        .await?;
    Ok(engine)
}

/// Poll until the job reaches `status`.
pub async fn wait_for_status(engine: &JobEngine, id: &JobId, status: JobStatus) -> Job {
    let poll = async {
        loop {
            if let Ok(job) = engine.status(id).await
                && job.status == status
            {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    match tokio::time::timeout(WAIT, poll).await {
        Ok(job) => job,
        Err(_) => panic!("job {id} never reached {status}"),
    }
}

/// Collect notifications for one job until it reaches a terminal status.
pub async fn collect_until_terminal(
    updates: &mut actors::Subscription,
    id: &JobId,
) -> Vec<JobNotification> {
    let collect = async {
        let mut seen = Vec::new();
        while let Some(n) = updates.recv().await {
            if &n.job_id != id {
                continue;
            }
            let done = n.is_terminal();
            seen.push(n);
            if done {
                break;
            }
        }
        seen
    };
    tokio::time::timeout(WAIT, collect)
        .await
        .expect("no terminal notification")
}

/// Backend call counter shared with the test body.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicU32>);

impl Calls {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    /// Record a call, returning the count before it.
    pub fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Fails the first `failures` calls, then returns a summary.
pub fn flaky_backend(
    failures: u32,
    calls: Calls,
) -> FnBackend<impl Fn(&ProcessingRequest) -> BackendFuture + Send + Sync + 'static> {
    FnBackend::new(move |_: &ProcessingRequest| {
        let n = calls.bump();
        Box::pin(async move {
            if n < failures {
                Err(ProcessingError::new(format!("upstream unavailable ({})", n + 1)))
            } else {
                Ok(json!({"summary": "Short summary."}))
            }
        })
    })
}

/// Requests for subject `"blocker"` wait on `gate`; everything else succeeds.
pub fn gated_backend(
    gate: Arc<tokio::sync::Semaphore>,
    calls: Calls,
) -> FnBackend<impl Fn(&ProcessingRequest) -> BackendFuture + Send + Sync + 'static> {
    FnBackend::new(move |req: &ProcessingRequest| {
        let gate = gate.clone();
        let blocked = req.subject_id == "blocker";
        if !blocked {
            calls.bump();
        }
        Box::pin(async move {
            if blocked {
                let _permit = gate.acquire().await;
            }
            Ok(json!({"summary": "done"}))
        })
    })
}

/// Memory store whose conditional writes into one status fail a set number
/// of times before going through.
pub struct FailingWrites {
    inner: MemoryJobStore,
    target: JobStatus,
    failures_left: AtomicU32,
}

impl FailingWrites {
    pub fn new(target: JobStatus, failures: u32) -> Self {
        Self {
            inner: MemoryJobStore::new(),
            target,
            failures_left: AtomicU32::new(failures),
        }
    }

    pub fn failures_left(&self) -> u32 {
        self.failures_left.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl JobStore for FailingWrites {
    fn get<'a>(&'a self, id: &'a JobId) -> StoreFuture<'a, Job> {
        self.inner.get(id)
    }

    fn put<'a>(&'a self, job: &'a Job) -> StoreFuture<'a, ()> {
        self.inner.put(job)
    }

    fn put_if<'a>(&'a self, job: &'a Job, expected: &'a [JobStatus]) -> StoreFuture<'a, bool> {
        if job.status == self.target && self.take_failure() {
            let result: Result<bool, DbError> = Err(DbError::Query("write rejected".into()));
            return async move { result }.boxed();
        }
        self.inner.put_if(job, expected)
    }

    fn list<'a>(&'a self, filter: &'a JobFilter) -> StoreFuture<'a, Vec<Job>> {
        self.inner.list(filter)
    }
}
