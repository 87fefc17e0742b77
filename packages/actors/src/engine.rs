//! Public handle to a running job engine.

use std::sync::Arc;
use std::time::Duration;

use db::{JobFilter, JobStore};
use jobs_core::{EngineConfig, Job, JobId, JobType, NewJob};
use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef, RpcReplyPort};

use crate::backend::ProcessingBackend;
use crate::bus::{InProcessBus, NotificationBus, Subscription};
use crate::engine_actor::{EngineActor, EngineArgs};
use crate::error::EngineError;
use crate::messages::EngineMessage;

/// Upper bound on waiting for the engine actor to answer.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for a [`JobEngine`].
pub struct EngineBuilder {
    config: EngineConfig,
    store: Arc<dyn JobStore>,
    backend: Arc<dyn ProcessingBackend>,
    bus: Option<Arc<dyn NotificationBus>>,
}

impl EngineBuilder {
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish notifications on `bus` instead of a private in-process bus.
    pub fn with_bus(mut self, bus: Arc<dyn NotificationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Validate the configuration and spawn the engine actor with its workers.
    pub async fn start(self) -> Result<(JobEngine, tokio::task::JoinHandle<()>), EngineError> {
        self.config.validate()?;

        let bus = self
            .bus
            .unwrap_or_else(|| Arc::new(InProcessBus::new()) as Arc<dyn NotificationBus>);

        let args = EngineArgs {
            config: self.config,
            store: self.store.clone(),
            backend: self.backend,
            bus: bus.clone(),
        };

        let (actor, handle) = Actor::spawn(None, EngineActor, args)
            .await
            .map_err(|e| EngineError::Unavailable(format!("failed to start engine: {}", e)))?;

        let engine = JobEngine {
            actor,
            store: self.store,
            bus,
        };

        Ok((engine, handle))
    }
}

/// Cloneable handle to the job engine.
///
/// Mutations go through the engine actor; `status` and `list` read the
/// store directly.
#[derive(Clone)]
pub struct JobEngine {
    actor: ActorRef<EngineMessage>,
    store: Arc<dyn JobStore>,
    bus: Arc<dyn NotificationBus>,
}

impl JobEngine {
    pub fn builder(store: Arc<dyn JobStore>, backend: Arc<dyn ProcessingBackend>) -> EngineBuilder {
        EngineBuilder {
            config: EngineConfig::default(),
            store,
            backend,
            bus: None,
        }
    }

    /// Enqueue a job by its wire type name.
    ///
    /// Returns the persisted `queued` job without waiting for processing.
    pub async fn enqueue(
        &self,
        job_type: &str,
        subject_id: impl Into<String>,
        attachment_id: Option<String>,
    ) -> Result<Job, EngineError> {
        let job_type: JobType = job_type.parse()?;
        let mut request = NewJob::new(job_type, subject_id);
        request.attachment_id = attachment_id;
        self.submit(request).await
    }

    /// Enqueue a fully specified job.
    pub async fn submit(&self, request: NewJob) -> Result<Job, EngineError> {
        self.call(|reply| EngineMessage::Submit { request, reply }).await
    }

    pub async fn status(&self, job_id: &JobId) -> Result<Job, EngineError> {
        self.store
            .get(job_id)
            .await
            .map_err(|e| EngineError::lookup(job_id, e))
    }

    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, EngineError> {
        Ok(self.store.list(filter).await?)
    }

    /// Cancel a `queued` or `retrying` job. It ends `failed` with
    /// `"cancelled by user"` and any pending backoff timer is dropped.
    pub async fn cancel(&self, job_id: &JobId) -> Result<Job, EngineError> {
        let job_id = job_id.clone();
        self.call(|reply| EngineMessage::Cancel { job_id, reply }).await
    }

    /// Re-run a `failed` job from zero attempts.
    pub async fn retry(&self, job_id: &JobId) -> Result<Job, EngineError> {
        let job_id = job_id.clone();
        self.call(|reply| EngineMessage::Retry { job_id, reply }).await
    }

    /// Trigger a dispatch attempt. Safe to call any number of times.
    pub fn dispatch(&self, job_id: &JobId) -> Result<(), EngineError> {
        self.actor
            .send_message(EngineMessage::Dispatch {
                job_id: job_id.clone(),
            })
            .map_err(|e| EngineError::Unavailable(e.to_string()))
    }

    /// Subscribe to notifications published from now on.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Stop the engine, its workers and pending backoff timers.
    pub fn shutdown(&self) {
        let _ = self.actor.send_message(EngineMessage::Shutdown);
    }

    async fn call<T, F>(&self, build: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<Result<T, EngineError>>) -> EngineMessage,
    {
        match ractor::rpc::call(&self.actor, build, Some(CALL_TIMEOUT)).await {
            Ok(CallResult::Success(result)) => result,
            Ok(CallResult::Timeout) => Err(EngineError::Unavailable("engine call timed out".into())),
            Ok(CallResult::SenderError) => {
                Err(EngineError::Unavailable("engine dropped the request".into()))
            }
            Err(e) => Err(EngineError::Unavailable(e.to_string())),
        }
    }
}
