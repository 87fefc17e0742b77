//! Engine actor owning every job transition.
//!
//! All transitions for all jobs are applied from this actor's mailbox, and
//! each one is written with [`JobStore::put_if`] against the status it was
//! computed from. Backend calls run on linked [`WorkerActor`]s so status,
//! cancel and retry stay responsive while jobs are in flight.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use db::{JobFilter, JobStore};
use jobs_core::{EngineConfig, Job, JobId, JobNotification, JobStatus, NewJob, RetryPolicy};
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::task::JoinHandle;

use crate::backend::{BackendResult, ProcessingBackend, ProcessingError};
use crate::bus::NotificationBus;
use crate::error::EngineError;
use crate::messages::{EngineMessage, WorkerMessage};
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// Error recorded on a job cancelled by a caller.
pub const CANCELLED_BY_USER: &str = "cancelled by user";

/// Floor for the delay before a failed store call is tried again.
const MIN_STORE_RETRY: Duration = Duration::from_millis(10);

/// Engine actor arguments.
pub struct EngineArgs {
    pub config: EngineConfig,
    pub store: Arc<dyn JobStore>,
    pub backend: Arc<dyn ProcessingBackend>,
    pub bus: Arc<dyn NotificationBus>,
}

/// State for the engine actor.
pub struct EngineState {
    store: Arc<dyn JobStore>,
    backend: Arc<dyn ProcessingBackend>,
    bus: Arc<dyn NotificationBus>,
    config: EngineConfig,
    policy: RetryPolicy,
    /// Live workers by actor id.
    workers: HashMap<ActorId, ActorRef<WorkerMessage>>,
    idle: VecDeque<ActorRef<WorkerMessage>>,
    /// In-flight attempt per busy worker.
    busy: HashMap<ActorId, (JobId, u32)>,
    /// Jobs waiting for an idle worker.
    ready: VecDeque<JobId>,
    /// Pending backoff timers.
    timers: HashMap<JobId, JoinHandle<()>>,
    worker_counter: u64,
    stopping: bool,
}

impl EngineState {
    fn new(args: EngineArgs) -> Self {
        let policy = args.config.retry_policy();
        Self {
            store: args.store,
            backend: args.backend,
            bus: args.bus,
            config: args.config,
            policy,
            workers: HashMap::new(),
            idle: VecDeque::new(),
            busy: HashMap::new(),
            ready: VecDeque::new(),
            timers: HashMap::new(),
            worker_counter: 0,
            stopping: false,
        }
    }

    /// Generate a unique worker ID.
    fn next_worker_id(&mut self) -> String {
        self.worker_counter += 1;
        format!("worker-{}", self.worker_counter)
    }

    async fn spawn_worker(
        &mut self,
        myself: &ActorRef<EngineMessage>,
    ) -> Result<(), ActorProcessingErr> {
        let args = WorkerArgs {
            worker_id: self.next_worker_id(),
            engine: myself.clone(),
            backend: self.backend.clone(),
            timeout: self.config.job_timeout(),
        };

        let (worker, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;

        self.workers.insert(worker.get_id(), worker.clone());
        self.idle.push_back(worker);
        Ok(())
    }

    fn publish(&self, previous: Option<JobStatus>, job: &Job) {
        self.bus.publish(JobNotification::new(previous, job.clone()));
    }

    fn mark_ready(&mut self, job_id: JobId) {
        if !self.ready.contains(&job_id) {
            self.ready.push_back(job_id);
        }
    }

    fn cancel_timer(&mut self, job_id: &JobId) {
        if let Some(timer) = self.timers.remove(job_id) {
            timer.abort();
        }
    }

    async fn submit(&mut self, request: NewJob) -> Result<Job, EngineError> {
        let job = request.into_job(self.config.max_attempts);
        self.store.put(&job).await?;

        tracing::info!(
            "Enqueued {} job {} for subject {}",
            job.job_type,
            job.id,
            job.subject_id
        );
        self.publish(None, &job);
        Ok(job)
    }

    /// Move a job into `processing` if it is still eligible.
    ///
    /// A `retrying` job is only eligible once its backoff timer has fired.
    async fn claim(&mut self, myself: &ActorRef<EngineMessage>, job_id: JobId) -> Option<Job> {
        let mut job = match self.store.get(&job_id).await {
            Ok(job) => job,
            Err(e) if e.is_not_found() => {
                tracing::warn!("Cannot dispatch job {}: {}", job_id, e);
                return None;
            }
            Err(e) => {
                tracing::warn!("Cannot dispatch job {}: {}", job_id, e);
                self.redispatch_later(myself, job_id);
                return None;
            }
        };

        if !job.status.is_dispatchable() {
            tracing::debug!("Ignoring dispatch of job {} in status {}", job_id, job.status);
            return None;
        }

        if job.status == JobStatus::Retrying && self.timers.contains_key(&job_id) {
            tracing::debug!("Ignoring dispatch of job {} during its backoff", job_id);
            return None;
        }

        let previous = job.status;
        job.begin_attempt();

        match self.store.put_if(&job, &[previous]).await {
            Ok(true) => {
                self.cancel_timer(&job_id);
                self.publish(Some(previous), &job);
                Some(job)
            }
            Ok(false) => {
                tracing::debug!("Job {} left {} before it could be claimed", job_id, previous);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to mark job {} processing: {}", job_id, e);
                self.redispatch_later(myself, job_id);
                None
            }
        }
    }

    async fn next_claimed(&mut self, myself: &ActorRef<EngineMessage>) -> Option<Job> {
        while let Some(job_id) = self.ready.pop_front() {
            if let Some(job) = self.claim(myself, job_id).await {
                return Some(job);
            }
        }
        None
    }

    /// Pair idle workers with ready jobs.
    async fn pump(&mut self, myself: &ActorRef<EngineMessage>) {
        if self.stopping {
            return;
        }

        while let Some(worker) = self.idle.pop_front() {
            let Some(job) = self.next_claimed(myself).await else {
                self.idle.push_front(worker);
                break;
            };

            let job_id = job.id.clone();
            let attempt = job.attempts;
            self.busy.insert(worker.get_id(), (job_id.clone(), attempt));

            if let Err(e) = worker.send_message(WorkerMessage::Execute { job: Box::new(job) }) {
                tracing::warn!("Worker unavailable for job {}: {}", job_id, e);
                // The supervision event for this worker spawns its replacement.
                self.busy.remove(&worker.get_id());
                let outcome: BackendResult = Err(ProcessingError::new("worker unavailable"));
                self.finish_attempt(myself, &job_id, attempt, outcome).await;
            }
        }
    }

    /// Apply a backend outcome to the attempt it belongs to.
    async fn finish_attempt(
        &mut self,
        myself: &ActorRef<EngineMessage>,
        job_id: &JobId,
        attempt: u32,
        outcome: BackendResult,
    ) {
        let mut job = match self.store.get(job_id).await {
            Ok(job) => job,
            Err(e) if e.is_not_found() => {
                tracing::error!("Cannot record outcome for job {}: {}", job_id, e);
                return;
            }
            Err(e) => {
                tracing::error!("Cannot record outcome for job {}: {}", job_id, e);
                self.record_later(myself, job_id.clone(), attempt, outcome);
                return;
            }
        };

        if job.status != JobStatus::Processing || job.attempts != attempt {
            tracing::debug!("Discarding stale outcome for job {} attempt {}", job_id, attempt);
            return;
        }

        match &outcome {
            Ok(result) => job.complete(result.clone()),
            Err(err) if self.policy.should_retry(job.attempts, job.max_attempts) => {
                tracing::warn!(
                    "Job {} attempt {}/{} failed, will retry: {}",
                    job_id,
                    job.attempts,
                    job.max_attempts,
                    err
                );
                job.mark_retrying(err.message());
            }
            Err(err) => {
                tracing::warn!("Job {} failed after {} attempts: {}", job_id, job.attempts, err);
                job.fail(err.message());
            }
        }

        match self.store.put_if(&job, &[JobStatus::Processing]).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Job {} left processing before its outcome was recorded", job_id);
                return;
            }
            Err(e) => {
                tracing::error!("Failed to record outcome for job {}: {}", job_id, e);
                self.record_later(myself, job_id.clone(), attempt, outcome);
                return;
            }
        }

        self.publish(Some(JobStatus::Processing), &job);

        match job.status {
            JobStatus::Retrying => self.schedule_backoff(myself, &job),
            JobStatus::Completed => tracing::info!("Job {} completed", job_id),
            _ => {}
        }
    }

    fn schedule_backoff(&mut self, myself: &ActorRef<EngineMessage>, job: &Job) {
        let delay = self.policy.next_delay(job.attempts);
        let engine = myself.clone();
        let job_id = job.id.clone();

        tracing::debug!("Retrying job {} in {:?}", job_id, delay);

        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = engine.send_message(EngineMessage::BackoffElapsed { job_id });
        });

        if let Some(previous) = self.timers.insert(job.id.clone(), timer) {
            previous.abort();
        }
    }

    fn store_retry_delay(&self) -> Duration {
        self.policy.base.max(MIN_STORE_RETRY)
    }

    /// Try the claim again after a store failure. Cancel drops the timer.
    fn redispatch_later(&mut self, myself: &ActorRef<EngineMessage>, job_id: JobId) {
        let delay = self.store_retry_delay();
        let engine = myself.clone();
        let timer_job = job_id.clone();

        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = engine.send_message(EngineMessage::BackoffElapsed { job_id: timer_job });
        });

        if let Some(previous) = self.timers.insert(job_id, timer) {
            previous.abort();
        }
    }

    /// Redeliver an outcome the store could not take. The job stays in
    /// `processing` until it is written.
    fn record_later(
        &self,
        myself: &ActorRef<EngineMessage>,
        job_id: JobId,
        attempt: u32,
        outcome: BackendResult,
    ) {
        let delay = self.store_retry_delay();
        let engine = myself.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = engine.send_message(EngineMessage::RecordOutcome {
                job_id,
                attempt,
                outcome,
            });
        });
    }

    async fn cancel(&mut self, job_id: JobId) -> Result<Job, EngineError> {
        let mut job = self
            .store
            .get(&job_id)
            .await
            .map_err(|e| EngineError::lookup(&job_id, e))?;

        if !job.status.can_cancel() {
            return Err(EngineError::InvalidTransition {
                job_id,
                status: job.status,
                operation: "cancel",
            });
        }

        let previous = job.status;
        job.fail(CANCELLED_BY_USER);
        self.apply_user_transition(&job, previous, "cancel").await?;

        self.cancel_timer(&job_id);
        self.ready.retain(|id| id != &job_id);
        self.publish(Some(previous), &job);

        tracing::info!("Job {} cancelled", job_id);
        Ok(job)
    }

    async fn retry(&mut self, job_id: JobId) -> Result<Job, EngineError> {
        let mut job = self
            .store
            .get(&job_id)
            .await
            .map_err(|e| EngineError::lookup(&job_id, e))?;

        if !job.status.can_retry() {
            return Err(EngineError::InvalidTransition {
                job_id,
                status: job.status,
                operation: "retry",
            });
        }

        job.reset_for_retry();
        self.apply_user_transition(&job, JobStatus::Failed, "retry").await?;
        self.publish(Some(JobStatus::Failed), &job);

        tracing::info!("Job {} queued for a fresh attempt cycle", job_id);
        Ok(job)
    }

    /// Compare-and-set for caller-initiated transitions. Losing the race is
    /// reported against the status that won it.
    async fn apply_user_transition(
        &self,
        job: &Job,
        expected: JobStatus,
        operation: &'static str,
    ) -> Result<(), EngineError> {
        if self.store.put_if(job, &[expected]).await? {
            return Ok(());
        }

        let current = self
            .store
            .get(&job.id)
            .await
            .map_err(|e| EngineError::lookup(&job.id, e))?;

        Err(EngineError::InvalidTransition {
            job_id: job.id.clone(),
            status: current.status,
            operation,
        })
    }

    /// Pick up work left in the store by a previous run.
    async fn recover(&mut self, myself: &ActorRef<EngineMessage>) {
        let jobs = match self.store.list(&JobFilter::new()).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!("Failed to load unfinished jobs: {}", e);
                return;
            }
        };

        let mut resumed = 0usize;
        for job in jobs {
            match job.status {
                JobStatus::Queued | JobStatus::Retrying => {
                    self.mark_ready(job.id);
                    resumed += 1;
                }
                JobStatus::Processing => {
                    let outcome: BackendResult =
                        Err(ProcessingError::new("interrupted by engine restart"));
                    self.finish_attempt(myself, &job.id, job.attempts, outcome).await;
                    resumed += 1;
                }
                _ => {}
            }
        }

        if resumed > 0 {
            tracing::info!("Resumed {} unfinished jobs", resumed);
        }
    }

    /// A worker went away, possibly mid-attempt.
    async fn worker_lost(
        &mut self,
        myself: &ActorRef<EngineMessage>,
        worker_id: ActorId,
        reason: String,
    ) -> Result<(), ActorProcessingErr> {
        if self.workers.remove(&worker_id).is_none() {
            return Ok(());
        }
        self.idle.retain(|w| w.get_id() != worker_id);

        if let Some((job_id, attempt)) = self.busy.remove(&worker_id) {
            tracing::warn!("Worker running job {} was lost: {}", job_id, reason);
            let outcome: BackendResult = Err(ProcessingError::new(reason));
            self.finish_attempt(myself, &job_id, attempt, outcome).await;
        }

        if !self.stopping {
            self.spawn_worker(myself).await?;
            self.pump(myself).await;
        }
        Ok(())
    }

    fn stop_all(&mut self) {
        self.stopping = true;
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        for worker in self.workers.values() {
            let _ = worker.send_message(WorkerMessage::Shutdown);
        }
    }
}

/// Engine actor.
pub struct EngineActor;

impl Actor for EngineActor {
    type Msg = EngineMessage;
    type State = EngineState;
    type Arguments = EngineArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting job engine with {} workers (max {} attempts)",
            args.config.workers,
            args.config.max_attempts
        );

        let mut state = EngineState::new(args);
        for _ in 0..state.config.workers {
            state.spawn_worker(&myself).await?;
        }

        Ok(state)
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.recover(&myself).await;
        state.pump(&myself).await;
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            EngineMessage::Submit { request, reply } => {
                let result = state.submit(request).await;
                let job_id = result.as_ref().ok().map(|job| job.id.clone());
                let _ = reply.send(result);

                if let Some(job_id) = job_id {
                    state.mark_ready(job_id);
                    state.pump(&myself).await;
                }
            }

            EngineMessage::Dispatch { job_id } => {
                state.mark_ready(job_id);
                state.pump(&myself).await;
            }

            EngineMessage::BackoffElapsed { job_id } => {
                state.timers.remove(&job_id);
                state.mark_ready(job_id);
                state.pump(&myself).await;
            }

            EngineMessage::AttemptFinished {
                job_id,
                attempt,
                worker,
                outcome,
            } => {
                let worker_id = worker.get_id();
                state.busy.remove(&worker_id);
                if state.workers.contains_key(&worker_id) {
                    state.idle.push_back(worker);
                }

                state.finish_attempt(&myself, &job_id, attempt, outcome).await;
                state.pump(&myself).await;
            }

            EngineMessage::RecordOutcome {
                job_id,
                attempt,
                outcome,
            } => {
                state.finish_attempt(&myself, &job_id, attempt, outcome).await;
                state.pump(&myself).await;
            }

            EngineMessage::Cancel { job_id, reply } => {
                let _ = reply.send(state.cancel(job_id).await);
            }

            EngineMessage::Retry { job_id, reply } => {
                let result = state.retry(job_id).await;
                let job_id = result.as_ref().ok().map(|job| job.id.clone());
                let _ = reply.send(result);

                if let Some(job_id) = job_id {
                    state.mark_ready(job_id);
                    state.pump(&myself).await;
                }
            }

            EngineMessage::Shutdown => {
                tracing::info!("Shutting down job engine");
                state.stop_all();
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(cell, err) => {
                state
                    .worker_lost(&myself, cell.get_id(), format!("worker crashed: {}", err))
                    .await?;
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                let reason = format!(
                    "worker stopped: {}",
                    reason.unwrap_or_else(|| "no reason given".into())
                );
                state.worker_lost(&myself, cell.get_id(), reason).await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.stop_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use crate::local_backend::LocalBackend;
    use db::MemoryJobStore;
    use jobs_core::JobType;

    fn args(store: Arc<dyn JobStore>) -> EngineArgs {
        EngineArgs {
            config: EngineConfig::default().with_workers(1),
            store,
            backend: Arc::new(LocalBackend::new()),
            bus: Arc::new(InProcessBus::new()),
        }
    }

    #[tokio::test]
    async fn unreachable_worker_is_replaced_not_dropped() {
        let (engine, engine_handle) =
            Actor::spawn(None, EngineActor, args(Arc::new(MemoryJobStore::new())))
                .await
                .unwrap();

        let store = Arc::new(MemoryJobStore::new());
        let job = NewJob::new(JobType::Ocr, "lesson-1").into_job(3);
        store.put(&job).await.unwrap();
        let mut state = EngineState::new(args(store.clone()));

        let (dead, dead_handle) = Actor::spawn(
            None,
            WorkerActor,
            WorkerArgs {
                worker_id: "worker-dead".into(),
                engine: engine.clone(),
                backend: Arc::new(LocalBackend::new()),
                timeout: Duration::from_secs(1),
            },
        )
        .await
        .unwrap();
        dead.stop(None);
        dead_handle.await.unwrap();

        let dead_id = dead.get_id();
        state.workers.insert(dead_id, dead.clone());
        state.idle.push_back(dead);
        state.mark_ready(job.id.clone());
        state.pump(&engine).await;

        let after = store.get(&job.id).await.unwrap();
        assert_eq!(after.status, JobStatus::Retrying);
        assert_eq!(after.error.as_deref(), Some("worker unavailable"));
        assert!(state.busy.is_empty());
        assert!(state.workers.contains_key(&dead_id));

        state.worker_lost(&engine, dead_id, "worker stopped".into()).await.unwrap();
        assert_eq!(state.workers.len(), 1);
        assert!(!state.workers.contains_key(&dead_id));
        assert_eq!(state.idle.len(), 1);

        state.stop_all();
        engine.stop(None);
        engine_handle.await.unwrap();
    }
}
