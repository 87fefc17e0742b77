//! Worker actor for executing backend calls.

use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::backend::{BackendResult, ProcessingBackend, ProcessingError, ProcessingRequest};
use crate::messages::{EngineMessage, WorkerMessage};

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    /// Engine that hands out jobs and receives outcomes.
    pub engine: ActorRef<EngineMessage>,
    pub backend: Arc<dyn ProcessingBackend>,
    /// Bound on a single backend call.
    pub timeout: Duration,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub engine: ActorRef<EngineMessage>,
    pub backend: Arc<dyn ProcessingBackend>,
    pub timeout: Duration,
}

/// Worker actor that runs one backend call at a time.
///
/// Long calls block only this worker's mailbox, never the engine's.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!("Starting worker: {}", args.worker_id);

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            engine: args.engine,
            backend: args.backend,
            timeout: args.timeout,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Execute { job } => {
                let request = ProcessingRequest::from(job.as_ref());
                tracing::debug!(
                    "Worker {} executing {} job {} (attempt {})",
                    state.worker_id,
                    request.job_type,
                    request.job_id,
                    request.attempt
                );

                let outcome = run_with_timeout(state.backend.as_ref(), &request, state.timeout).await;

                if let Err(e) = state.engine.send_message(EngineMessage::AttemptFinished {
                    job_id: request.job_id.clone(),
                    attempt: request.attempt,
                    worker: myself.clone(),
                    outcome,
                }) {
                    tracing::warn!(
                        "Worker {} could not report job {}: {}",
                        state.worker_id,
                        request.job_id,
                        e
                    );
                    myself.stop(None);
                }
            }

            WorkerMessage::Shutdown => {
                tracing::debug!("Shutting down worker: {}", state.worker_id);
                myself.stop(None);
            }
        }

        Ok(())
    }
}

/// Run one backend call, turning an expired deadline into a failed attempt.
pub(crate) async fn run_with_timeout(
    backend: &dyn ProcessingBackend,
    request: &ProcessingRequest,
    timeout: Duration,
) -> BackendResult {
    match tokio::time::timeout(timeout, backend.execute(request)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ProcessingError::new(format!(
            "job timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}
