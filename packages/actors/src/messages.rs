//! Message types for actor communication.

use jobs_core::{Job, JobId, NewJob};
use ractor::{ActorRef, RpcReplyPort};

use crate::backend::BackendResult;
use crate::error::EngineError;

/// Messages for the engine actor.
#[derive(Debug)]
pub enum EngineMessage {
    /// Persist a new job and trigger its dispatch.
    Submit {
        request: NewJob,
        reply: RpcReplyPort<Result<Job, EngineError>>,
    },

    /// Try to move a job into `processing`. Redundant triggers are no-ops.
    Dispatch { job_id: JobId },

    /// A backoff timer fired, or a claim that hit a store error is due again.
    BackoffElapsed { job_id: JobId },

    /// A worker finished a backend call.
    AttemptFinished {
        job_id: JobId,
        attempt: u32,
        worker: ActorRef<WorkerMessage>,
        outcome: BackendResult,
    },

    /// Redelivery of an outcome the store failed to record.
    RecordOutcome {
        job_id: JobId,
        attempt: u32,
        outcome: BackendResult,
    },

    /// Cancel a job that is not yet in flight.
    Cancel {
        job_id: JobId,
        reply: RpcReplyPort<Result<Job, EngineError>>,
    },

    /// Start a fresh attempt cycle for a failed job.
    Retry {
        job_id: JobId,
        reply: RpcReplyPort<Result<Job, EngineError>>,
    },

    /// Stop workers and timers, then the engine itself.
    Shutdown,
}

/// Messages for a worker actor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run one backend call for a job already moved to `processing`.
    Execute { job: Box<Job> },

    /// Shutdown the worker.
    Shutdown,
}
