//! Job engine for content-processing work.
//!
//! This crate runs the job lifecycle on Ractor actors and defines the
//! seams to the processing backend and the notification bus.
//!
//! # Architecture
//!
//! - `EngineActor` - Owns every job transition and the ready queue
//! - `WorkerActor` - Runs one backend call at a time, linked to the engine
//! - `JobEngine` - Cloneable handle used by callers
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use actors::{JobEngine, LocalBackend};
//! use db::MemoryJobStore;
//!
//! let (engine, handle) = JobEngine::builder(Arc::new(MemoryJobStore::new()), Arc::new(LocalBackend::new()))
//!     .start()
//!     .await?;
//!
//! let job = engine.enqueue("summarize", "lesson-42", None).await?;
//! let mut updates = engine.subscribe();
//! ```

mod backend;
mod bus;
mod engine;
mod engine_actor;
mod error;
mod local_backend;
mod messages;
mod worker_actor;

pub use backend::{
    BackendFuture, BackendRegistry, BackendResult, FnBackend, ProcessingBackend, ProcessingError,
    ProcessingRequest,
};
pub use bus::{InProcessBus, NotificationBus, Subscription};
pub use engine::{EngineBuilder, JobEngine};
pub use engine_actor::{CANCELLED_BY_USER, EngineActor, EngineArgs};
pub use error::EngineError;
pub use local_backend::LocalBackend;
pub use messages::{EngineMessage, WorkerMessage};
pub use worker_actor::WorkerActor;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef};
