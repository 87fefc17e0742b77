//! Core domain types for the content-processing job engine.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobType and JobStatus for work items
//! - JobNotification for state-change events
//! - RetryPolicy and EngineConfig for engine behavior
//! - ProcessingOutput for typed backend results

mod config;
mod events;
mod job;
mod output;
mod retry;

pub use config::{ConfigError, EngineConfig};
pub use events::JobNotification;
pub use job::{InvalidJobType, Job, JobId, JobStatus, JobType, NewJob};
pub use output::{Caption, ProcessingOutput};
pub use retry::RetryPolicy;
