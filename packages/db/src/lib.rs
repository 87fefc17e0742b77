//! Job record storage for the processing engine.
//!
//! This crate provides the [`JobStore`] contract the engine persists
//! through, plus two implementations:
//!
//! - [`MemoryJobStore`]: process-local map, for tests and development
//! - [`repositories::SurrealJobStore`]: SurrealDB-backed records
//!
//! # Features
//!
//! `mem://` is always available. Persistent engines are opt-in:
//!
//! - `surrealkv`: `surrealkv://path` endpoints
//! - `rocksdb`: `rocksdb://path` endpoints

mod connection;
mod memory;
mod schema;
mod store;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use memory::MemoryJobStore;
pub use schema::init_schema;
pub use store::{JobFilter, JobStore, StoreFuture};

/// Connect to the database and make sure the schema exists.
pub async fn init(config: DbConfig) -> Result<Database, DbError> {
    let db = connect(&config).await?;
    init_schema(&db).await?;
    Ok(db)
}
