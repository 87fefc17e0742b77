use db::{DbConfig, DbError, repositories::SurrealJobStore};

/// Fresh SurrealDB store on its own in-memory datastore.
pub async fn surreal_store() -> Result<SurrealJobStore, DbError> {
    let db = db::init(DbConfig::memory()).await?;
    Ok(SurrealJobStore::new(db))
}
