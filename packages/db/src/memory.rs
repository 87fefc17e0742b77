//! In-memory job store for tests and local development.

use std::collections::HashMap;

use futures_util::FutureExt;
use jobs_core::{Job, JobId, JobStatus};
use tokio::sync::RwLock;

use crate::{DbError, JobFilter, JobStore, StoreFuture};

/// Process-local job store.
///
/// Every operation holds the map lock for its whole duration, so
/// `put_if` is a true compare-and-set.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

impl JobStore for MemoryJobStore {
    fn get<'a>(&'a self, id: &'a JobId) -> StoreFuture<'a, Job> {
        async move {
            self.jobs
                .read()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
        }
        .boxed()
    }

    fn put<'a>(&'a self, job: &'a Job) -> StoreFuture<'a, ()> {
        async move {
            self.jobs.write().await.insert(job.id.clone(), job.clone());
            Ok(())
        }
        .boxed()
    }

    fn put_if<'a>(&'a self, job: &'a Job, expected: &'a [JobStatus]) -> StoreFuture<'a, bool> {
        async move {
            let mut jobs = self.jobs.write().await;
            match jobs.get(&job.id) {
                Some(current) if expected.contains(&current.status) => {
                    jobs.insert(job.id.clone(), job.clone());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
        .boxed()
    }

    fn list<'a>(&'a self, filter: &'a JobFilter) -> StoreFuture<'a, Vec<Job>> {
        async move {
            let mut jobs: Vec<Job> = self
                .jobs
                .read()
                .await
                .values()
                .filter(|j| filter.matches(j))
                .cloned()
                .collect();

            jobs.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });

            Ok(jobs
                .into_iter()
                .skip(filter.offset.unwrap_or(0))
                .take(filter.limit.unwrap_or(usize::MAX))
                .collect())
        }
        .boxed()
    }
}
