//! SurrealDB-backed job store.

use chrono::SecondsFormat;
use futures_util::FutureExt;
use jobs_core::{Job, JobId, JobStatus};
use serde::{Deserialize, Serialize};

use crate::{Database, DbError, JobFilter, JobStore, StoreFuture};

const TABLE: &str = "job";
const FIELDS: &str = "job_id, status, job_type, subject_id, created_at, document";

/// Job store persisting records in the `job` table.
#[derive(Clone)]
pub struct SurrealJobStore {
    db: Database,
}

/// Internal record type for SurrealDB.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    job_id: String,
    status: String,
    job_type: String,
    subject_id: String,
    /// RFC 3339 with fixed precision, so string order is time order.
    created_at: String,
    document: String,
}

impl JobRecord {
    fn from_job(job: &Job) -> Result<Self, DbError> {
        Ok(Self {
            job_id: job.id.to_string(),
            status: job.status.as_str().to_string(),
            job_type: job.job_type.as_str().to_string(),
            subject_id: job.subject_id.clone(),
            created_at: job.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            document: serde_json::to_string(job)?,
        })
    }

    fn into_job(self) -> Result<Job, DbError> {
        Ok(serde_json::from_str(&self.document)?)
    }
}

impl SurrealJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, DbError> {
        let mut response = self
            .db
            .query(format!("SELECT {FIELDS} FROM type::thing($table, $id)"))
            .bind(("table", TABLE))
            .bind(("id", id.to_string()))
            .await?;

        let records: Vec<JobRecord> = response.take(0)?;

        records
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))?
            .into_job()
    }

    async fn put_job(&self, job: &Job) -> Result<(), DbError> {
        let record = JobRecord::from_job(job)?;

        self.db
            .query("UPSERT type::thing($table, $id) CONTENT $record RETURN NONE")
            .bind(("table", TABLE))
            .bind(("id", job.id.to_string()))
            .bind(("record", record))
            .await?
            .check()?;

        Ok(())
    }

    async fn put_job_if(&self, job: &Job, expected: &[JobStatus]) -> Result<bool, DbError> {
        let record = JobRecord::from_job(job)?;
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();

        // A single UPDATE statement runs in its own transaction, so the
        // status check and the write cannot interleave with another writer.
        let mut response = self
            .db
            .query(format!(
                "UPDATE type::thing($table, $id) CONTENT $record \
                 WHERE status IN $expected RETURN {FIELDS}"
            ))
            .bind(("table", TABLE))
            .bind(("id", job.id.to_string()))
            .bind(("record", record))
            .bind(("expected", expected))
            .await?;

        let updated: Vec<JobRecord> = response.take(0)?;

        Ok(!updated.is_empty())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, DbError> {
        let mut conditions = Vec::new();
        let mut bindings: Vec<(&'static str, String)> = Vec::new();

        if let Some(status) = &filter.status {
            conditions.push("status = $status");
            bindings.push(("status", status.as_str().to_string()));
        }

        if let Some(job_type) = &filter.job_type {
            conditions.push("job_type = $job_type");
            bindings.push(("job_type", job_type.as_str().to_string()));
        }

        if let Some(subject_id) = &filter.subject_id {
            conditions.push("subject_id = $subject_id");
            bindings.push(("subject_id", subject_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit_clause = filter
            .limit
            .map(|l| format!("LIMIT {}", l))
            .unwrap_or_default();

        let offset_clause = filter
            .offset
            .map(|o| format!("START {}", o))
            .unwrap_or_default();

        let query = format!(
            "SELECT {FIELDS} FROM {TABLE} {} ORDER BY created_at ASC, job_id ASC {} {}",
            where_clause, limit_clause, offset_clause
        );

        let mut result = self.db.query(query);

        for (name, value) in bindings {
            result = result.bind((name, value));
        }

        let mut response = result.await?;
        let records: Vec<JobRecord> = response.take(0)?;

        records.into_iter().map(JobRecord::into_job).collect()
    }
}

impl JobStore for SurrealJobStore {
    fn get<'a>(&'a self, id: &'a JobId) -> StoreFuture<'a, Job> {
        self.get_job(id).boxed()
    }

    fn put<'a>(&'a self, job: &'a Job) -> StoreFuture<'a, ()> {
        self.put_job(job).boxed()
    }

    fn put_if<'a>(&'a self, job: &'a Job, expected: &'a [JobStatus]) -> StoreFuture<'a, bool> {
        self.put_job_if(job, expected).boxed()
    }

    fn list<'a>(&'a self, filter: &'a JobFilter) -> StoreFuture<'a, Vec<Job>> {
        self.list_jobs(filter).boxed()
    }
}
