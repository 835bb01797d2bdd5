use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::error::AppError;

use super::{
    db::SurrealDbClient,
    types::job_record::{JobRecord, JobRecordPatch, JobStatus},
};

/// Most recent records returned by a listing.
pub const LIST_LIMIT: usize = 50;

/// Keyed access to job records. Monitoring only ever reads; writes belong to the upload
/// path and to the pipeline stages.
#[async_trait]
pub trait JobRecordStore: Send + Sync {
    /// `Ok(None)` when no record exists for `job_id`.
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, AppError>;

    async fn create(&self, record: JobRecord) -> Result<JobRecord, AppError>;

    /// Overwrites the status (validated against the lifecycle) and merges `patch`.
    async fn update(
        &self,
        job_id: &str,
        status: JobStatus,
        patch: JobRecordPatch,
    ) -> Result<Option<JobRecord>, AppError>;

    async fn delete(&self, job_id: &str) -> Result<Option<JobRecord>, AppError>;

    /// A user's records, newest first, at most [`LIST_LIMIT`].
    async fn list(&self, user_id: &str) -> Result<Vec<JobRecord>, AppError>;
}

/// Job records kept in one SurrealDB table, keyed by job id.
#[derive(Clone)]
pub struct SurrealJobStore {
    db: Arc<SurrealDbClient>,
    table: String,
}

impl SurrealJobStore {
    pub fn new(db: Arc<SurrealDbClient>, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl JobRecordStore for SurrealJobStore {
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, AppError> {
        Ok(self.db.select((self.table.as_str(), job_id)).await?)
    }

    #[instrument(level = "debug", skip(self, record), fields(job_id = %record.job_id))]
    async fn create(&self, record: JobRecord) -> Result<JobRecord, AppError> {
        let job_id = record.job_id.clone();
        let created: Option<JobRecord> = self
            .db
            .create((self.table.as_str(), job_id.as_str()))
            .content(record)
            .await?;
        created.ok_or_else(|| AppError::Validation(format!("job record {job_id} was not created")))
    }

    #[instrument(level = "debug", skip(self, patch))]
    async fn update(
        &self,
        job_id: &str,
        status: JobStatus,
        patch: JobRecordPatch,
    ) -> Result<Option<JobRecord>, AppError> {
        let Some(mut record) = self.get(job_id).await? else {
            return Ok(None);
        };
        record.apply_update(status, patch, Utc::now())?;

        let updated: Option<JobRecord> = self
            .db
            .update((self.table.as_str(), job_id))
            .content(record)
            .await?;
        debug!(job_id, status = %status, "job record updated");
        Ok(updated)
    }

    async fn delete(&self, job_id: &str) -> Result<Option<JobRecord>, AppError> {
        Ok(self.db.delete((self.table.as_str(), job_id)).await?)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<JobRecord>, AppError> {
        let mut response = self
            .db
            .query("SELECT * FROM type::table($table) WHERE user_id = $user_id")
            .bind(("table", self.table.clone()))
            .bind(("user_id", user_id.to_owned()))
            .await?;
        let mut records: Vec<JobRecord> = response.take(0)?;

        // Timestamps are stored as RFC 3339 strings; order on the parsed values.
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(LIST_LIMIT);
        Ok(records)
    }
}
