//! Repository traits describing persistence adapters.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::customer::{CustomerDetails, CustomerProfile, DossierArtifact};
use crate::domain::entities::JobRecord;
use crate::domain::types::{JobQueue, JobState};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateCustomerParams {
    pub details: CustomerDetails,
    pub summary: String,
}

#[async_trait]
pub trait CustomersRepo: Send + Sync {
    async fn create_customer(
        &self,
        params: CreateCustomerParams,
    ) -> Result<CustomerProfile, RepoError>;

    async fn find_customer(&self, id: Uuid) -> Result<Option<CustomerProfile>, RepoError>;

    async fn count_customers(&self) -> Result<u64, RepoError>;

    /// Store the pointer to a freshly rendered dossier. Both fields are written in one statement.
    async fn update_artifact(
        &self,
        id: Uuid,
        artifact: &DossierArtifact,
    ) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub queue: JobQueue,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
}

#[derive(Debug, Clone)]
pub struct UpdateJobStateParams {
    pub id: String,
    pub state: JobState,
    pub last_error: Option<String>,
    pub run_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct JobQueryFilter {
    pub queue: Option<JobQueue>,
    pub state: Option<JobState>,
    pub limit: Option<u32>,
}

/// Durable, at-least-once message channel.
/// `last_error` of a job whose final delivery never settled.
pub const LEASE_EXPIRED_ERROR: &str = "lease expired after final attempt";

#[async_trait]
pub trait JobsRepo: Send + Sync {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError>;

    /// Lock the oldest due `Pending` job on `queue`, mark it `Running` and count the attempt.
    ///
    /// `Running` jobs whose lock is older than `lease` belong to a crashed worker and are
    /// redelivered as well, unless that delivery was their last attempt: those move to
    /// `Killed` with [`LEASE_EXPIRED_ERROR`] instead.
    async fn claim_next_job(
        &self,
        queue: JobQueue,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<JobRecord>, RepoError>;

    async fn update_job_state(&self, params: UpdateJobStateParams) -> Result<(), RepoError>;

    async fn find_job(&self, id: &str) -> Result<Option<JobRecord>, RepoError>;

    async fn list_jobs(&self, filter: &JobQueryFilter) -> Result<Vec<JobRecord>, RepoError>;
}
