#![allow(dead_code)]

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use kyc_dossier::application::repos::{
    CreateCustomerParams, CustomersRepo, JobQueryFilter, JobsRepo, LEASE_EXPIRED_ERROR, NewJobRecord,
    RepoError, UpdateJobStateParams,
};
use kyc_dossier::config::JobsSettings;
use kyc_dossier::domain::customer::{CustomerDetails, CustomerProfile, DossierArtifact};
use kyc_dossier::domain::entities::JobRecord;
use kyc_dossier::domain::types::{JobQueue, JobState};

pub fn jobs_settings(enabled: bool, max_attempts: u32) -> JobsSettings {
    JobsSettings {
        enabled,
        max_attempts: NonZeroU32::new(max_attempts).expect("non-zero attempts"),
        backoff_base: Duration::ZERO,
        backoff_max: Duration::ZERO,
        job_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
    }
}

pub fn ana() -> CustomerDetails {
    CustomerDetails {
        first_name: "Ana".into(),
        last_name: "Lee".into(),
        email: "Ana.Lee@Example.com".into(),
        age: Some(30),
        nationality: Some("Canada".into()),
        gender: Some("Female".into()),
        notes: Some("prefers email".into()),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct MemoryCustomersRepo {
    customers: Mutex<HashMap<Uuid, CustomerProfile>>,
    fail_updates: AtomicBool,
    lookup_delay: Mutex<Option<Duration>>,
    fail_lookups: AtomicBool,
}

impl MemoryCustomersRepo {
    pub async fn insert(&self, details: CustomerDetails, summary: Option<&str>) -> CustomerProfile {
        let now = OffsetDateTime::now_utc();
        let profile = CustomerProfile {
            id: Uuid::new_v4(),
            details,
            summary: summary.map(str::to_string),
            artifact: None,
            created_at: now,
            updated_at: now,
        };
        self.customers
            .lock()
            .await
            .insert(profile.id, profile.clone());
        profile
    }

    pub async fn get(&self, id: Uuid) -> Option<CustomerProfile> {
        self.customers.lock().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) {
        self.customers.lock().await.remove(&id);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub async fn delay_lookups(&self, delay: Duration) {
        *self.lookup_delay.lock().await = Some(delay);
    }
}

#[async_trait]
impl CustomersRepo for MemoryCustomersRepo {
    async fn create_customer(
        &self,
        params: CreateCustomerParams,
    ) -> Result<CustomerProfile, RepoError> {
        Ok(self.insert(params.details, Some(&params.summary)).await)
    }

    async fn find_customer(&self, id: Uuid) -> Result<Option<CustomerProfile>, RepoError> {
        let delay = *self.lookup_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(self.get(id).await)
    }

    async fn count_customers(&self) -> Result<u64, RepoError> {
        Ok(self.customers.lock().await.len() as u64)
    }

    async fn update_artifact(
        &self,
        id: Uuid,
        artifact: &DossierArtifact,
    ) -> Result<(), RepoError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("connection reset"));
        }
        let mut customers = self.customers.lock().await;
        let profile = customers.get_mut(&id).ok_or(RepoError::NotFound)?;
        profile.artifact = Some(artifact.clone());
        profile.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryJobsRepo {
    jobs: Mutex<HashMap<String, JobRecord>>,
    fail_enqueue: AtomicBool,
}

impl MemoryJobsRepo {
    pub fn fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    pub async fn all(&self) -> Vec<JobRecord> {
        self.jobs.lock().await.values().cloned().collect()
    }

    /// Insert a job with an arbitrary payload, bypassing typed enqueue.
    pub async fn insert_raw(&self, payload: serde_json::Value, max_attempts: i32) -> String {
        self.enqueue_job(NewJobRecord {
            queue: JobQueue::RenderDossier,
            payload,
            run_at: OffsetDateTime::now_utc(),
            max_attempts,
        })
        .await
        .expect("in-memory enqueue")
    }
}

#[async_trait]
impl JobsRepo for MemoryJobsRepo {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("broker unreachable"));
        }
        let id = Uuid::new_v4().to_string();
        let record = JobRecord {
            id: id.clone(),
            queue: job.queue,
            payload: job.payload,
            state: JobState::Pending,
            attempts: 0,
            max_attempts: job.max_attempts,
            run_at: job.run_at,
            lock_at: None,
            lock_by: None,
            done_at: None,
            last_error: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.jobs.lock().await.insert(id.clone(), record);
        Ok(id)
    }

    async fn claim_next_job(
        &self,
        queue: JobQueue,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<JobRecord>, RepoError> {
        let now = OffsetDateTime::now_utc();
        let mut jobs = self.jobs.lock().await;
        let stale = |lock_at: Option<OffsetDateTime>| lock_at.is_some_and(|at| at + lease < now);

        for job in jobs.values_mut().filter(|job| job.queue == queue) {
            if job.state == JobState::Running
                && stale(job.lock_at)
                && job.attempts >= job.max_attempts
            {
                job.state = JobState::Killed;
                job.last_error = Some(LEASE_EXPIRED_ERROR.to_string());
                job.lock_at = None;
                job.lock_by = None;
                job.done_at = Some(now);
            }
        }

        let next = jobs
            .values_mut()
            .filter(|job| job.queue == queue)
            .filter(|job| match job.state {
                JobState::Pending => job.run_at <= now,
                JobState::Running => stale(job.lock_at),
                JobState::Done | JobState::Killed => false,
            })
            .min_by_key(|job| (job.run_at, job.created_at));

        Ok(next.map(|job| {
            job.state = JobState::Running;
            job.attempts += 1;
            job.lock_at = Some(now);
            job.lock_by = Some(worker_id.to_string());
            job.clone()
        }))
    }

    async fn update_job_state(&self, params: UpdateJobStateParams) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        job.state = params.state;
        job.last_error = params.last_error;
        job.lock_at = None;
        job.lock_by = None;
        if let Some(run_at) = params.run_at {
            job.run_at = run_at;
        }
        if params.state.is_terminal() {
            job.done_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn find_job(&self, id: &str) -> Result<Option<JobRecord>, RepoError> {
        Ok(self.jobs.lock().await.get(id).cloned())
    }

    async fn list_jobs(&self, filter: &JobQueryFilter) -> Result<Vec<JobRecord>, RepoError> {
        let jobs = self.jobs.lock().await;
        let mut items: Vec<JobRecord> = jobs
            .values()
            .filter(|job| filter.queue.is_none_or(|queue| job.queue == queue))
            .filter(|job| filter.state.is_none_or(|state| job.state == state))
            .cloned()
            .collect();
        items.sort_by_key(|job| std::cmp::Reverse(job.done_at.unwrap_or(job.run_at)));
        items.truncate(filter.limit.unwrap_or(50) as usize);
        Ok(items)
    }
}

pub fn pdf_files(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("artifact dir readable")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".pdf"))
        .collect();
    names.sort();
    names
}
