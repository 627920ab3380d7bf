//! Consume loop for the dossier render channel.
//!
//! One task per process claims jobs sequentially. Failed jobs are retried with
//! capped exponential backoff and end up in the `Killed` dead-letter state once
//! their attempts run out; permanent failures skip straight to it.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use metrics::counter;
use time::OffsetDateTime;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    application::repos::{JobsRepo, RepoError, UpdateJobStateParams},
    config::JobsSettings,
    domain::{
        customer::DossierArtifact,
        entities::JobRecord,
        types::{JobQueue, JobState},
    },
    infra::telemetry::{JOBS_COMPLETED_TOTAL, JOBS_DEAD_LETTERED_TOTAL, JOBS_RETRIED_TOTAL},
};

use super::{
    context::JobWorkerContext,
    dossier::{JobError, RenderDossierJobPayload, process_render_dossier_job},
};

/// Exponential backoff: `base * 2^(attempt - 1)`, never above `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    max: Duration,
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_settings(settings: &JobsSettings) -> Self {
        Self::new(settings.backoff_base, settings.backoff_max)
    }

    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1_u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// What happened to a single delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        job_id: String,
        artifact: DossierArtifact,
    },
    Retried {
        job_id: String,
        run_at: OffsetDateTime,
    },
    DeadLettered {
        job_id: String,
        reason: String,
    },
}

/// Owner of the per-process consumer.
#[derive(Clone)]
pub struct JobRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    jobs: Arc<dyn JobsRepo>,
    context: JobWorkerContext,
    enabled: bool,
    retry: RetryPolicy,
    job_timeout: Duration,
    poll_interval: Duration,
    worker_id: String,
    started: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl JobRuntime {
    pub fn new(
        jobs: Arc<dyn JobsRepo>,
        context: JobWorkerContext,
        settings: &JobsSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(RuntimeInner {
                jobs,
                context,
                enabled: settings.enabled,
                retry: RetryPolicy::from_settings(settings),
                job_timeout: settings.job_timeout,
                poll_interval: settings.poll_interval,
                worker_id: format!("dossier-worker-{}", Uuid::new_v4()),
                started: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.inner.worker_id
    }

    /// Spawn the consume loop.
    ///
    /// Returns `None` without side effects when queueing is disabled or the loop
    /// already runs in this process.
    pub fn start_worker(&self) -> Option<JoinHandle<()>> {
        if !self.inner.enabled {
            debug!(
                target = "application::jobs::JobRuntime::start_worker",
                "dossier queue disabled; worker not started"
            );
            return None;
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return None;
        }

        let runtime = self.clone();
        let shutdown = self.inner.shutdown.subscribe();
        Some(tokio::spawn(async move { runtime.consume(shutdown).await }))
    }

    /// Ask the loop to stop. A delivery in progress is finished first.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }

    /// Claim and settle at most one due job.
    pub async fn run_once(&self) -> Result<Option<JobOutcome>, RepoError> {
        let inner = &self.inner;
        let Some(job) = inner
            .jobs
            .claim_next_job(JobQueue::RenderDossier, &inner.worker_id, self.lease())
            .await?
        else {
            return Ok(None);
        };

        let result = self.execute(&job).await;
        self.settle(job, result).await.map(Some)
    }

    async fn consume(&self, mut shutdown: watch::Receiver<bool>) {
        const TARGET: &str = "application::jobs::JobRuntime::consume";
        info!(target = TARGET, worker_id = %self.inner.worker_id, "dossier worker started");

        let mut claim_failures: u32 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.run_once().await {
                Ok(Some(_)) => {
                    claim_failures = 0;
                    continue;
                }
                Ok(None) => {
                    claim_failures = 0;
                    self.inner.poll_interval
                }
                Err(err) => {
                    claim_failures = claim_failures.saturating_add(1);
                    let delay = self.inner.retry.delay_for(claim_failures);
                    warn!(
                        target = TARGET,
                        error = %err,
                        consecutive_failures = claim_failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "job channel unavailable; backing off"
                    );
                    delay
                }
            };

            tokio::select! {
                _ = sleep(idle) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!(target = TARGET, worker_id = %self.inner.worker_id, "dossier worker stopped");
    }

    fn lease(&self) -> Duration {
        self.inner.job_timeout.saturating_mul(2)
    }

    async fn execute(&self, job: &JobRecord) -> Result<DossierArtifact, JobError> {
        let payload: RenderDossierJobPayload = serde_json::from_value(job.payload.clone())
            .map_err(|err| JobError::InvalidPayload(err.to_string()))?;

        let limit = self.inner.job_timeout;
        match timeout(limit, process_render_dossier_job(payload, &self.inner.context)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::Timeout(limit)),
        }
    }

    async fn settle(
        &self,
        job: JobRecord,
        result: Result<DossierArtifact, JobError>,
    ) -> Result<JobOutcome, RepoError> {
        const TARGET: &str = "application::jobs::JobRuntime::settle";
        let jobs = &self.inner.jobs;

        match result {
            Ok(artifact) => {
                jobs.update_job_state(UpdateJobStateParams {
                    id: job.id.clone(),
                    state: JobState::Done,
                    last_error: None,
                    run_at: None,
                })
                .await?;
                counter!(JOBS_COMPLETED_TOTAL).increment(1);
                info!(
                    target = TARGET,
                    job_id = %job.id,
                    attempts = job.attempts,
                    path = %artifact.path,
                    "dossier job completed"
                );
                Ok(JobOutcome::Completed {
                    job_id: job.id,
                    artifact,
                })
            }
            Err(err) if err.is_permanent() || job.attempts >= job.max_attempts => {
                let reason = err.to_string();
                jobs.update_job_state(UpdateJobStateParams {
                    id: job.id.clone(),
                    state: JobState::Killed,
                    last_error: Some(reason.clone()),
                    run_at: None,
                })
                .await?;
                counter!(JOBS_DEAD_LETTERED_TOTAL).increment(1);
                error!(
                    target = TARGET,
                    job_id = %job.id,
                    attempts = job.attempts,
                    permanent = err.is_permanent(),
                    error = %err,
                    "dossier job dead-lettered"
                );
                Ok(JobOutcome::DeadLettered {
                    job_id: job.id,
                    reason,
                })
            }
            Err(err) => {
                let attempt = u32::try_from(job.attempts).unwrap_or(1).max(1);
                let delay = self.inner.retry.delay_for(attempt);
                let run_at = OffsetDateTime::now_utc() + delay;
                jobs.update_job_state(UpdateJobStateParams {
                    id: job.id.clone(),
                    state: JobState::Pending,
                    last_error: Some(err.to_string()),
                    run_at: Some(run_at),
                })
                .await?;
                counter!(JOBS_RETRIED_TOTAL).increment(1);
                warn!(
                    target = TARGET,
                    job_id = %job.id,
                    attempts = job.attempts,
                    max_attempts = job.max_attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "dossier job failed; retry scheduled"
                );
                Ok(JobOutcome::Retried {
                    job_id: job.id,
                    run_at,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(300));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(6), Duration::from_secs(32));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new(Duration::from_millis(500), Duration::from_secs(10));
        assert_eq!(policy.delay_for(10), Duration::from_secs(10));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn attempt_zero_uses_base_delay() {
        let policy = RetryPolicy::new(Duration::from_millis(250), Duration::from_secs(1));
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
    }
}
