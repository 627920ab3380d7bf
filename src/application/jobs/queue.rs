use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::{Instant, sleep};

use crate::{
    application::repos::{JobQueryFilter, JobsRepo, NewJobRecord, RepoError},
    domain::{
        entities::JobRecord,
        types::{JobQueue, JobState},
    },
};

const DEFAULT_WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Enqueue a job with the provided payload, returning the assigned identifier.
pub async fn enqueue_job<J, P>(
    repo: &J,
    queue: JobQueue,
    payload: &P,
    run_at: Option<OffsetDateTime>,
    max_attempts: i32,
) -> Result<String, RepoError>
where
    J: JobsRepo + ?Sized,
    P: serde::Serialize,
{
    let payload = serde_json::to_value(payload)
        .map_err(|err| RepoError::from_persistence(err.to_string()))?;
    let record = NewJobRecord {
        queue,
        payload,
        run_at: run_at.unwrap_or_else(OffsetDateTime::now_utc),
        max_attempts,
    };

    repo.enqueue_job(record).await
}

/// Block until the job finishes or the timeout elapses, returning the final job snapshot.
///
/// A dead-lettered job is reported as an error carrying its last failure.
pub async fn wait_for_job_completion<J>(
    repo: &J,
    job_id: &str,
    timeout: Duration,
) -> Result<JobRecord, RepoError>
where
    J: JobsRepo + ?Sized,
{
    let deadline = Instant::now() + timeout;

    loop {
        let job = repo
            .find_job(job_id)
            .await?
            .ok_or_else(|| RepoError::from_persistence(format!("job `{job_id}` not found")))?;

        match job.state {
            JobState::Done => return Ok(job),
            JobState::Killed => {
                let message = job
                    .last_error
                    .unwrap_or_else(|| "job failed without error text".to_string());
                return Err(RepoError::from_persistence(message));
            }
            JobState::Pending | JobState::Running => {
                if Instant::now() >= deadline {
                    return Err(RepoError::from_persistence(format!(
                        "job `{job_id}` timed out after {timeout:?}"
                    )));
                }

                sleep(DEFAULT_WAIT_POLL_INTERVAL).await;
            }
        }
    }
}

/// Jobs on `queue` that were moved to the dead-letter state, newest first.
pub async fn list_dead_letters<J>(
    repo: &J,
    queue: JobQueue,
    limit: u32,
) -> Result<Vec<JobRecord>, RepoError>
where
    J: JobsRepo + ?Sized,
{
    let filter = JobQueryFilter {
        queue: Some(queue),
        state: Some(JobState::Killed),
        limit: Some(limit),
    };
    repo.list_jobs(&filter).await
}
