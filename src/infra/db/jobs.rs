use std::{convert::TryFrom, time::Duration};

use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::{
    application::repos::{
        JobQueryFilter, JobsRepo, LEASE_EXPIRED_ERROR, NewJobRecord, RepoError,
        UpdateJobStateParams,
    },
    domain::{
        entities::JobRecord,
        types::{JobQueue, JobState},
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const JOB_COLUMNS: &str = "id, queue, payload, status, attempts, max_attempts, run_at, \
     lock_at, lock_by, done_at, last_error, created_at";
const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 200;

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    queue: String,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    max_attempts: i32,
    run_at: OffsetDateTime,
    lock_at: Option<OffsetDateTime>,
    lock_by: Option<String>,
    done_at: Option<OffsetDateTime>,
    last_error: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = RepoError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let queue = JobQueue::try_from(row.queue.as_str())
            .map_err(|_| RepoError::from_persistence(format!("unknown job queue `{}`", row.queue)))?;

        let state = JobState::try_from(row.status.as_str()).map_err(|_| {
            RepoError::from_persistence(format!("unknown job state `{}`", row.status))
        })?;

        Ok(Self {
            id: row.id,
            queue,
            payload: row.payload,
            state,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            run_at: row.run_at,
            lock_at: row.lock_at,
            lock_by: row.lock_by,
            done_at: row.done_at,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl JobsRepo for PostgresRepositories {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO dossier_jobs (id, queue, payload, status, max_attempts, run_at)
            VALUES ($1, $2, $3, 'Pending', $4, $5)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(job.queue.as_str())
        .bind(job.payload)
        .bind(job.max_attempts)
        .bind(job.run_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn claim_next_job(
        &self,
        queue: JobQueue,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<JobRecord>, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let expired = sqlx::query(
            r#"
            UPDATE dossier_jobs
               SET status = 'Killed',
                   last_error = $3,
                   lock_at = NULL,
                   lock_by = NULL,
                   done_at = now()
             WHERE queue = $1
               AND status = 'Running'
               AND attempts >= max_attempts
               AND lock_at < now() - ($2::double precision * interval '1 second')
            "#,
        )
        .bind(queue.as_str())
        .bind(lease.as_secs_f64())
        .bind(LEASE_EXPIRED_ERROR)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if expired.rows_affected() > 0 {
            warn!(
                target = "infra::db::jobs::claim_next_job",
                queue = queue.as_str(),
                killed = expired.rows_affected(),
                "dead-lettered jobs whose final delivery never settled"
            );
        }

        let sql = format!(
            "UPDATE dossier_jobs
                SET status = 'Running',
                    attempts = attempts + 1,
                    lock_at = now(),
                    lock_by = $2
              WHERE id = (
                    SELECT id
                      FROM dossier_jobs
                     WHERE queue = $1
                       AND ((status = 'Pending' AND run_at <= now())
                         OR (status = 'Running'
                             AND attempts < max_attempts
                             AND lock_at < now() - ($3::double precision * interval '1 second')))
                     ORDER BY run_at ASC, created_at ASC
                     LIMIT 1
                       FOR UPDATE SKIP LOCKED
              )
          RETURNING {JOB_COLUMNS}"
        );

        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(queue.as_str())
            .bind(worker_id)
            .bind(lease.as_secs_f64())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn update_job_state(&self, params: UpdateJobStateParams) -> Result<(), RepoError> {
        let UpdateJobStateParams {
            id,
            state,
            last_error,
            run_at,
        } = params;

        let result = sqlx::query(
            r#"
            UPDATE dossier_jobs
               SET status = $2,
                   last_error = $3,
                   run_at = COALESCE($4, run_at),
                   lock_at = NULL,
                   lock_by = NULL,
                   done_at = CASE
                       WHEN $2 IN ('Done', 'Killed') THEN COALESCE(done_at, now())
                       ELSE NULL
                   END
             WHERE id = $1
            "#,
        )
        .bind(&id)
        .bind(state.as_str())
        .bind(last_error.as_deref())
        .bind(run_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        Ok(())
    }

    async fn find_job(&self, id: &str) -> Result<Option<JobRecord>, RepoError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM dossier_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn list_jobs(&self, filter: &JobQueryFilter) -> Result<Vec<JobRecord>, RepoError> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        let mut qb = QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM dossier_jobs WHERE 1=1 "));

        if let Some(queue) = filter.queue {
            qb.push("AND queue = ");
            qb.push_bind(queue.as_str());
        }

        if let Some(state) = filter.state {
            qb.push(" AND status = ");
            qb.push_bind(state.as_str());
        }

        qb.push(" ORDER BY COALESCE(done_at, run_at) DESC, id DESC ");
        qb.push("LIMIT ");
        qb.push_bind(i64::from(limit));

        let rows = qb
            .build_query_as::<JobRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }
}
