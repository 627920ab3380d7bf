use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::{
    application::{
        dossier::{DossierError, RenderError},
        repos::{JobsRepo, RepoError},
    },
    config::JobsSettings,
    domain::{
        customer::{DossierArtifact, parse_customer_id},
        error::DomainError,
        types::JobQueue,
    },
};

use super::{context::JobWorkerContext, queue::enqueue_job};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderDossierJobPayload {
    pub customer_id: Uuid,
}

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("dossier rendering queue is disabled")]
    FeatureDisabled,
    #[error(transparent)]
    InvalidCustomerId(#[from] DomainError),
    #[error("failed to enqueue dossier render: {0}")]
    Repo(#[from] RepoError),
}

/// Producer side of the render channel.
#[derive(Clone)]
pub struct DossierQueue {
    jobs: Arc<dyn JobsRepo>,
    enabled: bool,
    max_attempts: i32,
}

impl DossierQueue {
    pub fn new(jobs: Arc<dyn JobsRepo>, settings: &JobsSettings) -> Self {
        Self {
            jobs,
            enabled: settings.enabled,
            max_attempts: i32::try_from(settings.max_attempts.get()).unwrap_or(i32::MAX),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn jobs(&self) -> &Arc<dyn JobsRepo> {
        &self.jobs
    }

    /// Persist a render request for `customer_id` and return the job identifier.
    pub async fn enqueue(&self, customer_id: &str) -> Result<String, EnqueueError> {
        if !self.enabled {
            return Err(EnqueueError::FeatureDisabled);
        }

        let customer_id = parse_customer_id(customer_id)?;
        let payload = RenderDossierJobPayload { customer_id };
        let job_id = enqueue_job(
            self.jobs.as_ref(),
            JobQueue::RenderDossier,
            &payload,
            None,
            self.max_attempts,
        )
        .await?;

        info!(
            target = "application::jobs::DossierQueue::enqueue",
            job_id = %job_id,
            customer_id = %customer_id,
            "dossier render enqueued"
        );

        Ok(job_id)
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job payload: {0}")]
    InvalidPayload(String),
    #[error("customer `{0}` not found")]
    NotFound(Uuid),
    #[error("failed to load customer: {0}")]
    Lookup(#[source] RepoError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to persist dossier pointer: {0}")]
    Persist(#[source] RepoError),
    #[error("job exceeded its {0:?} time limit")]
    Timeout(Duration),
}

impl JobError {
    /// Permanent failures are dead-lettered without another attempt.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            JobError::InvalidPayload(_)
                | JobError::NotFound(_)
                | JobError::Persist(RepoError::NotFound)
        )
    }
}

impl From<DossierError> for JobError {
    fn from(err: DossierError) -> Self {
        match err {
            DossierError::Render(err) => JobError::Render(err),
            DossierError::Persist { source } => JobError::Persist(source),
        }
    }
}

/// Resolve the customer referenced by the payload and render a fresh dossier.
pub async fn process_render_dossier_job(
    payload: RenderDossierJobPayload,
    context: &JobWorkerContext,
) -> Result<DossierArtifact, JobError> {
    let mut profile = context
        .customers
        .find_customer(payload.customer_id)
        .await
        .map_err(JobError::Lookup)?
        .ok_or(JobError::NotFound(payload.customer_id))?;

    let artifact = context.renderer.render(&mut profile).await?;
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_failures_skip_retries() {
        assert!(JobError::InvalidPayload("bad".into()).is_permanent());
        assert!(JobError::NotFound(Uuid::nil()).is_permanent());
        assert!(JobError::Persist(RepoError::NotFound).is_permanent());

        assert!(!JobError::Lookup(RepoError::Timeout).is_permanent());
        assert!(!JobError::Persist(RepoError::from_persistence("down")).is_permanent());
        assert!(!JobError::Render(RenderError::Pdf("broken".into())).is_permanent());
        assert!(!JobError::Timeout(Duration::from_secs(1)).is_permanent());
    }

    #[test]
    fn payload_carries_only_the_customer_id() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(RenderDossierJobPayload { customer_id: id })
            .expect("payload serialises");
        assert_eq!(value, serde_json::json!({ "customer_id": id.to_string() }));
    }
}
