//! Customer registration: summary, persistence and the optional render request.

use std::{sync::Arc, time::Duration};

use metrics::counter;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    application::{
        jobs::{DossierQueue, EnqueueError},
        repos::{CreateCustomerParams, CustomersRepo, RepoError},
        summary::{SummaryService, fallback_summary},
    },
    domain::{
        customer::{CustomerDetails, CustomerProfile},
        error::DomainError,
    },
    infra::telemetry::SUMMARY_FALLBACK_TOTAL,
};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("registration limit of {limit} customers has been reached")]
    LimitReached { limit: u64 },
    #[error("failed to store customer: {0}")]
    Repo(#[from] RepoError),
}

/// Maximum number of stored customers accepted by registration.
pub const REGISTRATION_LIMIT: u64 = 1000;

const GENDERS: [&str; 3] = ["Male", "Female", "Other"];

#[derive(Debug, Clone)]
pub struct RegisteredCustomer {
    pub profile: CustomerProfile,
    /// Identifier of the queued render, when queueing is enabled and the enqueue succeeded.
    pub render_job: Option<String>,
}

#[derive(Clone)]
pub struct CustomerIntakeService {
    customers: Arc<dyn CustomersRepo>,
    summaries: SummaryService,
    queue: DossierQueue,
    summary_timeout: Duration,
}

impl CustomerIntakeService {
    pub fn new(
        customers: Arc<dyn CustomersRepo>,
        summaries: SummaryService,
        queue: DossierQueue,
        summary_timeout: Duration,
    ) -> Self {
        Self {
            customers,
            summaries,
            queue,
            summary_timeout,
        }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<CustomerProfile>, RepoError> {
        self.customers.find_customer(id).await
    }

    /// Create a customer record.
    ///
    /// Summary generation and the render request never fail registration: the
    /// summary falls back to a fixed sentence and enqueue errors are only logged.
    pub async fn register(
        &self,
        mut details: CustomerDetails,
    ) -> Result<RegisteredCustomer, IntakeError> {
        const TARGET: &str = "application::customers::CustomerIntakeService::register";

        validate(&details)?;
        details.email = details.email.trim().to_lowercase();

        let existing = self.customers.count_customers().await?;
        if existing >= REGISTRATION_LIMIT {
            return Err(IntakeError::LimitReached {
                limit: REGISTRATION_LIMIT,
            });
        }

        let summary = match timeout(self.summary_timeout, self.summaries.summarize(&details)).await
        {
            Ok(Ok(summary)) => summary,
            Ok(Err(err)) => {
                warn!(target = TARGET, error = %err, "summary unavailable; using registration fallback");
                counter!(SUMMARY_FALLBACK_TOTAL, "provider" => "registration").increment(1);
                fallback_summary(&details)
            }
            Err(_) => {
                warn!(
                    target = TARGET,
                    timeout_ms = self.summary_timeout.as_millis() as u64,
                    "summary timed out; using registration fallback"
                );
                counter!(SUMMARY_FALLBACK_TOTAL, "provider" => "registration").increment(1);
                fallback_summary(&details)
            }
        };

        let profile = self
            .customers
            .create_customer(CreateCustomerParams { details, summary })
            .await?;

        info!(target = TARGET, customer_id = %profile.id, "customer registered");

        let render_job = if self.queue.is_enabled() {
            match self.queue.enqueue(&profile.id.to_string()).await {
                Ok(job_id) => Some(job_id),
                Err(err) => {
                    log_enqueue_failure(profile.id, &err);
                    None
                }
            }
        } else {
            None
        };

        Ok(RegisteredCustomer {
            profile,
            render_job,
        })
    }
}

fn validate(details: &CustomerDetails) -> Result<(), DomainError> {
    if details.first_name.trim().is_empty() {
        return Err(DomainError::validation("first name must not be empty"));
    }
    if details.last_name.trim().is_empty() {
        return Err(DomainError::validation("last name must not be empty"));
    }
    let email = details.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(DomainError::validation("email address is not valid")),
    }
    if details
        .gender
        .as_deref()
        .is_some_and(|gender| !GENDERS.contains(&gender))
    {
        return Err(DomainError::validation(format!(
            "gender must be one of {}",
            GENDERS.join(", ")
        )));
    }
    if details.age.is_some_and(|age| age < 0) {
        return Err(DomainError::validation("age must not be negative"));
    }
    Ok(())
}

fn log_enqueue_failure(customer_id: Uuid, err: &EnqueueError) {
    error!(
        target = "application::customers::CustomerIntakeService::register",
        customer_id = %customer_id,
        error = %err,
        "failed to enqueue dossier render; customer kept without dossier"
    );
}
