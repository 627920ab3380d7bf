pub mod api;
mod public;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::Error as SqlxError;

use crate::application::customers::CustomerIntakeService;
use crate::application::error::ErrorReport;
use crate::application::jobs::DossierQueue;
use crate::infra::artifacts::ArtifactStorage;
use crate::infra::db::PostgresRepositories;

pub use api::build_api_router;
pub use public::build_public_router;

/// Liveness probe for the backing database.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<(), SqlxError>;
}

#[async_trait]
impl HealthProbe for PostgresRepositories {
    async fn check(&self) -> Result<(), SqlxError> {
        self.health_check().await
    }
}

#[derive(Clone)]
pub struct HttpState {
    pub intake: Arc<CustomerIntakeService>,
    pub queue: DossierQueue,
    pub artifacts: Arc<ArtifactStorage>,
    pub health: Arc<dyn HealthProbe>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .merge(build_public_router())
        .merge(build_api_router())
        .with_state(state)
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_database_answers_no_content() {
        assert_eq!(db_health_response(Ok(())).status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn failing_database_attaches_report() {
        let response = db_health_response(Err(SqlxError::PoolTimedOut));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.source, "infra::http::db_health");
    }
}
