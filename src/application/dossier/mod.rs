//! PDF dossier rendering.
//!
//! Rendering is split into a pure [`DossierLayout`] build, PDF serialisation and a
//! two-phase persist: the file is durably written and renamed into place by
//! [`ArtifactStorage`], then the profile pointer is updated in a single statement.
//! If that update fails the freshly written file is removed again, so a failed
//! render never leaves an orphan behind.

mod layout;
mod pdf;

use std::{sync::Arc, time::Instant};

use metrics::histogram;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    application::repos::{CustomersRepo, RepoError},
    domain::customer::{CustomerProfile, DossierArtifact},
    infra::{
        artifacts::{ArtifactStorage, ArtifactStorageError},
        telemetry::RENDER_MS,
    },
};

pub use layout::{
    DossierField, DossierLayout, DossierSection, FIELDS_HEADING, NOT_AVAILABLE, NOTES_HEADING,
    SUMMARY_HEADING, SUMMARY_UNAVAILABLE, TITLE,
};
pub use pdf::write_pdf;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to store dossier: {0}")]
    Storage(#[from] ArtifactStorageError),
    #[error("failed to produce pdf: {0}")]
    Pdf(String),
}

#[derive(Debug, Error)]
pub enum DossierError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to persist dossier pointer: {source}")]
    Persist {
        #[source]
        source: RepoError,
    },
}

#[derive(Clone)]
pub struct DossierRenderer {
    storage: Arc<ArtifactStorage>,
    customers: Arc<dyn CustomersRepo>,
}

impl DossierRenderer {
    pub fn new(storage: Arc<ArtifactStorage>, customers: Arc<dyn CustomersRepo>) -> Self {
        Self { storage, customers }
    }

    pub fn storage(&self) -> &ArtifactStorage {
        &self.storage
    }

    /// Render a fresh dossier for `profile` and point the profile at it.
    ///
    /// Every call produces a new file; earlier files are left untouched.
    pub async fn render(
        &self,
        profile: &mut CustomerProfile,
    ) -> Result<DossierArtifact, DossierError> {
        let started = Instant::now();
        let generated_at = OffsetDateTime::now_utc();

        let layout = DossierLayout::build(profile, generated_at);
        let bytes = write_pdf(&layout)?;
        let file_name = self
            .storage
            .store_pdf(profile.id, generated_at, &bytes)
            .await
            .map_err(RenderError::from)?;

        let artifact = DossierArtifact::for_file(&file_name, generated_at);
        if let Err(source) = self.customers.update_artifact(profile.id, &artifact).await {
            if let Err(cleanup) = self.storage.delete(&file_name).await {
                warn!(
                    target = "application::dossier::DossierRenderer::render",
                    customer_id = %profile.id,
                    file = %file_name,
                    error = %cleanup,
                    "failed to remove dossier after pointer update failure"
                );
            }
            return Err(DossierError::Persist { source });
        }

        profile.artifact = Some(artifact.clone());

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(RENDER_MS).record(elapsed_ms);
        info!(
            target = "application::dossier::DossierRenderer::render",
            customer_id = %profile.id,
            path = %artifact.path,
            bytes = bytes.len(),
            elapsed_ms,
            "dossier rendered"
        );

        Ok(artifact)
    }
}
