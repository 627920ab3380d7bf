use std::sync::Arc;

use crate::application::{dossier::DossierRenderer, repos::CustomersRepo};

/// Shared context passed to job handlers so they can reach the record store and renderer.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub customers: Arc<dyn CustomersRepo>,
    pub renderer: Arc<DossierRenderer>,
}

impl JobWorkerContext {
    pub fn new(customers: Arc<dyn CustomersRepo>, renderer: Arc<DossierRenderer>) -> Self {
        Self {
            customers,
            renderer,
        }
    }
}
