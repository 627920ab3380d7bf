mod context;
mod dossier;
mod queue;
mod worker;

pub use context::JobWorkerContext;
pub use dossier::{
    DossierQueue, EnqueueError, JobError, RenderDossierJobPayload, process_render_dossier_job,
};
pub use queue::{enqueue_job, list_dead_letters, wait_for_job_completion};
pub use worker::{JobOutcome, JobRuntime, RetryPolicy};
