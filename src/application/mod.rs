//! Application services: intake, summaries, dossier rendering and the job runtime.

pub mod customers;
pub mod dossier;
pub mod error;
pub mod jobs;
pub mod repos;
pub mod summary;
