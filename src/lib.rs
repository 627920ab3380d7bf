//! KYC dossier pipeline: customer intake with generated summaries and
//! durable PDF dossier rendering.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
