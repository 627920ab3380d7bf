//! Short natural-language synopses of customer profiles.
//!
//! Two interchangeable backends sit behind [`SummaryProvider`]: a hosted inference
//! endpoint ([`PrimaryProvider`]) and a locally reachable one ([`AlternateProvider`]).
//! Both recover from every transport or response failure by returning the
//! deterministic [`placeholder_summary`], so the only error a caller can observe is
//! an unrecognised provider selector.

mod alternate;
mod primary;

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::warn;

use crate::{
    config::SummarySettings,
    domain::customer::{CustomerDetails, clamp_summary},
    infra::{error::InfraError, telemetry::SUMMARY_FALLBACK_TOTAL},
};

pub use alternate::AlternateProvider;
pub use primary::PrimaryProvider;

const REGISTRATION_TAIL: &str = "Customer registered for KYC verification.";
const PROMPT_INSTRUCTION: &str =
    "Create a brief 1-2 sentence professional customer summary for KYC verification";

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("unknown summary provider `{value}`; expected `primary` or `alternate`")]
    Configuration { value: String },
}

/// Failure talking to a backend. Always absorbed by the provider.
#[derive(Debug, Error)]
pub(crate) enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider answered with status {0}")]
    Status(StatusCode),
    #[error("provider response carried no generated text")]
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Primary,
    Alternate,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Primary => "primary",
            ProviderKind::Alternate => "alternate",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = SummaryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "primary" => Ok(ProviderKind::Primary),
            "alternate" => Ok(ProviderKind::Alternate),
            other => Err(SummaryError::Configuration {
                value: other.to_string(),
            }),
        }
    }
}

/// Produce summary text for a profile. Implementations never fail.
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn summarize(&self, details: &CustomerDetails) -> String;
}

/// Provider selected by configuration.
#[derive(Clone)]
pub struct SummaryService {
    provider: Result<Arc<dyn SummaryProvider>, String>,
}

impl SummaryService {
    pub fn from_settings(settings: &SummarySettings) -> Result<Self, InfraError> {
        let kind = match settings.provider.parse::<ProviderKind>() {
            Ok(kind) => kind,
            Err(err) => {
                warn!(
                    target = "application::summary::SummaryService::from_settings",
                    provider = %settings.provider,
                    error = %err,
                    "summary provider is not recognised; summaries will use the registration fallback"
                );
                return Ok(Self {
                    provider: Err(settings.provider.clone()),
                });
            }
        };

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build summary http client: {err}"))
            })?;

        let provider: Arc<dyn SummaryProvider> = match kind {
            ProviderKind::Primary => Arc::new(PrimaryProvider::new(
                client,
                settings.hosted_url.clone(),
                settings.api_key.clone(),
                settings.max_length.get(),
            )),
            ProviderKind::Alternate => Arc::new(AlternateProvider::new(
                client,
                &settings.local_url,
                settings.local_model.clone(),
                settings.temperature,
            )?),
        };

        Ok(Self::with_provider(provider))
    }

    pub fn with_provider(provider: Arc<dyn SummaryProvider>) -> Self {
        Self {
            provider: Ok(provider),
        }
    }

    pub fn provider_kind(&self) -> Option<ProviderKind> {
        self.provider.as_ref().ok().map(|provider| provider.kind())
    }

    /// Summarise `details`; the result never exceeds the stored summary limit.
    pub async fn summarize(&self, details: &CustomerDetails) -> Result<String, SummaryError> {
        match &self.provider {
            Ok(provider) => Ok(clamp_summary(&provider.summarize(details).await)),
            Err(value) => Err(SummaryError::Configuration {
                value: value.clone(),
            }),
        }
    }
}

/// Natural-language prompt listing only the facts present on the profile.
pub fn build_prompt(details: &CustomerDetails) -> String {
    let mut parts = Vec::new();

    if !details.first_name.is_empty() && !details.last_name.is_empty() {
        parts.push(format!("{} {}", details.first_name, details.last_name));
    }
    if let Some(age) = details.stated_age() {
        parts.push(format!("age {age}"));
    }
    if let Some(nationality) = details.nationality_text() {
        parts.push(format!("from {nationality}"));
    }
    if let Some(gender) = details.gender_text() {
        parts.push(format!("gender: {gender}"));
    }
    if let Some(notes) = details.notes_text() {
        parts.push(format!("notes: {notes}"));
    }

    format!("{PROMPT_INSTRUCTION}: {}. Summary:", parts.join(", "))
}

/// Deterministic, network-free summary.
pub fn placeholder_summary(details: &CustomerDetails) -> String {
    let age = details
        .stated_age()
        .map(|age| format!(" age {age}"))
        .unwrap_or_default();
    let nationality = details
        .nationality_text()
        .map(|nationality| format!(" from {nationality}"))
        .unwrap_or_default();

    clamp_summary(&format!(
        "{}{age}{nationality} - {REGISTRATION_TAIL}",
        details.full_name()
    ))
}

/// Sentence stored by the registration flow when no provider could be consulted.
pub fn fallback_summary(details: &CustomerDetails) -> String {
    clamp_summary(&format!(
        "{} {} - {REGISTRATION_TAIL}",
        details.first_name, details.last_name
    ))
}

pub(crate) fn record_fallback(kind: ProviderKind) {
    counter!(SUMMARY_FALLBACK_TOTAL, "provider" => kind.as_str()).increment(1);
}
