//! Customer profile as seen by the dossier pipeline.

use serde::Serialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::error::DomainError;

/// Upper bound, in characters, for any stored summary.
pub const SUMMARY_MAX_CHARS: usize = 300;

/// Public URL prefix under which rendered dossiers are exposed.
pub const ARTIFACT_PUBLIC_PREFIX: &str = "/pdfs";

/// Descriptive attributes captured at registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomerDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<Date>,
    pub nationality: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub yearly_income: Option<i64>,
    pub current_address: Option<String>,
    pub permanent_address: Option<String>,
    pub status: Option<String>,
    pub approved_at: Option<OffsetDateTime>,
    pub notes: Option<String>,
}

impl CustomerDetails {
    /// `"{first} {last}"` trimmed; empty when both parts are empty.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Notes only when they carry text.
    pub fn notes_text(&self) -> Option<&str> {
        non_empty(self.notes.as_deref())
    }

    pub fn nationality_text(&self) -> Option<&str> {
        non_empty(self.nationality.as_deref())
    }

    pub fn gender_text(&self) -> Option<&str> {
        non_empty(self.gender.as_deref())
    }

    /// Age worth mentioning in prose; zero counts as unknown.
    pub fn stated_age(&self) -> Option<i32> {
        self.age.filter(|age| *age != 0)
    }

    /// Zero income is treated as not declared.
    pub fn declared_income(&self) -> Option<i64> {
        self.yearly_income.filter(|income| *income != 0)
    }
}

/// Location of the latest rendered dossier.
///
/// Path and timestamp travel together so a profile can never carry one without the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DossierArtifact {
    pub path: String,
    pub generated_at: OffsetDateTime,
}

impl DossierArtifact {
    pub fn for_file(file_name: &str, generated_at: OffsetDateTime) -> Self {
        Self {
            path: format!("{ARTIFACT_PUBLIC_PREFIX}/{file_name}"),
            generated_at,
        }
    }

    /// File name relative to the artifact storage root.
    pub fn file_name(&self) -> &str {
        self.path
            .strip_prefix(ARTIFACT_PUBLIC_PREFIX)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerProfile {
    pub id: Uuid,
    pub details: CustomerDetails,
    pub summary: Option<String>,
    pub artifact: Option<DossierArtifact>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Parse a job or request supplied customer identifier.
pub fn parse_customer_id(raw: &str) -> Result<Uuid, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("customer id must not be empty"));
    }
    Uuid::parse_str(trimmed)
        .map_err(|err| DomainError::validation(format!("invalid customer id `{trimmed}`: {err}")))
}

/// Truncate text to [`SUMMARY_MAX_CHARS`] characters without splitting a code point.
pub fn clamp_summary(text: &str) -> String {
    match text.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}
