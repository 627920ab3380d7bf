//! Content of a dossier, independent of the output format.

use std::fmt::Write as _;

use time::{
    OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description,
};

use crate::domain::customer::CustomerProfile;

pub const TITLE: &str = "KYC Customer Dossier";
pub const FIELDS_HEADING: &str = "Personal Information";
pub const SUMMARY_HEADING: &str = "AI Summary";
pub const NOTES_HEADING: &str = "Notes";
pub const NOT_AVAILABLE: &str = "N/A";
pub const SUMMARY_UNAVAILABLE: &str = "Summary not available.";
const DEFAULT_STATUS: &str = "pending";

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DATE_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DossierField {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DossierSection {
    pub heading: &'static str,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DossierLayout {
    pub title: &'static str,
    pub meta: Vec<String>,
    pub fields_heading: &'static str,
    pub fields: Vec<DossierField>,
    pub sections: Vec<DossierSection>,
}

impl DossierLayout {
    pub fn build(profile: &CustomerProfile, generated_at: OffsetDateTime) -> Self {
        let details = &profile.details;

        let name = details.full_name();
        let status = details
            .status
            .as_deref()
            .map(str::trim)
            .filter(|status| !status.is_empty())
            .unwrap_or(DEFAULT_STATUS)
            .to_uppercase();

        let fields = vec![
            field("Name", Some(name)),
            field("Email", Some(details.email.clone())),
            field("Phone", details.phone.clone()),
            field(
                "Date of Birth",
                details
                    .date_of_birth
                    .map(|date| date.format(DATE_FORMAT).unwrap_or_else(|_| date.to_string())),
            ),
            field(
                "Age / Gender",
                Some(format!(
                    "{} / {}",
                    details
                        .age
                        .map(|age| age.to_string())
                        .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                    details.gender_text().unwrap_or(NOT_AVAILABLE)
                )),
            ),
            field("Nationality", details.nationality.clone()),
            field(
                "Yearly Income",
                details.declared_income().map(|income| format!("${income}")),
            ),
            field("Current Address", details.current_address.clone()),
            field("Permanent Address", details.permanent_address.clone()),
            field("Status", Some(status)),
            field("Approved At", details.approved_at.map(format_timestamp)),
        ];

        let mut sections = vec![DossierSection {
            heading: SUMMARY_HEADING,
            body: profile
                .summary
                .as_deref()
                .filter(|summary| !summary.trim().is_empty())
                .unwrap_or(SUMMARY_UNAVAILABLE)
                .to_string(),
        }];
        if let Some(notes) = details.notes_text() {
            sections.push(DossierSection {
                heading: NOTES_HEADING,
                body: notes.to_string(),
            });
        }

        Self {
            title: TITLE,
            meta: vec![
                format!("Generated: {}", format_timestamp(generated_at)),
                format!("Customer ID: {}", profile.id),
            ],
            fields_heading: FIELDS_HEADING,
            fields,
            sections,
        }
    }

    pub fn section(&self, heading: &str) -> Option<&DossierSection> {
        self.sections
            .iter()
            .find(|section| section.heading == heading)
    }

    /// Plain-text rendition, one layout element per line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.title);
        for line in &self.meta {
            let _ = writeln!(out, "{line}");
        }
        let _ = writeln!(out, "{}", self.fields_heading);
        for field in &self.fields {
            let _ = writeln!(out, "{}: {}", field.label, field.value);
        }
        for section in &self.sections {
            let _ = writeln!(out, "{}", section.heading);
            let _ = writeln!(out, "{}", section.body);
        }
        out
    }
}

fn field(label: &'static str, value: Option<String>) -> DossierField {
    let value = value
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    DossierField { label, value }
}

fn format_timestamp(at: OffsetDateTime) -> String {
    let utc = at.to_offset(UtcOffset::UTC);
    utc.format(DATE_TIME_FORMAT)
        .unwrap_or_else(|_| utc.to_string())
}
