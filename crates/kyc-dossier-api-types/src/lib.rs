//! Request and response payloads shared by the dossier HTTP API and its clients.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

time::serde::format_description!(calendar_date, Date, "[year]-[month]-[day]");

/// Body accepted by `POST /api/customers`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, with = "calendar_date::option")]
    pub date_of_birth: Option<Date>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub yearly_income: Option<i64>,
    #[serde(default)]
    pub current_address: Option<String>,
    #[serde(default)]
    pub permanent_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Pointer to the most recent rendered dossier of a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactView {
    pub path: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

/// Full stored record, as returned by `POST /api/customers` and `GET /api/customers/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(with = "calendar_date::option")]
    pub date_of_birth: Option<Date>,
    pub nationality: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub yearly_income: Option<i64>,
    pub current_address: Option<String>,
    pub permanent_address: Option<String>,
    pub status: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub approved_at: Option<OffsetDateTime>,
    pub notes: Option<String>,
    pub summary: Option<String>,
    pub artifact: Option<ArtifactView>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Body returned by `POST /api/customers/{id}/dossier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueDossierResponse {
    pub job_id: String,
}
