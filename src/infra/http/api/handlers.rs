use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use kyc_dossier_api_types::{
    ArtifactView, CreateCustomerRequest, CustomerResponse, EnqueueDossierResponse,
};
use tracing::info;

use crate::domain::customer::{CustomerDetails, CustomerProfile, parse_customer_id};

use super::error::ApiError;
use crate::infra::http::HttpState;

pub async fn create_customer(
    State(state): State<HttpState>,
    Json(payload): Json<CreateCustomerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let registered = state.intake.register(details_from_request(payload)).await?;

    info!(
        target = "infra::http::api::create_customer",
        customer_id = %registered.profile.id,
        render_job = registered.render_job.as_deref().unwrap_or("none"),
        "customer created"
    );

    Ok((
        StatusCode::CREATED,
        Json(customer_response(registered.profile)),
    ))
}

pub async fn get_customer(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_customer_id(&id)
        .map_err(|err| ApiError::bad_request("Invalid customer id", Some(err.to_string())))?;

    let profile = state
        .intake
        .find(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Customer not found"))?;

    Ok(Json(customer_response(profile)))
}

pub async fn enqueue_dossier(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_customer_id(&id)
        .map_err(|err| ApiError::bad_request("Invalid customer id", Some(err.to_string())))?;

    if !state.queue.is_enabled() {
        return Err(ApiError::feature_disabled());
    }

    if state.intake.find(id).await?.is_none() {
        return Err(ApiError::not_found("Customer not found"));
    }

    let job_id = state.queue.enqueue(&id.to_string()).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueDossierResponse { job_id }),
    ))
}

fn details_from_request(request: CreateCustomerRequest) -> CustomerDetails {
    CustomerDetails {
        first_name: request.first_name.trim().to_string(),
        last_name: request.last_name.trim().to_string(),
        email: request.email,
        phone: request.phone,
        date_of_birth: request.date_of_birth,
        nationality: request.nationality,
        gender: request.gender,
        age: request.age,
        yearly_income: request.yearly_income,
        current_address: request.current_address,
        permanent_address: request.permanent_address,
        status: None,
        approved_at: None,
        notes: request.notes,
    }
}

fn customer_response(profile: CustomerProfile) -> CustomerResponse {
    let details = profile.details;
    CustomerResponse {
        id: profile.id,
        first_name: details.first_name,
        last_name: details.last_name,
        email: details.email,
        phone: details.phone,
        date_of_birth: details.date_of_birth,
        nationality: details.nationality,
        gender: details.gender,
        age: details.age,
        yearly_income: details.yearly_income,
        current_address: details.current_address,
        permanent_address: details.permanent_address,
        status: details.status,
        approved_at: details.approved_at,
        notes: details.notes,
        summary: profile.summary,
        artifact: profile.artifact.map(|artifact| ArtifactView {
            path: artifact.path,
            generated_at: artifact.generated_at,
        }),
        created_at: profile.created_at,
        updated_at: profile.updated_at,
    }
}
