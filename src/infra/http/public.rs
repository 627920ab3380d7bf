use std::io::ErrorKind;

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use tracing::error;

use crate::application::error::HttpError;
use crate::domain::customer::ARTIFACT_PUBLIC_PREFIX;
use crate::infra::artifacts::ArtifactStorageError;

use super::{HttpState, db_health_response};

pub fn build_public_router() -> Router<HttpState> {
    Router::new()
        .route("/healthz", get(health))
        .route(&format!("{ARTIFACT_PUBLIC_PREFIX}/{{file}}"), get(serve_dossier))
}

async fn health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.check().await)
}

async fn serve_dossier(State(state): State<HttpState>, Path(file): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_dossier";

    match state.artifacts.read(&file).await {
        Ok(bytes) => build_pdf_response(&file, bytes),
        Err(ArtifactStorageError::InvalidPath) => not_found(SOURCE),
        Err(ArtifactStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            not_found(SOURCE)
        }
        Err(err) => {
            error!(
                target = SOURCE,
                file = %file,
                error = %err,
                "failed to read stored dossier"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read dossier",
                err.to_string(),
            )
            .into_response()
        }
    }
}

fn not_found(source: &'static str) -> Response {
    HttpError::new(
        source,
        StatusCode::NOT_FOUND,
        "Dossier not found",
        "The requested dossier is not available",
    )
    .into_response()
}

fn build_pdf_response(file: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(file).first_or(mime_guess::mime::APPLICATION_PDF);
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    // Names embed the render time, so a stored file never changes.
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
