//! JSON API for customer intake and dossier requests.

pub mod error;
pub mod handlers;

use axum::{
    Router,
    routing::{get, post},
};

use super::HttpState;

pub fn build_api_router() -> Router<HttpState> {
    Router::new()
        .route("/api/customers", post(handlers::create_customer))
        .route("/api/customers/{id}", get(handlers::get_customer))
        .route(
            "/api/customers/{id}/dossier",
            post(handlers::enqueue_dossier),
        )
}
