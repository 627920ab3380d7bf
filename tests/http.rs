mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use tempfile::TempDir;
use tower::ServiceExt;

use kyc_dossier::application::customers::CustomerIntakeService;
use kyc_dossier::application::dossier::DossierRenderer;
use kyc_dossier::application::jobs::DossierQueue;
use kyc_dossier::application::repos::{CustomersRepo, JobsRepo};
use kyc_dossier::application::summary::{ProviderKind, SummaryProvider, SummaryService};
use kyc_dossier::domain::customer::CustomerDetails;
use kyc_dossier::infra::artifacts::ArtifactStorage;
use kyc_dossier::infra::http::{HealthProbe, HttpState, build_router};
use kyc_dossier_api_types::{CustomerResponse, EnqueueDossierResponse};

use support::{MemoryCustomersRepo, MemoryJobsRepo, ana, jobs_settings};

struct EchoProvider;

#[async_trait]
impl SummaryProvider for EchoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Alternate
    }

    async fn summarize(&self, details: &CustomerDetails) -> String {
        format!("{} is a returning customer.", details.full_name())
    }
}

#[derive(Default)]
struct ToggleProbe {
    down: AtomicBool,
}

#[async_trait]
impl HealthProbe for ToggleProbe {
    async fn check(&self) -> Result<(), sqlx::Error> {
        if self.down.load(Ordering::SeqCst) {
            Err(sqlx::Error::PoolTimedOut)
        } else {
            Ok(())
        }
    }
}

struct App {
    _dir: TempDir,
    router: Router,
    customers: Arc<MemoryCustomersRepo>,
    jobs: Arc<MemoryJobsRepo>,
    renderer: DossierRenderer,
    probe: Arc<ToggleProbe>,
}

fn app(queue_enabled: bool) -> App {
    let dir = TempDir::new().expect("temp dir");
    let artifacts =
        Arc::new(ArtifactStorage::new(dir.path().join("pdfs")).expect("artifact storage"));

    let customers = Arc::new(MemoryCustomersRepo::default());
    let jobs = Arc::new(MemoryJobsRepo::default());
    let customers_repo: Arc<dyn CustomersRepo> = customers.clone();
    let jobs_repo: Arc<dyn JobsRepo> = jobs.clone();

    let queue = DossierQueue::new(jobs_repo, &jobs_settings(queue_enabled, 3));
    let intake = Arc::new(CustomerIntakeService::new(
        customers_repo.clone(),
        SummaryService::with_provider(Arc::new(EchoProvider)),
        queue.clone(),
        Duration::from_secs(1),
    ));
    let renderer = DossierRenderer::new(artifacts.clone(), customers_repo);
    let probe = Arc::new(ToggleProbe::default());
    let health: Arc<dyn HealthProbe> = probe.clone();

    let router = build_router(HttpState {
        intake,
        queue,
        artifacts,
        health,
    });

    App {
        _dir: dir,
        router,
        customers,
        jobs,
        renderer,
        probe,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec();
    (status, headers, body)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn empty(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn create_customer_returns_created_profile() {
    let app = app(true);

    let (status, _, body) = send(
        &app.router,
        post_json(
            "/api/customers",
            serde_json::json!({
                "first_name": "Ana",
                "last_name": "Lee",
                "email": "ANA@example.com",
                "age": 30,
                "date_of_birth": "1994-03-07"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let customer: CustomerResponse = serde_json::from_slice(&body).expect("json body");
    assert_eq!(customer.email, "ana@example.com");
    assert_eq!(
        customer.summary.as_deref(),
        Some("Ana Lee is a returning customer.")
    );
    assert!(customer.artifact.is_none());
    assert_eq!(customer.age, Some(30));
    assert_eq!(
        customer.date_of_birth,
        Some(time::macros::date!(1994 - 03 - 07))
    );
    assert_eq!(app.jobs.all().await.len(), 1);
}

#[tokio::test]
async fn create_customer_rejects_invalid_details() {
    let app = app(true);

    let (status, _, body) = send(
        &app.router,
        post_json(
            "/api/customers",
            serde_json::json!({
                "first_name": "Ana",
                "last_name": "Lee",
                "email": "ana@example.com",
                "gender": "unknown"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(app.jobs.all().await.is_empty());
}

#[tokio::test]
async fn get_customer_by_id() {
    let app = app(false);
    let profile = app.customers.insert(ana(), Some("Known.")).await;

    let (status, _, body) = send(
        &app.router,
        empty("GET", &format!("/api/customers/{}", profile.id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let customer: CustomerResponse = serde_json::from_slice(&body).expect("json body");
    assert_eq!(customer.id, profile.id);
    assert_eq!(customer.age, Some(30));
    assert_eq!(customer.nationality.as_deref(), Some("Canada"));
    assert_eq!(customer.gender.as_deref(), Some("Female"));
    assert_eq!(customer.notes.as_deref(), Some("prefers email"));
    assert_eq!(customer.summary.as_deref(), Some("Known."));

    let (status, _, _) = send(
        &app.router,
        empty("GET", &format!("/api/customers/{}", uuid::Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app.router, empty("GET", "/api/customers/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn request_dossier_accepts_known_customers() {
    let app = app(true);
    let profile = app.customers.insert(ana(), None).await;

    let (status, _, body) = send(
        &app.router,
        empty("POST", &format!("/api/customers/{}/dossier", profile.id)),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let accepted: EnqueueDossierResponse = serde_json::from_slice(&body).expect("json body");
    let jobs = app.jobs.all().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, accepted.job_id);
}

#[tokio::test]
async fn request_dossier_rejects_unknown_and_malformed_ids() {
    let app = app(true);

    let (status, _, _) = send(
        &app.router,
        empty("POST", &format!("/api/customers/{}/dossier", uuid::Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app.router, empty("POST", "/api/customers/42/dossier")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.jobs.all().await.is_empty());
}

#[tokio::test]
async fn request_dossier_reports_disabled_queue() {
    let app = app(false);
    let profile = app.customers.insert(ana(), None).await;

    let (status, _, body) = send(
        &app.router,
        empty("POST", &format!("/api/customers/{}/dossier", profile.id)),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    insta::assert_snapshot!(
        String::from_utf8(body).expect("utf8"),
        @r#"{"error":{"code":"feature_disabled","message":"FeatureDisabled","hint":"dossier rendering queue is disabled"}}"#
    );
}

#[tokio::test]
async fn rendered_dossier_is_served_as_pdf() {
    let app = app(false);
    let mut profile = app.customers.insert(ana(), Some("Known.")).await;
    let artifact = app.renderer.render(&mut profile).await.expect("render");

    let (status, headers, body) = send(&app.router, empty("GET", &artifact.path)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        headers[header::CONTENT_LENGTH],
        body.len().to_string().as_str()
    );
    assert!(body.starts_with(b"%PDF"));

    let (status, _, _) = send(&app.router, empty("GET", "/pdfs/missing.pdf")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reflects_database_probe() {
    let app = app(false);

    let (status, _, _) = send(&app.router, empty("GET", "/healthz")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    app.probe.down.store(true, Ordering::SeqCst);
    let (status, _, _) = send(&app.router, empty("GET", "/healthz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
