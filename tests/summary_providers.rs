use std::num::NonZeroU32;
use std::time::Duration;

use httpmock::MockServer;
use url::Url;

use kyc_dossier::application::summary::{
    AlternateProvider, PrimaryProvider, ProviderKind, SummaryProvider, SummaryService,
    build_prompt, placeholder_summary,
};
use kyc_dossier::config::SummarySettings;
use kyc_dossier::domain::customer::{CustomerDetails, SUMMARY_MAX_CHARS};

fn ana() -> CustomerDetails {
    CustomerDetails {
        first_name: "Ana".into(),
        last_name: "Lee".into(),
        email: "ana@example.com".into(),
        age: Some(30),
        nationality: Some("Canada".into()),
        ..Default::default()
    }
}

fn primary(server: &MockServer, api_key: Option<&str>) -> PrimaryProvider {
    let endpoint = Url::parse(&server.url("/models/summarizer")).expect("mock url");
    PrimaryProvider::new(
        reqwest::Client::new(),
        endpoint,
        api_key.map(str::to_string),
        150,
    )
}

fn alternate(server: &MockServer) -> AlternateProvider {
    let base = Url::parse(&server.base_url()).expect("mock url");
    AlternateProvider::new(reqwest::Client::new(), &base, "llama2".into(), 0.7)
        .expect("alternate provider")
}

#[tokio::test]
async fn primary_strips_the_echoed_prompt() {
    let server = MockServer::start();
    let prompt = build_prompt(&ana());
    let generated = format!("{prompt} Ana Lee is a 30 year old customer from Canada.");
    let mock = server.mock(|when, then| {
        when.method("POST")
            .path("/models/summarizer")
            .header("authorization", "Bearer hf_live");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(serde_json::json!([{ "generated_text": generated }]));
    });

    let summary = primary(&server, Some("hf_live")).summarize(&ana()).await;

    mock.assert();
    assert_eq!(summary, "Ana Lee is a 30 year old customer from Canada.");
}

#[tokio::test]
async fn primary_error_status_yields_placeholder() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST").path("/models/summarizer");
        then.status(503).body("model loading");
    });

    let summary = primary(&server, Some("hf_live")).summarize(&ana()).await;

    mock.assert();
    assert_eq!(summary, placeholder_summary(&ana()));
}

#[tokio::test]
async fn primary_without_credential_never_calls_out() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST").path("/models/summarizer");
        then.status(200).json_body(serde_json::json!([]));
    });

    let summary = primary(&server, None).summarize(&ana()).await;
    let sample = primary(&server, Some("YOUR_HF_TOKEN")).summarize(&ana()).await;

    mock.assert_calls(0);
    assert_eq!(summary, placeholder_summary(&ana()));
    assert_eq!(sample, summary);
}

#[tokio::test]
async fn primary_empty_generation_yields_placeholder() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST").path("/models/summarizer");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(serde_json::json!([{ "generated_text": "" }]));
    });

    let summary = primary(&server, Some("hf_live")).summarize(&ana()).await;

    mock.assert();
    assert_eq!(summary, placeholder_summary(&ana()));
}

#[tokio::test]
async fn alternate_reads_the_response_field() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST")
            .path("/api/generate")
            .json_body_includes(r#"{"model":"llama2","stream":false}"#);
        then.status(200)
            .header("content-type", "application/json")
            .json_body(serde_json::json!({ "response": "Ana Lee, 30, Canadian national." }));
    });

    let summary = alternate(&server).summarize(&ana()).await;

    mock.assert();
    assert_eq!(summary, "Ana Lee, 30, Canadian national.");
}

#[tokio::test]
async fn alternate_unreachable_yields_placeholder() {
    let base = Url::parse("http://127.0.0.1:9").expect("url");
    let provider = AlternateProvider::new(
        reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .expect("client"),
        &base,
        "llama2".into(),
        0.7,
    )
    .expect("provider");

    assert_eq!(provider.kind(), ProviderKind::Alternate);
    assert_eq!(provider.summarize(&ana()).await, placeholder_summary(&ana()));
}

#[tokio::test]
async fn service_clamps_long_generations() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST").path("/api/generate");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(serde_json::json!({ "response": "x".repeat(1_000) }));
    });

    let settings = SummarySettings {
        provider: "alternate".into(),
        api_key: None,
        hosted_url: Url::parse("https://example.invalid/model").expect("url"),
        local_url: Url::parse(&server.base_url()).expect("url"),
        local_model: "llama2".into(),
        temperature: 0.7,
        max_length: NonZeroU32::new(150).expect("non-zero"),
        timeout: Duration::from_secs(5),
    };
    let service = SummaryService::from_settings(&settings).expect("service");
    assert_eq!(service.provider_kind(), Some(ProviderKind::Alternate));

    let summary = service.summarize(&ana()).await.expect("summary");

    mock.assert();
    assert_eq!(summary.chars().count(), SUMMARY_MAX_CHARS);
}
