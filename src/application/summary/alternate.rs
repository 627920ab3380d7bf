use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::{
    domain::customer::{CustomerDetails, clamp_summary},
    infra::error::InfraError,
};

use super::{
    ProviderError, ProviderKind, SummaryProvider, build_prompt, placeholder_summary,
    record_fallback,
};

/// Locally reachable generation server; no credential.
pub struct AlternateProvider {
    client: Client,
    endpoint: Url,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

impl AlternateProvider {
    pub fn new(
        client: Client,
        base_url: &Url,
        model: String,
        temperature: f32,
    ) -> Result<Self, InfraError> {
        let endpoint = generate_endpoint(base_url)?;
        Ok(Self {
            client,
            endpoint,
            model,
            temperature,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status));
        }

        let payload: GenerateResponse = response.json().await?;
        payload
            .response
            .filter(|text| !text.is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

fn generate_endpoint(base_url: &Url) -> Result<Url, InfraError> {
    let joined = format!("{}/api/generate", base_url.as_str().trim_end_matches('/'));
    Url::parse(&joined).map_err(|err| {
        InfraError::configuration(format!("invalid local summary endpoint `{joined}`: {err}"))
    })
}

#[async_trait]
impl SummaryProvider for AlternateProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Alternate
    }

    async fn summarize(&self, details: &CustomerDetails) -> String {
        let prompt = build_prompt(details);
        match self.generate(&prompt).await {
            Ok(text) => clamp_summary(&text),
            Err(err) => {
                warn!(
                    target = "application::summary::AlternateProvider::summarize",
                    endpoint = %self.endpoint,
                    error = %err,
                    "local summary request failed; using placeholder"
                );
                record_fallback(self.kind());
                placeholder_summary(details)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_generate_path_once() {
        let base = Url::parse("http://localhost:11434").expect("valid url");
        assert_eq!(
            generate_endpoint(&base).expect("endpoint").as_str(),
            "http://localhost:11434/api/generate"
        );

        let nested = Url::parse("http://gpu-box:8080/ollama/").expect("valid url");
        assert_eq!(
            generate_endpoint(&nested).expect("endpoint").as_str(),
            "http://gpu-box:8080/ollama/api/generate"
        );
    }
}
