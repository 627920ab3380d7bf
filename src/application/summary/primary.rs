use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::domain::customer::{CustomerDetails, clamp_summary};

use super::{
    ProviderError, ProviderKind, SummaryProvider, build_prompt, placeholder_summary,
    record_fallback,
};

/// Credential value shipped in sample configuration files.
const SAMPLE_API_KEY: &str = "YOUR_HF_TOKEN";

/// Hosted text-generation endpoint authenticated with a bearer credential.
pub struct PrimaryProvider {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    max_length: u32,
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Serialize)]
struct GenerationParameters {
    max_length: u32,
    do_sample: bool,
}

#[derive(Deserialize)]
struct Generation {
    #[serde(default)]
    generated_text: Option<String>,
}

impl PrimaryProvider {
    pub fn new(client: Client, endpoint: Url, api_key: Option<String>, max_length: u32) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            max_length,
        }
    }

    fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty() && *key != SAMPLE_API_KEY)
    }

    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, ProviderError> {
        let body = GenerationRequest {
            inputs: prompt,
            parameters: GenerationParameters {
                max_length: self.max_length,
                do_sample: false,
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status));
        }

        let generations: Vec<Generation> = response.json().await?;
        generations
            .into_iter()
            .next()
            .and_then(|generation| generation.generated_text)
            .filter(|text| !text.is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

/// Drop the echoed prompt that hosted models prepend to their completion.
fn strip_prompt(text: &str, prompt: &str) -> String {
    match text.find(prompt) {
        Some(start) => text[start + prompt.len()..].trim().to_string(),
        None => text.to_string(),
    }
}

#[async_trait]
impl SummaryProvider for PrimaryProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Primary
    }

    async fn summarize(&self, details: &CustomerDetails) -> String {
        let Some(api_key) = self.credential() else {
            warn!(
                target = "application::summary::PrimaryProvider::summarize",
                "hosted summary credential is not configured; using placeholder"
            );
            record_fallback(self.kind());
            return placeholder_summary(details);
        };

        let prompt = build_prompt(details);
        match self.generate(api_key, &prompt).await {
            Ok(text) => {
                let summary = strip_prompt(&text, &prompt);
                if summary.is_empty() {
                    debug!(
                        target = "application::summary::PrimaryProvider::summarize",
                        "hosted model echoed the prompt only; using placeholder"
                    );
                    record_fallback(self.kind());
                    return placeholder_summary(details);
                }
                clamp_summary(&summary)
            }
            Err(err) => {
                warn!(
                    target = "application::summary::PrimaryProvider::summarize",
                    error = %err,
                    "hosted summary request failed; using placeholder"
                );
                record_fallback(self.kind());
                placeholder_summary(details)
            }
        }
    }
}
