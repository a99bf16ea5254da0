//! OpenAI Chat Completions API provider.
//!
//! Sends a single non-streamed request to `/v1/chat/completions`. Also works
//! against OpenAI-compatible endpoints through a custom base URL.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{ChatCompletion, CompletionRequest, Credentials, LlmProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiProvider {
    pub base_url: String,
    provider_id: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn openai(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            provider_id: "openai".into(),
            client: reqwest::Client::new(),
        }
    }

    /// Use a different identifier, e.g. for an OpenAI-compatible gateway.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.provider_id = id.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [serde_json::Value],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<ChatCompletion> {
        let Credentials::ApiKey { api_key } = credentials;

        let body = OpenAiRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(model = %request.model, base_url = %self.base_url, "Calling OpenAI-compatible API");

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<ChatCompletion>(&text) {
            Ok(completion) if completion.error.is_some() => {
                warn!(%status, "OpenAI API returned an error payload");
                Ok(completion)
            }
            _ if !status.is_success() => anyhow::bail!("OpenAI API error {status}: {text}"),
            Ok(completion) => Ok(completion),
            Err(e) => Err(anyhow::anyhow!("Invalid OpenAI response: {e}")),
        }
    }
}
