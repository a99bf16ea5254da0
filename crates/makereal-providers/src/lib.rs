//! Vision model API.
//!
//! A provider implements [`LlmProvider`] to turn a chat request (system
//! prompt plus a user message carrying the board image) into a single
//! non-streamed [`ChatCompletion`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod extract;
pub mod openai;
pub mod prompt;

pub use extract::{MIN_CODE_LEN, extract_code};
pub use openai::OpenAiProvider;
pub use prompt::build_messages;

/// Credentials for authenticating with a model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Credentials {
    #[serde(rename = "api_key")]
    ApiKey { api_key: String },
}

impl Credentials {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey {
            api_key: key.into(),
        }
    }
}

/// A request to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<serde_json::Value>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

/// Body of a chat completion response.
///
/// Providers report API-level failures through `error` instead of failing the
/// call, so callers can show the provider's own message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ChatCompletion {
    /// Completion holding a single assistant message.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ChoiceMessage {
                    role: "assistant".into(),
                    content: Some(text.into()),
                },
                finish_reason: Some("stop".into()),
            }],
            error: None,
        }
    }

    /// Completion carrying an API error.
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            choices: Vec::new(),
            error: Some(ApiError {
                message: Some(message.into()),
                kind: None,
            }),
        }
    }

    /// Text of the first choice, empty when there is none.
    pub fn message(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or("")
    }
}

/// A chat completion model API.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g., "openai").
    fn id(&self) -> &str;

    /// Run a chat completion.
    ///
    /// `Err` means the provider could not be reached or answered with
    /// something that is not a completion at all.
    async fn complete(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<ChatCompletion>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_message() {
        let c: ChatCompletion = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"hi"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(c.message(), "hi");
        assert!(c.error.is_none());
    }

    #[test]
    fn test_error_payload() {
        let c: ChatCompletion = serde_json::from_str(
            r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#,
        )
        .unwrap();
        assert_eq!(c.message(), "");
        let err = c.error.unwrap();
        assert_eq!(err.message.as_deref(), Some("Incorrect API key provided"));
        assert_eq!(err.kind.as_deref(), Some("invalid_request_error"));
    }

    #[test]
    fn test_credentials_serde() {
        let json = serde_json::to_value(Credentials::api_key("sk-1")).unwrap();
        assert_eq!(json["type"], "api_key");
        assert_eq!(json["api_key"], "sk-1");
    }
}
