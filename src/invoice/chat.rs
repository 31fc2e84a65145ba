//! Chat-completions client used to draft invoice HTML.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CorpdeskError, Result};
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`.
    pub api_url: String,
    /// Generation is disabled without a key.
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
        }
    }
}

impl InferenceConfig {
    /// Reads `INFERENCE_API_URL`, `INFERENCE_API_KEY`, `INFERENCE_MODEL`
    /// and `INFERENCE_TIMEOUT_SECONDS`.
    pub fn from_env() -> Self {
        let mut config = Self {
            api_key: get_env_with_prefix("INFERENCE_API_KEY").map(SecretString::from),
            ..Self::default()
        };
        if let Some(url) = get_env_with_prefix("INFERENCE_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get_env_with_prefix("INFERENCE_MODEL") {
            config.model = model;
        }
        if let Some(timeout) = parse_env_with_prefix("INFERENCE_TIMEOUT_SECONDS") {
            config.timeout_secs = timeout;
        }
        config
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Content of the first choice.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    fn model(&self) -> &str;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiChat {
    client: reqwest::Client,
    url: String,
    api_key: SecretString,
    model: String,
}

impl OpenAiChat {
    /// `None` when no API key is configured.
    pub fn from_config(config: &InferenceConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CorpdeskError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Some(Self {
            client,
            url: format!("{}/chat/completions", config.api_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
        }))
    }
}

#[async_trait]
impl ChatClient for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: 0.2,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(CorpdeskError::service_unavailable(format!(
                "Inference API returned {}: {}",
                status, snippet
            )));
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CorpdeskError::service_unavailable("Inference API returned no content"))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAiChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChat")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish()
    }
}
