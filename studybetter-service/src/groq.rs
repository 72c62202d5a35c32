use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GroqConfig;
use crate::error::{GroqError, ServiceError, ServiceResult};

/// Groq chat-completions API client
pub struct GroqClient {
    client: Client,
    config: GroqConfig,
}

impl GroqClient {
    /// Create a new Groq client
    pub fn new(config: GroqConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::Internal {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    /// Whether a usable API key is present. Callers fall back to
    /// content-based generation when this is false.
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// One non-streaming chat completion. Returns the assistant message
    /// content with surrounding whitespace trimmed.
    pub async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GroqError> {
        let Some(api_key) = self.config.api_key.as_deref().filter(|_| self.is_configured())
        else {
            return Err(GroqError::NotConfigured);
        };

        let request = GroqChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature,
            max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GroqError::Connection {
                url: self.config.api_url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GroqError::Generation { status, message });
        }

        let chat_response: GroqChatResponse =
            response
                .json()
                .await
                .map_err(|e| GroqError::InvalidResponse {
                    source: serde_json::Error::io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    )),
                })?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

// Internal Groq API types

#[derive(Debug, Serialize)]
struct GroqChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GroqChatResponse {
    #[serde(default)]
    choices: Vec<GroqChoice>,
}

#[derive(Debug, Deserialize)]
struct GroqChoice {
    message: GroqResponseMessage,
}

#[derive(Debug, Deserialize)]
struct GroqResponseMessage {
    #[serde(default)]
    content: String,
}
