//! HTTP gateway for OpenAI-compatible chat completion endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{GatewayError, ModelGateway};
use crate::config::GatewaySettings;

/// Maximum accepted response body (4MB)
const MAX_RESPONSE_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions gateway over reqwest
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl HttpGateway {
    /// Build from settings; the API key is read from the env var the settings name
    pub fn from_settings(settings: &GatewaySettings) -> Result<Self, GatewayError> {
        let api_key = std::env::var(&settings.api_key_env).map_err(|_| {
            GatewayError::config(format!("{} not set", settings.api_key_env))
        })?;
        Self::new(settings, &api_key)
    }

    pub fn new(settings: &GatewaySettings, api_key: &str) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| GatewayError::config("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        let timeout = Duration::from_secs(settings.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            timeout,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ModelGateway for HttpGateway {
    async fn complete(
        &self,
        system_instructions: &str,
        user_content: &str,
    ) -> Result<String, GatewayError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_instructions,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        tracing::debug!(
            model = %self.model,
            prompt_chars = user_content.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            let body: String = text.chars().take(500).collect();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if text.len() > MAX_RESPONSE_LEN {
            return Err(GatewayError::transport(format!(
                "response too large: {} bytes",
                text.len()
            )));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::transport(format!("unreadable response body: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(GatewayError::EmptyResponse)
    }
}

impl HttpGateway {
    fn classify(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::Http(err)
        }
    }
}
