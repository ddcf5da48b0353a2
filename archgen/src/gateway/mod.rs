//! Model gateway: send (system instructions, user content), get raw text back.
//!
//! The pipeline never sees a vendor wire format; everything model-facing goes
//! through [`ModelGateway::complete`].

pub mod http;
pub mod scripted;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpGateway;
pub use scripted::{RecordedRequest, ScriptedGateway, ScriptedReply};

/// Text-completion transport
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn complete(
        &self,
        system_instructions: &str,
        user_content: &str,
    ) -> Result<String, GatewayError>;
}

#[async_trait]
impl<T: ModelGateway + ?Sized> ModelGateway for Arc<T> {
    async fn complete(
        &self,
        system_instructions: &str,
        user_content: &str,
    ) -> Result<String, GatewayError> {
        (**self).complete(system_instructions, user_content).await
    }
}

/// Transport-level failures
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP/network error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the provider
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Request exceeded the configured timeout
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Response carried no text
    #[error("empty response from provider")]
    EmptyResponse,

    /// Transient failure reported by a non-HTTP transport
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration error (missing API key, bad URL, ...)
    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Whether the executor should try the call again
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => matches!(status, 408 | 429) || *status >= 500,
            Self::Timeout(_) => true,
            Self::EmptyResponse => true,
            Self::Transport(_) => true,
            Self::Config(_) => false,
        }
    }

    /// Short error code for logging
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_error",
            Self::Status { .. } => "status_error",
            Self::Timeout(_) => "timeout",
            Self::EmptyResponse => "empty_response",
            Self::Transport(_) => "transport_error",
            Self::Config(_) => "config_error",
        }
    }
}
