//! Deterministic gateway for tests and dry runs.
//!
//! Replies come from a queue (consumed in call order) or, when the queue is
//! empty, from an optional responder closure that can route on the prompt text.
//! Every request is recorded so tests can assert call order and counts.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{GatewayError, ModelGateway};

/// One queued reply
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Successful raw text
    Text(String),
    /// Retryable transport failure
    Transient(String),
    /// Permanent failure (configuration-like)
    Permanent(String),
}

impl ScriptedReply {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }
}

/// A request as the gateway saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub system_instructions: String,
    pub user_content: String,
}

type Responder = Box<dyn Fn(&str, &str) -> Result<String, GatewayError> + Send + Sync>;

/// Scripted, recording gateway
#[derive(Default)]
pub struct ScriptedGateway {
    queue: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    responder: Option<Responder>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that answers from the given replies in order
    pub fn with_replies(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        let gateway = Self::new();
        gateway.push_all(replies);
        gateway
    }

    /// Gateway that answers every request through `responder`
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, GatewayError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(reply);
    }

    pub fn push_all(&self, replies: impl IntoIterator<Item = ScriptedReply>) {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        queue.extend(replies);
    }

    /// Requests received so far, in call order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn complete(
        &self,
        system_instructions: &str,
        user_content: &str,
    ) -> Result<String, GatewayError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedRequest {
                system_instructions: system_instructions.to_string(),
                user_content: user_content.to_string(),
            });

        let queued = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();

        match queued {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Transient(message)) => Err(GatewayError::transport(message)),
            Some(ScriptedReply::Permanent(message)) => Err(GatewayError::config(message)),
            None => match &self.responder {
                Some(responder) => responder(system_instructions, user_content),
                None => Err(GatewayError::config("scripted gateway has no reply left")),
            },
        }
    }
}
