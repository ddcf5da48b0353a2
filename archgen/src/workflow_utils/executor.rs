//! Resilient call executor: gateway + extractor + shape validation + retry.
//!
//! Transport failures are retried with exponential backoff up to
//! [`RetryPolicy::max_attempts`] total attempts. Extraction and shape failures
//! are returned immediately as [`PipelineError::MalformedOutput`].

use std::sync::Arc;
use std::time::Duration;

use archgen_sdk::log_call_retry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;
use crate::gateway::ModelGateway;
use crate::workflow_utils::extract::{extract_json, ExtractError};

/// Retry/backoff policy shared by every model-facing call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, first call included
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt with 0-based index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.pow(attempt.min(5));
        Duration::from_millis(self.base_delay_ms.saturating_mul(multiplier))
    }
}

/// Declared shape of a structured response: a name for error reports plus the
/// fields that must be present. Nested fields use dotted paths (`rootFolder.name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseShape {
    pub name: String,
    pub required: Vec<String>,
}

impl ResponseShape {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: Vec::new(),
        }
    }

    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    /// First required field that is absent or null
    pub fn missing_field(&self, value: &Value) -> Option<&str> {
        self.required
            .iter()
            .find(|path| {
                let mut current = value;
                for segment in path.split('.') {
                    match current.get(segment) {
                        Some(next) if !next.is_null() => current = next,
                        _ => return true,
                    }
                }
                false
            })
            .map(String::as_str)
    }
}

/// A successful call plus how many retries it took
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome<T> {
    pub value: T,
    pub retries: u32,
}

impl<T> CallOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        CallOutcome {
            value: f(self.value),
            retries: self.retries,
        }
    }
}

/// Every model-facing call in the pipeline goes through this type
#[derive(Clone)]
pub struct ResilientExecutor {
    gateway: Arc<dyn ModelGateway>,
    policy: RetryPolicy,
}

impl ResilientExecutor {
    pub fn new(gateway: Arc<dyn ModelGateway>, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Raw text with transport retries, no extraction
    pub async fn complete_text(
        &self,
        call: &str,
        instructions: &str,
        content: &str,
    ) -> Result<CallOutcome<String>, PipelineError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            match self.gateway.complete(instructions, content).await {
                Ok(text) => {
                    return Ok(CallOutcome {
                        value: text,
                        retries: attempt,
                    })
                }
                Err(err) => {
                    let attempts = attempt + 1;
                    if !err.is_retryable() || attempts >= max_attempts {
                        tracing::warn!(
                            call,
                            attempts,
                            code = err.code(),
                            error = %err,
                            "model call failed"
                        );
                        return Err(PipelineError::ModelCall {
                            call: call.to_string(),
                            attempts,
                            source: err,
                        });
                    }

                    let delay = self.policy.delay_for(attempt);
                    log_call_retry!(call, attempts, delay.as_millis() as u64, err);
                    tracing::debug!(call, attempts, ?delay, "retrying model call");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Structured call: text, then extraction, then required-field check
    pub async fn execute(
        &self,
        call: &str,
        instructions: &str,
        content: &str,
        shape: &ResponseShape,
    ) -> Result<CallOutcome<Value>, PipelineError> {
        let outcome = self.complete_text(call, instructions, content).await?;
        let raw = &outcome.value;

        let value = extract_json(raw).map_err(|e| match e {
            ExtractError::NoPayloadFound => PipelineError::malformed(
                call,
                None,
                format!("no {} payload in response", shape.name),
                raw,
            ),
            ExtractError::InvalidJson(msg) => PipelineError::malformed(call, None, msg, raw),
        })?;

        if let Some(field) = shape.missing_field(&value) {
            return Err(PipelineError::malformed(
                call,
                Some(field),
                format!("{} is missing required field", shape.name),
                raw,
            ));
        }

        Ok(CallOutcome {
            value,
            retries: outcome.retries,
        })
    }

    /// Structured call deserialized into `T`
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        call: &str,
        instructions: &str,
        content: &str,
        shape: &ResponseShape,
    ) -> Result<CallOutcome<T>, PipelineError> {
        let outcome = self.execute(call, instructions, content, shape).await?;
        let retries = outcome.retries;
        let raw = outcome.value.to_string();

        let value = serde_json::from_value::<T>(outcome.value).map_err(|e| {
            PipelineError::malformed(call, None, format!("{}: {}", shape.name, e), &raw)
        })?;

        Ok(CallOutcome { value, retries })
    }
}
