//! Prompt-and-parse relay operations against the chat completion backend.
//!
//! Every operation builds a system prompt describing the exact JSON schema it
//! expects, sends one request, pulls the first balanced JSON value out of the
//! free-text reply and deserializes it into a typed response. Operations that
//! have a safe default (coaching tips, voice commands) substitute it on
//! failure; the others return a [`RelayError`].

pub mod coaching;
pub mod extract;
pub mod food_image;
pub mod food_search;
pub mod meal_plan;
pub mod progress;
pub mod voice;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api_connection::{ApiConnectionError, ChatBackend, ChatMessage, Sampling};
pub use extract::{extract_json, Bracket};

#[derive(Debug, Error)]
pub enum RelayError {
    /// Rejected before any upstream call was made.
    #[error("invalid input: {0}")]
    InputValidation(String),
    #[error("upstream call failed: {0}")]
    Upstream(#[from] ApiConnectionError),
    #[error("no JSON payload found in AI reply")]
    PayloadExtraction,
    #[error("AI reply payload could not be parsed: {0}")]
    PayloadParse(String),
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::PayloadParse(err.to_string())
    }
}

impl RelayError {
    pub fn is_input_validation(&self) -> bool {
        matches!(self, RelayError::InputValidation(_))
    }
}

/// A fully built request for one relay operation.
#[derive(Debug, Clone)]
pub struct RelayPrompt {
    pub operation: &'static str,
    pub messages: Vec<ChatMessage>,
    pub sampling: Sampling,
    pub bracket: Bracket,
}

/// Sends `prompt` and parses the embedded JSON payload as `T`.
///
/// One attempt, no retries. The returned error says which stage failed.
pub async fn relay<T: DeserializeOwned>(
    backend: &dyn ChatBackend,
    prompt: RelayPrompt,
) -> Result<T, RelayError> {
    let operation = prompt.operation;
    debug!(operation, stage = "awaiting_response", "sending relay request");
    let reply = backend.complete(prompt.messages, prompt.sampling).await?;

    debug!(operation, stage = "parsing", reply_len = reply.len(), "received AI reply");
    let payload = extract_json(&reply, prompt.bracket).ok_or_else(|| {
        warn!(operation, "AI reply had no JSON payload");
        RelayError::PayloadExtraction
    })?;

    serde_json::from_str(payload).map_err(|e| {
        warn!(operation, error = %e, "AI reply payload did not match schema");
        RelayError::from(e)
    })
}

pub(crate) fn require_finite(field: &str, value: f64) -> Result<(), RelayError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RelayError::PayloadParse(format!("{} is not a finite number", field)))
    }
}

pub(crate) fn require_text<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, RelayError> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(RelayError::InputValidation(format!("{} not provided", field))),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::api_connection::{ApiConnectionError, ChatBackend, ChatMessage, Sampling};

    /// Backend returning a canned reply and recording what it was sent.
    pub struct ScriptedBackend {
        reply: Option<String>,
        pub calls: Mutex<Vec<(Vec<ChatMessage>, Sampling)>>,
    }

    impl ScriptedBackend {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                reply: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn last_call(&self) -> (Vec<ChatMessage>, Sampling) {
            self.calls.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            sampling: Sampling,
        ) -> Result<String, ApiConnectionError> {
            self.calls.lock().unwrap().push((messages, sampling));
            self.reply.clone().ok_or(ApiConnectionError::EmptyResponse)
        }
    }
}
