use async_trait::async_trait;
use dotenv::dotenv;
use reqwest::Client;
use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use super::endpoints::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Provider, Sampling, KNOWN_MODELS,
    OPENAI_CHAT_URL, OPENROUTER_CHAT_URL,
};

#[derive(Debug, Error)]
pub enum ApiConnectionError {
    #[error("API key not found in environment: {0}")]
    MissingApiKey(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("API error {status}: {error_body}")]
    ApiError {
        status: reqwest::StatusCode,
        error_body: String,
    },
    #[error("API returned no completion text")]
    EmptyResponse,
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
}

/// Anything that can turn an ordered message list into completion text.
///
/// `Provider` is the production implementation; tests substitute scripted
/// backends so relay mechanics run without network access.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        sampling: Sampling,
    ) -> Result<String, ApiConnectionError>;

    fn supports_vision(&self) -> bool {
        true
    }
}

impl Provider {
    pub fn openai(api_key_env_var_name: &str, model: &str, timeout: Duration) -> Self {
        Self::OpenAi {
            api_key_env_var: api_key_env_var_name.to_string(),
            model: model.to_string(),
            timeout,
        }
    }

    pub fn openrouter(api_key_env_var_name: &str, model: &str, timeout: Duration) -> Self {
        Self::OpenRouter {
            api_key_env_var: api_key_env_var_name.to_string(),
            model: model.to_string(),
            timeout,
        }
    }

    pub fn from_name(
        name: &str,
        api_key_env_var_name: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ApiConnectionError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::openai(api_key_env_var_name, model, timeout)),
            "openrouter" => Ok(Self::openrouter(api_key_env_var_name, model, timeout)),
            other => Err(ApiConnectionError::UnsupportedProvider(other.to_string())),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAi { model, .. } | Provider::OpenRouter { model, .. } => model,
        }
    }

    pub fn url(&self) -> &'static str {
        match self {
            Provider::OpenAi { .. } => OPENAI_CHAT_URL,
            Provider::OpenRouter { .. } => OPENROUTER_CHAT_URL,
        }
    }

    fn api_key_env_var(&self) -> &str {
        match self {
            Provider::OpenAi {
                api_key_env_var, ..
            }
            | Provider::OpenRouter {
                api_key_env_var, ..
            } => api_key_env_var,
        }
    }

    fn timeout(&self) -> Duration {
        match self {
            Provider::OpenAi { timeout, .. } | Provider::OpenRouter { timeout, .. } => *timeout,
        }
    }

    pub async fn call_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ApiConnectionError> {
        dotenv().ok();
        let api_key_env_var_name = self.api_key_env_var();
        let actual_api_key = env::var(api_key_env_var_name)
            .map_err(|_| ApiConnectionError::MissingApiKey(api_key_env_var_name.to_string()))?;

        let client = Client::builder().timeout(self.timeout()).build()?;

        let mut builder = client
            .post(self.url())
            .bearer_auth(actual_api_key)
            .header("Content-Type", "application/json");

        if let Provider::OpenRouter { .. } = self {
            let site_url =
                env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
            let app_name = env::var("APP_NAME").unwrap_or_else(|_| "FitVida".to_string());
            builder = builder
                .header("HTTP-Referer", site_url)
                .header("X-Title", app_name);
        }

        let response = builder.json(&request).send().await?;

        if response.status().is_success() {
            let chat_response = response.json::<ChatCompletionResponse>().await?;
            Ok(chat_response)
        } else {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            Err(ApiConnectionError::ApiError { status, error_body })
        }
    }
}

#[async_trait]
impl ChatBackend for Provider {
    #[instrument(skip_all, fields(model = %self.model()))]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        sampling: Sampling,
    ) -> Result<String, ApiConnectionError> {
        let request = ChatCompletionRequest {
            model: self.model().to_string(),
            messages,
            temperature: Some(sampling.temperature),
            max_tokens: Some(sampling.max_tokens),
        };

        let response = self.call_chat_completion(request).await?;
        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                total_tokens = usage.total_tokens,
                "completion usage"
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ApiConnectionError::EmptyResponse)
    }

    fn supports_vision(&self) -> bool {
        KNOWN_MODELS
            .iter()
            .find(|m| m.model_name == self.model())
            .map(|m| m.vision)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_name() {
        let timeout = Duration::from_secs(5);
        let provider = Provider::from_name("OpenRouter", "KEY", "openai/gpt-4o", timeout).unwrap();
        assert_eq!(provider.url(), OPENROUTER_CHAT_URL);
        assert_eq!(provider.model(), "openai/gpt-4o");

        let err = Provider::from_name("bedrock", "KEY", "m", timeout).unwrap_err();
        assert!(matches!(err, ApiConnectionError::UnsupportedProvider(name) if name == "bedrock"));
    }

    #[test]
    fn test_vision_support_lookup() {
        let timeout = Duration::from_secs(5);
        assert!(Provider::openai("KEY", "gpt-4o", timeout).supports_vision());
        assert!(!Provider::openrouter("KEY", "qwen/qwen3-32b", timeout).supports_vision());
        // unknown models are assumed capable
        assert!(Provider::openai("KEY", "my-local-model", timeout).supports_vision());
    }
}
