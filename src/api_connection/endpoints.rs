use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AvailableModel {
    pub model_name: &'static str,
    pub vision: bool,
}

pub const KNOWN_MODELS: &[AvailableModel] = &[
    AvailableModel {
        model_name: "gpt-4o",
        vision: true,
    },
    AvailableModel {
        model_name: "gpt-4o-mini",
        vision: true,
    },
    AvailableModel {
        model_name: "openai/gpt-4o",
        vision: true,
    },
    AvailableModel {
        model_name: "qwen/qwen3-32b",
        vision: false,
    },
];

/// OpenAI-compatible chat completion endpoints.
///
/// `api_key_env_var` holds the *name* of the environment variable carrying the
/// key; the key itself is only read when a request is sent.
#[derive(Clone, Debug)]
pub enum Provider {
    OpenAi {
        api_key_env_var: String,
        model: String,
        timeout: Duration,
    },
    OpenRouter {
        api_key_env_var: String,
        model: String,
        timeout: Duration,
    },
}

/// Output budget and sampling temperature for a single completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// User message carrying text plus an inline image as a `data:` URL.
    pub fn user_with_image(text: impl Into<String>, mime_type: &str, base64_data: &str) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{};base64,{}", mime_type, base64_data),
                    },
                },
            ]),
        }
    }

    /// Concatenated text parts, skipping images.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponseMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub index: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: Option<u32>,
    pub total_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    pub usage: Option<ChatCompletionUsage>,
}
