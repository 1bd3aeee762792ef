//! Model client for AI inference using OpenAI-compatible API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::vlm::{
    OracleMessage, OracleRole, ReasoningOracle, VisionModel, VlmRequest, VlmResponse,
};
use crate::agent::{TurnOrigin, IMAGE_PLACEHOLDER};

/// Model client errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("Request cancelled")]
    Cancelled,
}

impl ModelError {
    /// Whether the service reported it is overloaded and the call may be retried.
    pub fn is_overloaded(&self) -> bool {
        match self {
            ModelError::ApiError { status, message } => {
                *status == StatusCode::SERVICE_UNAVAILABLE.as_u16()
                    || *status == 529
                    || message.to_lowercase().contains("overloaded")
            }
            _ => false,
        }
    }
}

/// Configuration for the AI model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub extra_body: HashMap<String, Value>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "EMPTY".to_string(),
            model_name: "ui-tars".to_string(),
            max_tokens: 1000,
            temperature: 0.0,
            top_p: 0.7,
            extra_body: HashMap::new(),
        }
    }
}

impl ModelConfig {
    /// Defaults for the reasoning oracle used to decompose goals.
    pub fn reasoning() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model_name: "gpt-4o".to_string(),
            temperature: 0.7,
            top_p: 1.0,
            ..Self::default()
        }
    }

    /// Create a new ModelConfig with custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create a new ModelConfig with custom API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Create a new ModelConfig with custom model name.
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// OpenAI API response structures.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible chat completion endpoints.
///
/// Serves both as the vision-language model and as the reasoning oracle.
pub struct ModelClient {
    config: ModelConfig,
    client: Client,
}

impl ModelClient {
    /// Create a new ModelClient with the given configuration.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Send a chat completion request and return the raw content.
    pub async fn request(&self, messages: &[Value]) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut body = json!({
            "messages": messages,
            "model": self.config.model_name,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
        });

        // Merge extra_body
        if let Value::Object(ref mut map) = body {
            for (key, value) in &self.config.extra_body {
                map.insert(key.clone(), value.clone());
            }
        }

        tracing::debug!(
            "Requesting {} with {} messages",
            self.config.model_name,
            messages.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!("Model API error {}: {}", status, message);
            return Err(ModelError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::ParseError("No content in response".to_string()))
    }
}

#[async_trait]
impl VisionModel for ModelClient {
    fn model_name(&self) -> String {
        self.config.model_name.clone()
    }

    async fn invoke(
        &self,
        request: VlmRequest,
        cancel: &CancellationToken,
    ) -> Result<VlmResponse, ModelError> {
        let messages = MessageBuilder::from_vlm_request(&request);
        tokio::select! {
            _ = cancel.cancelled() => Err(ModelError::Cancelled),
            content = self.request(&messages) => Ok(VlmResponse::from_prediction(content?)),
        }
    }
}

#[async_trait]
impl ReasoningOracle for ModelClient {
    async fn invoke(&self, messages: &[OracleMessage]) -> Result<String, ModelError> {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| match m.role {
                OracleRole::System => MessageBuilder::create_system_message(&m.content),
                OracleRole::User => MessageBuilder::create_user_message(&m.content, &[]),
                OracleRole::Assistant => MessageBuilder::create_assistant_message(&m.content),
            })
            .collect();
        self.request(&messages).await
    }
}

/// Helper for building conversation messages.
pub struct MessageBuilder;

impl MessageBuilder {
    /// Create a system message.
    pub fn create_system_message(content: &str) -> Value {
        json!({
            "role": "system",
            "content": content
        })
    }

    /// Create a user message with optional images.
    ///
    /// Images are base64-encoded PNG data. A message without images is
    /// sent as plain text content.
    pub fn create_user_message(text: &str, images_base64: &[&str]) -> Value {
        if images_base64.is_empty() {
            return json!({
                "role": "user",
                "content": text
            });
        }

        let mut content: Vec<Value> = images_base64
            .iter()
            .map(|img_data| {
                json!({
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:image/png;base64,{}", img_data)
                    }
                })
            })
            .collect();

        if !text.is_empty() && text != IMAGE_PLACEHOLDER {
            content.push(json!({
                "type": "text",
                "text": text
            }));
        }

        json!({
            "role": "user",
            "content": content
        })
    }

    /// Create an assistant message.
    pub fn create_assistant_message(content: &str) -> Value {
        json!({
            "role": "assistant",
            "content": content
        })
    }

    /// Convert a VLM request into chat messages, pairing every screenshot
    /// placeholder with the next image.
    pub fn from_vlm_request(request: &VlmRequest) -> Vec<Value> {
        let mut images = request.images.iter();
        request
            .conversations
            .iter()
            .map(|turn| match turn.from {
                TurnOrigin::Human if turn.value == IMAGE_PLACEHOLDER => match images.next() {
                    Some(img) => Self::create_user_message(&turn.value, &[img.as_str()]),
                    None => Self::create_user_message(&turn.value, &[]),
                },
                TurnOrigin::Human => Self::create_user_message(&turn.value, &[]),
                TurnOrigin::Gpt => Self::create_assistant_message(&turn.value),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VlmTurn;

    #[test]
    fn test_model_config_default() {
        let config = ModelConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000/v1");
        assert_eq!(config.model_name, "ui-tars");

        let reasoning = ModelConfig::reasoning();
        assert_eq!(reasoning.model_name, "gpt-4o");
        assert_eq!(reasoning.max_tokens, 1000);
    }

    #[test]
    fn test_overload_detection() {
        let overloaded = ModelError::ApiError {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert!(overloaded.is_overloaded());

        let bad_request = ModelError::ApiError {
            status: 400,
            message: "bad request".to_string(),
        };
        assert!(!bad_request.is_overloaded());
        assert!(!ModelError::ParseError("x".to_string()).is_overloaded());
    }

    #[test]
    fn test_message_builder() {
        let system_msg = MessageBuilder::create_system_message("You are an assistant");
        assert_eq!(system_msg["role"], "system");

        let user_msg = MessageBuilder::create_user_message("Hello", &[]);
        assert_eq!(user_msg["content"], "Hello");

        let user_msg_with_image =
            MessageBuilder::create_user_message("Look at this", &["base64data"]);
        assert_eq!(user_msg_with_image["content"][0]["type"], "image_url");
        assert_eq!(user_msg_with_image["content"][1]["text"], "Look at this");
    }

    #[test]
    fn test_vlm_request_pairs_images_with_placeholders() {
        let request = VlmRequest {
            conversations: vec![
                VlmTurn {
                    from: TurnOrigin::Human,
                    value: "prompt: open the browser".to_string(),
                },
                VlmTurn {
                    from: TurnOrigin::Human,
                    value: IMAGE_PLACEHOLDER.to_string(),
                },
                VlmTurn {
                    from: TurnOrigin::Gpt,
                    value: "Action: wait()".to_string(),
                },
                VlmTurn {
                    from: TurnOrigin::Human,
                    value: IMAGE_PLACEHOLDER.to_string(),
                },
            ],
            images: vec!["first".to_string(), "second".to_string()],
        };

        let messages = MessageBuilder::from_vlm_request(&request);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["content"], "prompt: open the browser");
        assert_eq!(
            messages[1]["content"][0]["image_url"]["url"],
            "data:image/png;base64,first"
        );
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(
            messages[3]["content"][0]["image_url"]["url"],
            "data:image/png;base64,second"
        );
    }
}
