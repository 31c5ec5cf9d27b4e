//! Backend descriptors
//!
//! A [`BackendConfig`] names an endpoint and knows how to turn a prompt into
//! the request body that endpoint expects. Two shapes exist: chat-style
//! (a `messages` array) and completion-style (a flat `prompt`).

use serde::Serialize;
use std::time::Duration;

/// Stop sequence sent to both backends.
pub const STOP_SEQUENCE: &str = "{STOP}";

/// Which slot a backend occupies in the fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendRole {
    Primary,
    Secondary,
}

impl BackendRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendRole::Primary => "primary",
            BackendRole::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for BackendRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// `{"messages": [{"role": "user", "content": prompt}], ...}`
    Chat,
    /// `{"prompt": prompt, ...}`
    Completion,
}

/// Configuration for one completion backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub role: BackendRole,
    pub endpoint: String,
    pub shape: PayloadShape,
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub stop: String,
    pub timeout: Option<Duration>,
}

impl BackendConfig {
    /// Chat-style primary backend (OpenAI chat completions).
    pub fn openai_chat() -> Self {
        Self {
            role: BackendRole::Primary,
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
            shape: PayloadShape::Chat,
            model: Some("gpt-3.5-turbo".into()),
            max_tokens: 1000,
            temperature: 0.8,
            stop: STOP_SEQUENCE.into(),
            timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Completion-style secondary backend (OpenAI legacy completions).
    pub fn openai_completion() -> Self {
        Self {
            role: BackendRole::Secondary,
            endpoint: "https://api.openai.com/v1/completions".into(),
            shape: PayloadShape::Completion,
            model: Some("gpt-3.5-turbo-instruct".into()),
            max_tokens: 1000,
            temperature: 0.8,
            stop: STOP_SEQUENCE.into(),
            timeout: Some(Duration::from_secs(120)),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn without_model(mut self) -> Self {
        self.model = None;
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the JSON body for `prompt` in this backend's payload shape.
    pub fn build_request_body(&self, prompt: &str) -> serde_json::Value {
        let body = match self.shape {
            PayloadShape::Chat => serde_json::to_value(ChatRequest {
                model: self.model.as_deref(),
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                stop: &self.stop,
                stream: true,
            }),
            PayloadShape::Completion => serde_json::to_value(CompletionRequest {
                model: self.model.as_deref(),
                prompt,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                stop: &self.stop,
                stream: true,
            }),
        };
        // Plain structs of strings and numbers always serialize.
        body.unwrap_or_default()
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
    stop: &'a str,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
    max_tokens: usize,
    temperature: f32,
    stop: &'a str,
    stream: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_body_shape() {
        let body = BackendConfig::openai_chat().build_request_body("add two numbers");
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "add two numbers");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["stop"], "{STOP}");
        assert_eq!(body["stream"], true);
        assert!(body.get("prompt").is_none());
    }

    #[test]
    fn test_completion_body_shape() {
        let body = BackendConfig::openai_completion()
            .without_model()
            .build_request_body("add two numbers");
        assert_eq!(body["prompt"], "add two numbers");
        assert_eq!(body["stop"], "{STOP}");
        assert_eq!(body["stream"], true);
        assert!(body.get("messages").is_none());
        assert!(body.get("model").is_none());
    }

    #[test]
    fn test_builders() {
        let config = BackendConfig::openai_chat()
            .with_endpoint("http://localhost:8080/v1/chat/completions")
            .with_model("local-model")
            .with_max_tokens(256)
            .with_temperature(0.2)
            .with_timeout(Duration::from_millis(500));

        assert_eq!(config.role, BackendRole::Primary);
        assert_eq!(config.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(config.timeout, Some(Duration::from_millis(500)));
        let body = config.build_request_body("x");
        assert_eq!(body["model"], "local-model");
        assert_eq!(body["max_tokens"], 256);
    }
}
