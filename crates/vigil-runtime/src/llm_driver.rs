//! [`LlmDriver`] – OpenAI-compatible text-analysis client.
//!
//! Targets any server exposing `/v1/chat/completions`: a local
//! [Ollama](https://ollama.com) (`http://localhost:11434`), OpenAI, or
//! Gemini's OpenAI-compatible endpoint
//! (`https://generativelanguage.googleapis.com/v1beta/openai`, in which case
//! the path suffix is `/chat/completions`; see [`LlmDriver::with_endpoint`]).
//!
//! ```rust,no_run
//! use vigil_runtime::llm_driver::LlmDriver;
//!
//! let driver = LlmDriver::new("http://localhost:11434", "llama3");
//! // let reply = driver.complete(&[ChatMessage::user("...")]).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can arise from text-analysis calls.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

/// Maps a prompt to a natural-language response.
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AnalysisError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

/// The role of a reply is not needed, only its text.
#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmDriver
// ─────────────────────────────────────────────────────────────────────────────

/// Async client for a chat-completions endpoint.  Construct once and reuse.
pub struct LlmDriver {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LlmDriver {
    /// Driver for `<base_url>/v1/chat/completions`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base: String = base_url.into();
        Self::with_endpoint(
            format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            model,
        )
    }

    /// Driver for a fully specified completions URL.
    pub fn with_endpoint(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.  Empty keys
    /// are ignored.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `messages` and return the first choice's text.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::Http`] if the request fails or the server answers
    /// with an error status, [`AnalysisError::BadResponse`] if no choice is
    /// returned.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AnalysisError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: ChatResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| AnalysisError::BadResponse("empty choices array".into()))
    }
}

#[async_trait]
impl TextAnalyzer for LlmDriver {
    async fn generate(&self, prompt: &str) -> Result<String, AnalysisError> {
        self.complete(&[ChatMessage::user(prompt)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_serializes_role() {
        let json = serde_json::to_string(&ChatMessage::user("hello")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hello"}"#);
    }

    #[test]
    fn endpoint_built_from_base_url() {
        let driver = LlmDriver::new("http://localhost:11434/", "llama3");
        assert_eq!(driver.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn empty_api_key_is_ignored() {
        let driver = LlmDriver::new("http://x", "m").with_api_key("");
        assert!(driver.api_key.is_none());
        let driver = driver.with_api_key("sk-test");
        assert_eq!(driver.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn response_parses_first_choice() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"action: [sitting]"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "action: [sitting]");
    }

    #[test]
    fn reply_role_is_not_interpreted() {
        let raw = r#"{"choices":[{"message":{"role":"tool","content":"ok"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "ok");
    }

    #[tokio::test]
    async fn unreachable_server_is_http_error() {
        let driver = LlmDriver::new("http://127.0.0.1:9", "llama3");
        let err = driver.generate("hi").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Http(_)));
    }
}
