//! [`Captioner`] – image-to-text capability, and its Ollama client.
//!
//! [`OllamaCaptioner`] talks to a vision model (e.g. `llava`, `moondream`)
//! through Ollama's native `/api/generate` endpoint, which accepts
//! base64-encoded images alongside the prompt.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prompt used for the unconditioned captioning pass.
pub const BASIC_CAPTION_PROMPT: &str = "Write a one-sentence caption for this image.";

#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

/// Maps a JPEG image to natural-language text.
#[async_trait]
pub trait Captioner: Send + Sync {
    /// Caption `jpeg`.  `instruction` conditions the model; `None` asks for a
    /// generic description.
    async fn caption(&self, jpeg: &[u8], instruction: Option<&str>) -> Result<String, CaptionError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: [String; 1],
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    error: Option<String>,
}

pub struct OllamaCaptioner {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaCaptioner {
    /// `base_url` is the Ollama root, e.g. `"http://localhost:11434"`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request_body<'a>(&'a self, jpeg: &[u8], prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            images: [STANDARD.encode(jpeg)],
            stream: false,
        }
    }
}

#[async_trait]
impl Captioner for OllamaCaptioner {
    async fn caption(&self, jpeg: &[u8], instruction: Option<&str>) -> Result<String, CaptionError> {
        let prompt = instruction.unwrap_or(BASIC_CAPTION_PROMPT);
        let url = format!("{}/api/generate", self.base_url);
        let reply: GenerateResponse = self
            .client
            .post(&url)
            .json(&self.request_body(jpeg, prompt))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match (reply.response, reply.error) {
            (_, Some(err)) => Err(CaptionError::BadResponse(err)),
            (Some(text), None) => Ok(text.trim().to_string()),
            (None, None) => Err(CaptionError::BadResponse("missing `response` field".into())),
        }
    }
}
