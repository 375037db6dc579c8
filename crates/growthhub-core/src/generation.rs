use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::usage::Remaining;

/// Failure of the downstream text generator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Gemini APIキーが未設定です")]
    MissingApiKey,

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("generation API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
}

/// Prompt-in, text-out generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Where the text of a [`GenerationResult`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Produced by the downstream generator and billed.
    Generated,
    /// Canned answer substituted after a generator failure.
    Fallback,
    /// Canned answer served because the request was sampled out.
    Sample,
    /// Nothing was produced.
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub success: bool,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<Remaining>,
    pub source: ResponseSource,
}

impl GenerationResult {
    pub fn denied(message: String) -> Self {
        Self {
            success: false,
            text: String::new(),
            message: Some(message),
            remaining: None,
            source: ResponseSource::None,
        }
    }

    pub fn produced(text: String, remaining: Remaining, source: ResponseSource) -> Self {
        Self {
            success: true,
            text,
            message: None,
            remaining: Some(remaining),
            source,
        }
    }
}
