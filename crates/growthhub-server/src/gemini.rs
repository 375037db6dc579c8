use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use growthhub_core::config::GeminiConfig;
use growthhub_core::generation::{GenerationError, TextGenerator};

/// `TextGenerator` backed by the Gemini `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Gemini client build failed, using default client");
                Client::new()
            });
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

/// Map a non-success HTTP status to a generation error.
fn status_error(status: StatusCode, body: &str, model: &str) -> GenerationError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::InvalidApiKey,
        StatusCode::NOT_FOUND => GenerationError::ModelNotFound(model.to_string()),
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited,
        _ => GenerationError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(body: &str) -> Result<String, GenerationError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
    let content = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| GenerationError::MalformedResponse("no candidates".to_string()))?;
    Ok(content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join(""))
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingApiKey)?;

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&json!({
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(status_error(status, &body, &self.config.model));
        }

        let text = extract_text(&body)?;
        debug!(model = %self.config.model, chars = text.chars().count(), "Gemini generation completed");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_statuses_to_errors() {
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "", "gemini-pro"),
            GenerationError::RateLimited
        );
        assert_eq!(
            status_error(StatusCode::FORBIDDEN, "", "gemini-pro"),
            GenerationError::InvalidApiKey
        );
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, "", "gemini-x"),
            GenerationError::ModelNotFound("gemini-x".to_string())
        );
        assert_eq!(
            status_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error":{"code":500,"message":"backend exploded"}}"#,
                "gemini-pro"
            ),
            GenerationError::Api {
                status: 500,
                message: "backend exploded".to_string()
            }
        );
    }

    #[test]
    fn extracts_first_candidate_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"売上は"},{"text":"好調です"}]}},{"content":{"parts":[{"text":"ignored"}]}}]}"#;
        assert_eq!(extract_text(body).expect("text"), "売上は好調です");
    }

    #[test]
    fn empty_candidates_are_malformed() {
        assert!(matches!(
            extract_text(r#"{"candidates":[]}"#),
            Err(GenerationError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_text("not json"),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_request() {
        let client = GeminiClient::new(GeminiConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..GeminiConfig::default()
        });
        assert_eq!(
            client.generate("こんにちは").await,
            Err(GenerationError::MissingApiKey)
        );
    }
}
