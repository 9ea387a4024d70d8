//! Chat model client for answering tutoring turns.
//!
//! One trait, one production implementation. [`OpenAiChatClient`] calls
//! `POST https://api.openai.com/v1/chat/completions` with a system message
//! (the student's learned context) and a user message (the question).
//!
//! Retry strategy:
//! - HTTP 429 or 5xx → retry with exponential backoff
//! - HTTP 4xx (not 429) → fail immediately
//! - Network error → retry
//!
//! Every failure mode collapses into [`TutorError::ModelUnavailable`] so the
//! tutor loop can treat "no answer" as one condition. An error string is
//! never returned as if it were an answer.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::ModelConfig;
use crate::error::TutorError;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Produces an answer from a system context and a user question.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, TutorError>;
}

/// OpenAI chat completions client.
///
/// Requires the `OPENAI_API_KEY` environment variable at call time.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    config: ModelConfig,
}

impl OpenAiChatClient {
    pub fn new(config: ModelConfig) -> Result<Self, TutorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TutorError::ModelUnavailable(format!("http client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn send_once(
        &self,
        api_key: &str,
        body: &serde_json::Value,
    ) -> Result<String, RequestOutcome> {
        let resp = self
            .client
            .post(OPENAI_CHAT_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| RequestOutcome::Retry(format!("request failed: {}", e)))?;

        let status = resp.status();
        if status.is_success() {
            let json: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| RequestOutcome::Fatal(format!("bad response body: {}", e)))?;
            return parse_chat_response(&json).map_err(RequestOutcome::Fatal);
        }

        let body_text = resp.text().await.unwrap_or_default();
        let msg = format!("OpenAI API error {}: {}", status, body_text);
        if status.as_u16() == 429 || status.is_server_error() {
            Err(RequestOutcome::Retry(msg))
        } else {
            Err(RequestOutcome::Fatal(msg))
        }
    }
}

enum RequestOutcome {
    Retry(String),
    Fatal(String),
}

#[async_trait]
impl ModelClient for OpenAiChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, TutorError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| TutorError::ModelUnavailable("OPENAI_API_KEY not set".to_string()))?;

        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.send_once(&api_key, &body).await {
                Ok(answer) => return Ok(answer),
                Err(RequestOutcome::Retry(msg)) => {
                    warn!(attempt, "model request failed, will retry: {}", msg);
                    last_err = Some(msg);
                }
                Err(RequestOutcome::Fatal(msg)) => {
                    return Err(TutorError::ModelUnavailable(msg));
                }
            }
        }

        Err(TutorError::ModelUnavailable(
            last_err.unwrap_or_else(|| "completion failed after retries".to_string()),
        ))
    }
}

/// Pull the first choice's message content out of a chat completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| format!("unexpected response shape: {}", json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_response_content() {
        let json = serde_json::json!({
            "choices": [
                {"message": {"role": "assistant", "content": "An answer."}}
            ]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "An answer.");
    }

    #[test]
    fn rejects_malformed_response() {
        let json = serde_json::json!({"error": {"message": "boom"}});
        assert!(parse_chat_response(&json).is_err());

        let json = serde_json::json!({"choices": []});
        assert!(parse_chat_response(&json).is_err());
    }
}
