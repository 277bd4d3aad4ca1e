//! Chat completions against Groq's OpenAI-compatible API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::conversation::ChatMessage;
use crate::domain::providers::LanguageModel;
use crate::error::{CounselError, CounselResult};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    pub(crate) message: String,
}

/// Hosted language model client.
pub struct GroqChatModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl GroqChatModel {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        temperature: f32,
        timeout: Duration,
    ) -> CounselResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CounselError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for GroqChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> CounselResult<String> {
        log::debug!("Requesting completion from {} with {} messages", self.model, messages.len());

        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                log::error!("Completion request failed: {}", e);
                let reason = if e.is_timeout() { "timed out" } else { "could not be sent" };
                CounselError::Upstream(format!("language model request {}", reason))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            log::error!("Failed to read completion response body: {}", e);
            CounselError::Upstream("language model response could not be read".to_string())
        })?;

        if !status.is_success() {
            match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => log::error!("Language model API error ({}): {}", status, err.error.message),
                Err(_) => log::error!("Language model API error ({}): {}", status, body),
            }
            return Err(CounselError::Upstream(format!(
                "language model request failed (HTTP {})",
                status.as_u16()
            )));
        }

        let completion: CompletionResponse = serde_json::from_str(&body).map_err(|e| {
            log::error!("Failed to parse completion response: {} - body: {}", e, body);
            CounselError::Upstream("language model returned an unreadable response".to_string())
        })?;

        if let Some(usage) = &completion.usage {
            log::debug!(
                "Completion tokens used: prompt={} completion={}",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| CounselError::Upstream("language model returned an empty completion".to_string()))
    }
}
