//! Speech-to-text through an OpenAI-compatible `audio/transcriptions` endpoint.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::groq::ErrorResponse;
use crate::domain::providers::{AudioClip, SpeechTranscriber};
use crate::error::{CounselError, CounselResult};

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct WhisperTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    language: Option<String>,
}

impl WhisperTranscriber {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        language: Option<String>,
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
            language,
        })
    }
}

#[async_trait]
impl SpeechTranscriber for WhisperTranscriber {
    async fn transcribe(&self, clip: AudioClip) -> CounselResult<String> {
        if clip.bytes.is_empty() {
            return Err(CounselError::Recognition("audio payload is empty".to_string()));
        }
        log::info!("Transcribing {} ({} bytes)", clip.file_name, clip.bytes.len());

        let mut part = Part::bytes(clip.bytes).file_name(clip.file_name);
        if let Some(content_type) = clip.content_type.as_deref() {
            part = part
                .mime_str(content_type)
                .map_err(|_| CounselError::Recognition(format!("unsupported audio content type: {}", content_type)))?;
        }
        let mut form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                log::error!("Transcription request failed: {}", e);
                CounselError::Recognition("speech service could not be reached".to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            log::error!("Failed to read transcription response body: {}", e);
            CounselError::Recognition("speech service response could not be read".to_string())
        })?;

        if !status.is_success() {
            match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => log::warn!("Speech API error ({}): {}", status, err.error.message),
                Err(_) => log::warn!("Speech API error ({}): {}", status, body),
            }
            let reason = if status.is_client_error() {
                "audio could not be understood"
            } else {
                "speech service failed"
            };
            return Err(CounselError::Recognition(format!("{} (HTTP {})", reason, status.as_u16())));
        }

        let transcription: TranscriptionResponse = serde_json::from_str(&body).map_err(|e| {
            log::error!("Failed to parse transcription response: {} - body: {}", e, body);
            CounselError::Recognition("speech service returned an unreadable response".to_string())
        })?;

        let text = transcription.text.trim().to_string();
        if text.is_empty() {
            return Err(CounselError::Recognition("no speech could be recognized".to_string()));
        }
        Ok(text)
    }
}
