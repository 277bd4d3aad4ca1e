use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::answering::{AnsweringService, DEFAULT_SESSION, MAX_SESSION_ID_LEN};
use crate::domain::providers::{AudioClip, SpeechTranscriber};
use crate::error::CounselError;

const AUDIO_FIELD: &str = "audio";
const DEFAULT_AUDIO_FILE_NAME: &str = "audio.wav";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub answering: Arc<dyn AnsweringService>,
    pub transcriber: Arc<dyn SpeechTranscriber>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

fn error_response(status: StatusCode, error: String, code: &str) -> Response {
    (status, Json(ErrorBody { error, code: code.to_string() })).into_response()
}

impl IntoResponse for CounselError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            log::error!("Request failed: {}", self);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let code = self.code();
        error_response(status, self.to_string(), code)
    }
}

/// Gives the bare `408` produced by the timeout layer a JSON error body.
pub async fn timeout_body(response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }
    log::warn!("Request timed out");
    error_response(
        StatusCode::REQUEST_TIMEOUT,
        "request timed out".to_string(),
        "request_timeout",
    )
}

fn json_rejection(rejection: JsonRejection) -> Response {
    match rejection {
        JsonRejection::JsonSyntaxError(_) => {
            CounselError::Validation("Request body is not valid JSON".to_string()).into_response()
        }
        JsonRejection::JsonDataError(_) => CounselError::Validation("No query provided".to_string()).into_response(),
        other => error_response(other.status(), other.body_text(), "validation_error"),
    }
}

/// `POST /chat`
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, Response> {
    let Json(request) = payload.map_err(json_rejection)?;

    let query = request.query.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(CounselError::Validation("No query provided".to_string()).into_response());
    }
    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());
    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(CounselError::Validation(format!(
            "session_id must be at most {} bytes",
            MAX_SESSION_ID_LEN
        ))
        .into_response());
    }

    let response = state
        .answering
        .answer(&session_id, &query)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(ChatResponse { response }))
}

/// `POST /voice`
pub async fn voice(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<VoiceResponse>, CounselError> {
    let mut multipart = multipart.map_err(|e| {
        log::debug!("Rejected voice upload: {}", e);
        CounselError::Validation("Malformed multipart body".to_string())
    })?;

    let malformed = |e: axum::extract::multipart::MultipartError| {
        log::debug!("Failed to read multipart body: {}", e);
        CounselError::Validation("Malformed multipart body".to_string())
    };

    let mut clip = None;
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or(DEFAULT_AUDIO_FILE_NAME).to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(malformed)?;
        clip = Some(AudioClip {
            bytes: bytes.to_vec(),
            file_name,
            content_type,
        });
        break;
    }

    let clip = clip.ok_or_else(|| CounselError::Validation("No audio file provided".to_string()))?;
    log::debug!("Received audio upload {}", clip.file_name);
    let text = state.transcriber.transcribe(clip).await?;
    Ok(Json(VoiceResponse { text }))
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}
