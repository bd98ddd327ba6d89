use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::config::TranscriptionConfig;
use crate::error::{Result, TranscriptionError};

/// A remote speech-to-text capability.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Produce text for the audio file at `audio_path`. One attempt, no retry.
    async fn transcribe(&self, audio_path: &Path) -> std::result::Result<String, TranscriptionError>;
}

/// [`Transcriber`] for OpenAI-compatible `/audio/transcriptions` endpoints.
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    config: TranscriptionConfig,
    endpoint: String,
}

impl OpenAiTranscriber {
    pub fn new(config: TranscriptionConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            config,
        })
    }

    pub fn config(&self) -> &TranscriptionConfig {
        &self.config
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> std::result::Result<String, TranscriptionError> {
        let file_part = file_part(audio_path).await?;

        let form = Form::new()
            .text("model", self.config.model.clone())
            .text("language", self.config.language.code().to_string())
            .text("response_format", "json")
            .part("file", file_part);

        debug!(
            model = %self.config.model,
            language = %self.config.language,
            "sending audio to transcription service"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_failure(status, &body);
            warn!(status = status.as_u16(), error = %err, "transcription request failed");
            return Err(err);
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;

        let text = parsed.text.trim().to_string();
        info!(chars = text.len(), "transcription completed");
        Ok(text)
    }
}

/// Stream the file from disk rather than buffering it.
async fn file_part(path: &Path) -> std::result::Result<Part, TranscriptionError> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
    Part::stream_with_length(body, len)
        .file_name(file_name)
        .mime_str(mime_for(path))
        .map_err(|e| TranscriptionError::UnsupportedInput(format!("mime: {e}")))
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("webm") => "audio/webm",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

fn classify_failure(status: StatusCode, body: &str) -> TranscriptionError {
    let message = error_message(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TranscriptionError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => TranscriptionError::RateLimited(message),
        StatusCode::BAD_REQUEST
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNSUPPORTED_MEDIA_TYPE => TranscriptionError::UnsupportedInput(message),
        _ => TranscriptionError::Service {
            status: status.as_u16(),
            body: message,
        },
    }
}

/// The `error.message` of an API error body, or the (truncated) raw body.
fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        return parsed.error.message;
    }
    let raw: String = body.trim().chars().take(500).collect();
    if raw.is_empty() {
        "no details".to_string()
    } else {
        raw
    }
}
