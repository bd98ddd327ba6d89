use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mediascribe::{ErrorKind, PipelineOutcome};
use serde::Serialize;

use crate::state::AppState;
use crate::upload;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeResponse {
    pub success: bool,
    pub transcription: String,
    pub original_filename: String,
}

/// Body of every non-2xx response from `/transcribe`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct FfmpegStatus {
    pub status: String,
    pub message: String,
}

#[tracing::instrument(skip_all)]
pub async fn transcribe_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let upload = match upload::receive(multipart, state.pipeline.store(), state.upload_limit).await
    {
        Ok(upload) => upload,
        Err(e) => return e.into_response(),
    };

    outcome_response(state.pipeline.run(upload).await)
}

pub async fn check_ffmpeg_handler(State(state): State<AppState>) -> Response {
    match state.pipeline.probe().await {
        Ok(()) => (
            StatusCode::OK,
            Json(FfmpegStatus {
                status: "ok".to_string(),
                message: "ffmpeg is installed and working".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(reason = %e, "ffmpeg check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(FfmpegStatus {
                    status: "error".to_string(),
                    message: e.reason,
                }),
            )
                .into_response()
        }
    }
}

/// Map a pipeline outcome onto the HTTP envelope.
pub fn outcome_response(outcome: PipelineOutcome) -> Response {
    match outcome {
        PipelineOutcome::Success(result) => (
            StatusCode::OK,
            Json(TranscribeResponse {
                success: true,
                transcription: result.text,
                original_filename: result.original_filename,
            }),
        )
            .into_response(),
        PipelineOutcome::Failure(failure) => {
            let (status, error) = match failure.kind {
                ErrorKind::NoFile => (StatusCode::BAD_REQUEST, "bad input"),
                ErrorKind::CapabilityUnavailable => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "backend unavailable")
                }
                ErrorKind::Transcode | ErrorKind::Transcription => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "processing failed")
                }
            };
            (
                status,
                Json(ErrorBody {
                    error: error.to_string(),
                    details: failure.message,
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use mediascribe::{PipelineFailure, TranscriptionResult};

    use super::*;

    #[test]
    fn test_outcome_status_codes() {
        let cases = [
            (ErrorKind::NoFile, StatusCode::BAD_REQUEST),
            (
                ErrorKind::CapabilityUnavailable,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ErrorKind::Transcode, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorKind::Transcription, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (kind, expected) in cases {
            let response =
                outcome_response(PipelineOutcome::Failure(PipelineFailure::new(kind, "x")));
            assert_eq!(response.status(), expected, "{kind}");
        }

        let response = outcome_response(PipelineOutcome::Success(TranscriptionResult {
            text: "oi".into(),
            original_filename: "a.mp3".into(),
        }));
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_success_body_uses_camel_case() {
        let body = serde_json::to_value(TranscribeResponse {
            success: true,
            transcription: "oi".into(),
            original_filename: "a.mp3".into(),
        })
        .unwrap();
        assert_eq!(body["originalFilename"], "a.mp3");
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_success_envelope_carries_result() {
        let response = outcome_response(PipelineOutcome::Success(TranscriptionResult {
            text: "Bom dia".into(),
            original_filename: "lecture.wav".into(),
        }));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "success": true,
                "transcription": "Bom dia",
                "originalFilename": "lecture.wav",
            })
        );
    }
}
