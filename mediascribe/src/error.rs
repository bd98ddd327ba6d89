use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while configuring the pipeline or preparing its storage.
///
/// Failures of a pipeline run itself are reported through
/// [`PipelineOutcome`](crate::PipelineOutcome), not through this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("unsupported language: \"{0}\" — expected a two-letter ISO 639-1 code such as \"pt\" or \"en\"")]
    UnsupportedLanguage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The transcoding backend could not be reached.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct CapabilityUnavailable {
    pub reason: String,
}

impl CapabilityUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failure of one ffmpeg invocation.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("ffmpeg not found — install ffmpeg and add it to the system PATH")]
    NotFound,

    #[error("failed to run ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffmpeg exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("ffmpeg did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("ffmpeg reported success but wrote no output file")]
    NoOutput,
}

/// Failure of the remote speech-to-text call.
///
/// The orchestrator treats every variant the same way; the split only
/// exists so logs and callers of [`Transcriber`](crate::Transcriber) can
/// tell the reasons apart.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("failed to read audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("transcription service rejected the credentials: {0}")]
    Auth(String),

    #[error("transcription service quota or rate limit reached: {0}")]
    RateLimited(String),

    #[error("transcription service rejected the audio: {0}")]
    UnsupportedInput(String),

    #[error("transcription service error (HTTP {status}): {body}")]
    Service { status: u16, body: String },

    #[error("invalid response from transcription service: {0}")]
    InvalidResponse(String),
}

/// A temporary artifact could not be removed. Logged, never returned to clients.
#[derive(Debug, thiserror::Error)]
#[error("failed to remove {path}: {source}")]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_option() {
        let e = Error::InvalidOption("model must not be empty".into());
        assert_eq!(e.to_string(), "invalid option: model must not be empty");
    }

    #[test]
    fn test_error_display_unsupported_language() {
        let e = Error::UnsupportedLanguage("klingon".into());
        let msg = e.to_string();
        assert!(msg.contains("klingon"));
        assert!(msg.contains("ISO 639-1"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("denied"));
    }

    #[test]
    fn test_capability_unavailable_displays_reason_only() {
        let e = CapabilityUnavailable::new("ffmpeg not found");
        assert_eq!(e.to_string(), "ffmpeg not found");
    }

    #[test]
    fn test_transcode_error_not_found_mentions_path_setup() {
        let msg = TranscodeError::NotFound.to_string();
        assert!(msg.contains("PATH"));
    }

    #[test]
    fn test_transcode_error_failed_includes_stderr() {
        let e = TranscodeError::Failed {
            status: "exit status: 1".into(),
            stderr: "Invalid data found when processing input".into(),
        };
        assert!(e.to_string().contains("Invalid data found"));
    }

    #[test]
    fn test_transcription_error_service_includes_status() {
        let e = TranscriptionError::Service {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(
            e.to_string(),
            "transcription service error (HTTP 502): bad gateway"
        );
    }

    #[test]
    fn test_cleanup_error_keeps_source() {
        use std::error::Error as _;

        let e = CleanupError {
            path: PathBuf::from("/tmp/upload.wav"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
        };
        assert!(e.to_string().contains("/tmp/upload.wav"));
        assert!(e.source().is_some());
    }

    #[test]
    fn test_error_debug_impl() {
        let e = TranscriptionError::RateLimited("quota".into());
        let debug = format!("{:?}", e);
        assert!(debug.contains("RateLimited"));
    }
}
