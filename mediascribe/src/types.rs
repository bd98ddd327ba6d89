use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::CapabilityUnavailable;

/// A file received by the upload boundary, alive for one request.
#[derive(Debug, Clone)]
pub struct UploadedArtifact {
    pub path: PathBuf,
    pub original_filename: String,
    pub media_type: String,
    pub size: u64,
}

impl UploadedArtifact {
    pub fn new(
        path: impl Into<PathBuf>,
        original_filename: impl Into<String>,
        media_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            path: path.into(),
            original_filename: original_filename.into(),
            media_type: media_type.into(),
            size,
        }
    }

    /// Lowercase extension of the original filename, without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Output encoding produced by the transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetEncoding {
    pub format: &'static str,
    pub codec: &'static str,
    pub bitrate_kbps: u32,
}

impl TargetEncoding {
    /// MP3 via LAME at a constant 128 kbps. Channel layout follows the source.
    pub const MP3_128K: Self = Self {
        format: "mp3",
        codec: "libmp3lame",
        bitrate_kbps: 128,
    };

    pub fn extension(&self) -> &'static str {
        self.format
    }

    /// Whether a file extension (with or without a leading dot) already denotes this format.
    pub fn matches_extension(&self, extension: &str) -> bool {
        extension
            .trim_start_matches('.')
            .eq_ignore_ascii_case(self.format)
    }
}

/// The transcoded copy of an upload. Borrows the upload it was derived from.
#[derive(Debug, Clone)]
pub struct TranscodedArtifact<'a> {
    pub path: PathBuf,
    pub source: &'a UploadedArtifact,
    pub encoding: TargetEncoding,
}

/// Text produced for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionResult {
    pub text: String,
    pub original_filename: String,
}

/// Why a pipeline run failed. Cleanup problems never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoFile,
    CapabilityUnavailable,
    Transcode,
    Transcription,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoFile => "NoFileError",
            ErrorKind::CapabilityUnavailable => "CapabilityUnavailable",
            ErrorKind::Transcode => "TranscodeError",
            ErrorKind::Transcription => "TranscriptionError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn no_file() -> Self {
        Self::new(ErrorKind::NoFile, "no file was attached to the request")
    }
}

impl From<CapabilityUnavailable> for PipelineFailure {
    fn from(e: CapabilityUnavailable) -> Self {
        Self::new(ErrorKind::CapabilityUnavailable, e.reason)
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Success(TranscriptionResult),
    Failure(PipelineFailure),
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success(_))
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            PipelineOutcome::Success(_) => None,
            PipelineOutcome::Failure(f) => Some(f.kind),
        }
    }
}
