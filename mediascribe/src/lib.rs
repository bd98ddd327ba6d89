//! Upload-convert-transcribe pipeline — media file in, transcript out, no files left behind.
//!
//! **mediascribe** takes an uploaded audio or video file, converts it to MP3
//! with ffmpeg when it is not one already, sends the audio to an
//! OpenAI-compatible speech-to-text endpoint, and removes every temporary
//! file it touched, whichever way the run ends.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mediascribe::{
//!     FfmpegTranscoder, OpenAiTranscriber, Pipeline, PipelineOutcome, TranscodeOptions,
//!     TranscriptionConfig, TransientStore, UploadedArtifact,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> mediascribe::Result<()> {
//! let store = TransientStore::new("uploads");
//! store.ensure_dir().await?;
//!
//! let transcriber = OpenAiTranscriber::new(TranscriptionConfig::new("sk-...").language("en")?)?;
//! let pipeline = Pipeline::new(
//!     store,
//!     Arc::new(FfmpegTranscoder::new(TranscodeOptions::new())),
//!     Arc::new(transcriber),
//! );
//!
//! let upload = UploadedArtifact::new("uploads/lecture-1-2.wav", "lecture.wav", "audio/wav", 1024);
//! match pipeline.run(Some(upload)).await {
//!     PipelineOutcome::Success(result) => println!("{}", result.text),
//!     PipelineOutcome::Failure(failure) => eprintln!("{failure}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod transcode;
pub mod transcribe;
pub mod types;

pub use config::{Language, PipelineOptions, TranscodeOptions, TranscriptionConfig};
pub use error::{
    CapabilityUnavailable, CleanupError, Error, Result, TranscodeError, TranscriptionError,
};
pub use pipeline::{Pipeline, Stage};
pub use store::{release, release_blocking, ArtifactScope, CleanupReport, TransientStore};
pub use transcode::{FfmpegTranscoder, Transcoder};
pub use transcribe::{OpenAiTranscriber, Transcriber};
pub use types::{
    ErrorKind, PipelineFailure, PipelineOutcome, TargetEncoding, TranscodedArtifact,
    TranscriptionResult, UploadedArtifact,
};

/// Check that ffmpeg is reachable with default options (`$FFMPEG_PATH` or `PATH`).
pub async fn check_ffmpeg() -> std::result::Result<(), CapabilityUnavailable> {
    FfmpegTranscoder::default().probe().await
}
