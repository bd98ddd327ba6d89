use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::PipelineOptions;
use crate::error::{CapabilityUnavailable, TranscodeError};
use crate::store::{ArtifactScope, TransientStore};
use crate::transcode::Transcoder;
use crate::transcribe::Transcriber;
use crate::types::{
    ErrorKind, PipelineFailure, PipelineOutcome, TargetEncoding, TranscodedArtifact,
    TranscriptionResult, UploadedArtifact,
};

/// Where a pipeline run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Probing,
    /// Probing disabled by [`PipelineOptions::probe_each_request`].
    Skipped,
    Transcoding,
    Transcribing,
    Cleaning,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Probing => "probing",
            Stage::Skipped => "skipped",
            Stage::Transcoding => "transcoding",
            Stage::Transcribing => "transcribing",
            Stage::Cleaning => "cleaning",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(stage: Stage, file: &str) {
    debug!(stage = %stage, file, "pipeline stage");
}

/// Upload in, transcript out, every intermediate file removed.
///
/// The transcoder and transcriber are shared read-only, so one `Pipeline`
/// can serve any number of concurrent requests.
pub struct Pipeline {
    store: TransientStore,
    transcoder: Arc<dyn Transcoder>,
    transcriber: Arc<dyn Transcriber>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        store: TransientStore,
        transcoder: Arc<dyn Transcoder>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self {
            store,
            transcoder,
            transcriber,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &TransientStore {
        &self.store
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Check the transcoding backend without running a request.
    pub async fn probe(&self) -> Result<(), CapabilityUnavailable> {
        self.transcoder.probe().await
    }

    /// Process one upload.
    ///
    /// Never fails outright: every problem becomes a
    /// [`PipelineOutcome::Failure`]. The upload and any transcoded copy are
    /// gone from disk when this returns, whichever way the run went.
    pub async fn run(&self, upload: Option<UploadedArtifact>) -> PipelineOutcome {
        let Some(upload) = upload else {
            warn!("request carried no file");
            return PipelineOutcome::Failure(PipelineFailure::no_file());
        };

        let started = Instant::now();
        let file = upload.original_filename.as_str();
        enter(Stage::Received, file);
        info!(
            file,
            size = upload.size,
            media_type = %upload.media_type,
            "processing upload"
        );

        let mut scope = ArtifactScope::new();
        scope.acquire(&upload.path);

        let result = self.process(&upload, &mut scope).await;

        enter(Stage::Cleaning, file);
        let report = scope.release_all().await;
        if !report.is_clean() {
            warn!(
                file,
                failed = report.failed.len(),
                "some temporary files could not be removed"
            );
        }

        enter(Stage::Done, file);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(text) => {
                info!(file, elapsed_ms, chars = text.len(), "transcription ready");
                PipelineOutcome::Success(TranscriptionResult {
                    text,
                    original_filename: upload.original_filename,
                })
            }
            Err(failure) => {
                warn!(file, elapsed_ms, kind = %failure.kind, message = %failure.message, "pipeline failed");
                PipelineOutcome::Failure(failure)
            }
        }
    }

    async fn process(
        &self,
        upload: &UploadedArtifact,
        scope: &mut ArtifactScope,
    ) -> Result<String, PipelineFailure> {
        let file = upload.original_filename.as_str();

        if self.options.probe_each_request {
            enter(Stage::Probing, file);
            self.transcoder.probe().await?;
        } else {
            enter(Stage::Skipped, file);
        }

        let encoding = self.transcoder.encoding();
        let already_encoded = upload
            .extension()
            .is_some_and(|ext| encoding.matches_extension(&ext));

        let transcoded = if already_encoded {
            debug!(file, format = encoding.format, "upload already in target format");
            None
        } else {
            enter(Stage::Transcoding, file);
            // Registered before ffmpeg runs so a partial output is removed too.
            let output =
                scope.acquire(self.store.artifact_path("converted", Some(encoding.extension())));
            let path = self
                .transcoder
                .transcode(&upload.path, &output)
                .await
                .map_err(|e| {
                    warn!(file, error = %e, "transcoding failed");
                    PipelineFailure::new(ErrorKind::Transcode, transcode_message(file, encoding, &e))
                })?;
            Some(TranscodedArtifact {
                path: scope.acquire(path),
                source: upload,
                encoding,
            })
        };

        let audio: &Path = match &transcoded {
            Some(t) => &t.path,
            None => &upload.path,
        };

        enter(Stage::Transcribing, file);
        self.transcriber
            .transcribe(audio)
            .await
            .map_err(|e| PipelineFailure::new(ErrorKind::Transcription, e.to_string()))
    }
}

/// Client-facing transcode message. Names the original file, never a server path.
fn transcode_message(file: &str, encoding: TargetEncoding, e: &TranscodeError) -> String {
    let reason = match e {
        TranscodeError::NotFound => "ffmpeg is not installed".to_string(),
        TranscodeError::Spawn(_) => "ffmpeg could not be started".to_string(),
        TranscodeError::Failed { .. } => "ffmpeg could not decode the file".to_string(),
        TranscodeError::TimedOut(limit) => format!("conversion took longer than {limit:?}"),
        TranscodeError::NoOutput => "ffmpeg produced no output".to_string(),
    };
    format!("failed to convert {file} to {}: {reason}", encoding.format)
}
