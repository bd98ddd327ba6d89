use std::path::PathBuf;
use std::sync::Arc;

use mediascribe::{FfmpegTranscoder, OpenAiTranscriber, Pipeline, TransientStore};

use crate::config::Settings;
use crate::upload::DEFAULT_UPLOAD_LIMIT;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Largest accepted upload, in bytes.
    pub upload_limit: u64,
    /// Static files served at `/`, if any.
    pub public_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            public_dir: None,
        }
    }

    pub fn with_upload_limit(mut self, bytes: u64) -> Self {
        self.upload_limit = bytes;
        self
    }

    pub fn with_public_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.public_dir = Some(dir.into());
        self
    }

    /// Wire the ffmpeg transcoder and the remote transcriber from settings.
    pub fn from_settings(settings: &Settings) -> mediascribe::Result<Self> {
        let transcoder = FfmpegTranscoder::new(settings.transcode_options()?);
        let transcriber = OpenAiTranscriber::new(settings.transcription_config()?)?;
        let pipeline = Pipeline::new(
            TransientStore::new(&settings.upload_dir),
            Arc::new(transcoder),
            Arc::new(transcriber),
        )
        .with_options(settings.pipeline_options());

        Ok(Self::new(pipeline)
            .with_upload_limit(settings.upload_limit())
            .with_public_dir(&settings.public_dir))
    }
}
