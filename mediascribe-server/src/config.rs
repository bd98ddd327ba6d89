use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use mediascribe::config::{DEFAULT_BASE_URL, DEFAULT_LANGUAGE, DEFAULT_MODEL};
use mediascribe::{PipelineOptions, TranscodeOptions, TranscriptionConfig};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server settings. Every flag falls back to an environment variable, and
/// `.env` is loaded before parsing.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mediascribe-server",
    version,
    about = "Upload audio or video, get a transcript back"
)]
pub struct Settings {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// API key for the transcription service.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Remote transcription model.
    #[arg(short, long, env = "TRANSCRIPTION_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Language hint sent with every request (two-letter code).
    #[arg(short, long, env = "TRANSCRIPTION_LANGUAGE", default_value = DEFAULT_LANGUAGE)]
    pub language: String,

    /// Timeout for one transcription request, in seconds.
    #[arg(long, env = "TRANSCRIPTION_TIMEOUT_SECS")]
    pub transcription_timeout: Option<u64>,

    /// ffmpeg binary (default: `ffmpeg` on PATH).
    #[arg(long, env = "FFMPEG_PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// Timeout for one ffmpeg conversion, in seconds.
    #[arg(long, env = "FFMPEG_TIMEOUT_SECS")]
    pub ffmpeg_timeout: Option<u64>,

    /// Directory for in-flight uploads and conversions.
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Directory served as static files at `/`.
    #[arg(long, env = "PUBLIC_DIR", default_value = "public")]
    pub public_dir: PathBuf,

    /// Largest accepted upload, in megabytes.
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 100)]
    pub max_upload_mb: u64,

    /// Only probe ffmpeg at startup and on /check-ffmpeg, not on every upload.
    #[arg(long, env = "SKIP_REQUEST_PROBE")]
    pub skip_request_probe: bool,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl Settings {
    /// The API key, if one is set and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn upload_limit(&self) -> u64 {
        self.max_upload_mb.saturating_mul(MIB)
    }

    pub fn transcription_config(&self) -> mediascribe::Result<TranscriptionConfig> {
        let mut config = TranscriptionConfig::new(self.api_key().unwrap_or_default())
            .base_url(&self.base_url)?
            .model(&self.model)?
            .language(&self.language)?;
        if let Some(secs) = self.transcription_timeout {
            config = config.timeout(Duration::from_secs(secs))?;
        }
        Ok(config)
    }

    pub fn transcode_options(&self) -> mediascribe::Result<TranscodeOptions> {
        let mut options = TranscodeOptions::new();
        if let Some(program) = &self.ffmpeg {
            options = options.program(program);
        }
        if let Some(secs) = self.ffmpeg_timeout {
            options = options.timeout(Duration::from_secs(secs))?;
        }
        Ok(options)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions::new().probe_each_request(!self.skip_request_probe)
    }
}
