use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default endpoint of the OpenAI-compatible transcription API.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default remote model.
pub const DEFAULT_MODEL: &str = "whisper-1";

/// Default language hint sent with every request.
pub const DEFAULT_LANGUAGE: &str = "pt";

/// Environment variable consulted for the ffmpeg binary when no explicit path is set.
pub const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";

/// Language hint for the transcription service.
///
/// Holds a lowercase two-letter ISO 639-1 code ("pt", "en", "de"). The remote
/// service is the authority on which codes it actually supports; this only
/// rejects values that cannot be a code at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language(String);

impl Language {
    pub fn new(code: &str) -> Result<Self> {
        let lower = code.trim().to_ascii_lowercase();
        if lower.len() == 2 && lower.chars().all(|c| c.is_ascii_lowercase()) {
            Ok(Language(lower))
        } else {
            Err(Error::UnsupportedLanguage(code.to_string()))
        }
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for Language {
    fn default() -> Self {
        Language(DEFAULT_LANGUAGE.to_string())
    }
}

/// Options for the ffmpeg transcoder.
#[derive(Debug, Clone, Default)]
pub struct TranscodeOptions {
    /// Explicit ffmpeg binary. Falls back to `$FFMPEG_PATH`, then `ffmpeg` on `PATH`.
    pub program: Option<PathBuf>,
    /// Upper bound on one ffmpeg run. `None` waits for ffmpeg to exit on its own.
    pub timeout: Option<Duration>,
}

impl TranscodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::InvalidOption("transcode timeout must be non-zero".into()));
        }
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// The ffmpeg binary to invoke.
    pub fn resolve_program(&self) -> PathBuf {
        self.program
            .clone()
            .or_else(|| {
                std::env::var_os(FFMPEG_PATH_ENV)
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }
}

/// Connection settings for the remote transcription service.
///
/// Passed explicitly to [`OpenAiTranscriber`](crate::OpenAiTranscriber); there
/// is no process-wide client.
#[derive(Clone)]
pub struct TranscriptionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub language: Language,
    /// Whole-request timeout. `None` leaves the call unbounded.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for TranscriptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptionConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("language", &self.language)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TranscriptionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            language: Language::default(),
            timeout: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let trimmed = url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(Error::InvalidOption(format!(
                "base URL must start with http:// or https://: {url}"
            )));
        }
        self.base_url = trimmed.to_string();
        Ok(self)
    }

    pub fn model(mut self, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(Error::InvalidOption("model must not be empty".into()));
        }
        self.model = model.trim().to_string();
        Ok(self)
    }

    /// Set the language hint. Accepts two-letter codes only.
    pub fn language(mut self, code: &str) -> Result<Self> {
        self.language = Language::new(code)?;
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::InvalidOption(
                "transcription timeout must be non-zero".into(),
            ));
        }
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// Full URL of the transcription endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }
}

/// Behaviour switches for the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Probe the transcoder before every run. On by default.
    pub probe_each_request: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            probe_each_request: true,
        }
    }
}

impl PipelineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe_each_request(mut self, enabled: bool) -> Self {
        self.probe_each_request = enabled;
        self
    }
}
