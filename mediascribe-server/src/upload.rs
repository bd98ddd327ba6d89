use std::path::Path;

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mediascribe::{ArtifactScope, TransientStore, UploadedArtifact};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::handlers::ErrorBody;

/// Multipart field carrying the media file.
pub const FILE_FIELD: &str = "file";

/// Accepted file extensions. Media types are checked against the same tokens.
pub const ALLOWED_EXTENSIONS: [&str; 10] = [
    "mp3", "mp4", "wav", "m4a", "webm", "avi", "mov", "flv", "wmv", "mkv",
];

pub const DEFAULT_UPLOAD_LIMIT: u64 = 100 * 1024 * 1024;

/// An upload rejected before it reached the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("malformed multipart request: {0}")]
    Malformed(String),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("file is larger than the upload limit of {}", human_size(.limit))]
    TooLarge { limit: u64 },

    #[error("failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::Malformed(_) | UploadError::UnsupportedFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let error = match &self {
            UploadError::Storage(_) => "upload failed",
            _ => "bad input",
        };
        let body = ErrorBody {
            error: error.to_string(),
            details: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

fn human_size(bytes: &u64) -> String {
    const MIB: u64 = 1024 * 1024;
    let bytes = *bytes;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}

/// Check the client's filename and media type against the allow-list.
///
/// Returns the lowercase extension on success.
pub fn validate(filename: &str, media_type: &str) -> Result<String, UploadError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()))
        .ok_or_else(|| UploadError::UnsupportedFormat(filename.to_string()))?;

    let media_type = media_type.to_ascii_lowercase();
    let media_ok = media_type.starts_with("audio/")
        || media_type.starts_with("video/")
        || ALLOWED_EXTENSIONS.iter().any(|t| media_type.contains(t));
    if !media_ok {
        return Err(UploadError::UnsupportedFormat(format!(
            "{filename} ({media_type})"
        )));
    }

    Ok(extension)
}

/// Pull the `file` field out of a multipart request and stream it into the store.
///
/// A request that is not multipart, or has no `file` field, yields `Ok(None)`
/// and is left for the pipeline to report. The partially written file is
/// removed on any error, and also when this future is dropped before finishing.
pub async fn receive(
    multipart: Result<Multipart, MultipartRejection>,
    store: &TransientStore,
    limit: u64,
) -> Result<Option<UploadedArtifact>, UploadError> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            debug!(reason = %rejection.body_text(), "request is not multipart");
            return Ok(None);
        }
    };

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            // browsers send an empty part when no file was picked
            return Ok(None);
        }
        let media_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let extension = validate(&filename, &media_type).inspect_err(|e| {
            warn!(file = %filename, media_type = %media_type, error = %e, "upload rejected");
        })?;

        store.ensure_dir().await?;
        // Guarded from before creation so a cancelled request cannot leave it behind.
        let mut scope = ArtifactScope::new();
        let path = scope.acquire(store.artifact_path(FILE_FIELD, Some(&extension)));
        return match write_field(&mut field, &path, limit).await {
            Ok(size) => {
                scope.detach();
                info!(file = %filename, size, media_type = %media_type, "upload stored");
                Ok(Some(UploadedArtifact::new(path, filename, media_type, size)))
            }
            Err(e) => {
                warn!(file = %filename, error = %e, "upload aborted");
                scope.release_all().await;
                Err(e)
            }
        };
    }

    Ok(None)
}

async fn write_field(field: &mut Field<'_>, path: &Path, limit: u64) -> Result<u64, UploadError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut size = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
        size += chunk.len() as u64;
        if size > limit {
            return Err(UploadError::TooLarge { limit });
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(size)
}

fn multipart_error(e: MultipartError, limit: u64) -> UploadError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge { limit }
    } else {
        UploadError::Malformed(e.body_text())
    }
}
