use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::CleanupError;

/// Directory holding the artifacts of in-flight requests.
///
/// Nothing in here outlives the request that created it. Concurrent requests
/// share the directory but never a path: every name carries a millisecond
/// timestamp and a random component.
#[derive(Debug, Clone)]
pub struct TransientStore {
    dir: PathBuf,
}

impl TransientStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// A fresh path of the form `<dir>/<stem>-<millis>-<random>[.<ext>]`.
    ///
    /// The stem is reduced to `[A-Za-z0-9_-]` so client-supplied names can
    /// never escape the directory.
    pub fn artifact_path(&self, stem: &str, extension: Option<&str>) -> PathBuf {
        let mut name = format!("{}-{}", sanitize_stem(stem), unique_suffix());
        if let Some(ext) = extension.map(sanitize_extension).filter(|e| !e.is_empty()) {
            name.push('.');
            name.push_str(&ext);
        }
        self.dir.join(name)
    }
}

fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn sanitize_extension(ext: &str) -> String {
    ext.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_ascii_lowercase()
}

fn unique_suffix() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let random = rand::random_range(0..1_000_000_000u32);
    format!("{millis}-{random}")
}

/// Remove one file, treating an already-missing file as success.
///
/// Returns `Ok(true)` if a file was removed and `Ok(false)` if there was nothing to remove.
pub async fn release(path: &Path) -> Result<bool, CleanupError> {
    removal_outcome(path, tokio::fs::remove_file(path).await)
}

/// Blocking form of [`release`], for contexts that cannot await (`Drop`).
pub fn release_blocking(path: &Path) -> Result<bool, CleanupError> {
    removal_outcome(path, std::fs::remove_file(path))
}

fn removal_outcome(path: &Path, result: std::io::Result<()>) -> Result<bool, CleanupError> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(CleanupError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// What a [`ArtifactScope::release_all`] call did.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: usize,
    pub missing: usize,
    pub failed: Vec<CleanupError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, path: &Path, outcome: Result<bool, CleanupError>) {
        match outcome {
            Ok(true) => {
                debug!(path = %path.display(), "removed artifact");
                self.removed += 1;
            }
            Ok(false) => self.missing += 1,
            Err(e) => {
                warn!(path = %e.path.display(), error = %e.source, "failed to remove artifact");
                self.failed.push(e);
            }
        }
    }
}

/// The set of artifact paths one request is responsible for.
///
/// Paths are registered before the file exists (a transcoder output may be
/// only partially written when it fails) and released together at the end.
/// `release_all` drains the scope, so each path is removed at most once; a
/// scope dropped with paths still registered, for instance because the
/// request future was cancelled, releases them on the way out.
#[derive(Debug, Default)]
pub struct ArtifactScope {
    paths: Vec<PathBuf>,
}

impl ArtifactScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path for release and hand it back.
    pub fn acquire(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path.clone());
        }
        path
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Stop tracking every path and return them. Their release becomes the caller's job.
    pub fn detach(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.paths)
    }

    /// Remove every registered path. Failures are logged and reported, never raised.
    pub async fn release_all(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for path in self.detach() {
            let outcome = release(&path).await;
            report.record(&path, outcome);
        }
        report
    }
}

impl Drop for ArtifactScope {
    fn drop(&mut self) {
        if self.paths.is_empty() {
            return;
        }
        warn!(
            count = self.paths.len(),
            "artifact scope dropped before release, cleaning up"
        );
        let mut report = CleanupReport::default();
        for path in self.detach() {
            let outcome = release_blocking(&path);
            report.record(&path, outcome);
        }
    }
}
