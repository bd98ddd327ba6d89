use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::TranscodeOptions;
use crate::error::{CapabilityUnavailable, TranscodeError};
use crate::types::TargetEncoding;

/// Maximum number of stderr characters kept for error reports.
const STDERR_TAIL_CHARS: usize = 1000;

/// Number of trailing stderr lines kept while ffmpeg runs.
const STDERR_TAIL_LINES: usize = 20;

/// An external transcoding capability.
///
/// Implementations run out-of-process; callers simply await the result.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert `input` into [`Transcoder::encoding`] at `output`.
    ///
    /// A failed run may leave a partial file at `output`; removing it is the
    /// caller's job.
    async fn transcode(&self, input: &Path, output: &Path) -> Result<PathBuf, TranscodeError>;

    /// Check that the backend is reachable.
    async fn probe(&self) -> Result<(), CapabilityUnavailable>;

    fn encoding(&self) -> TargetEncoding {
        TargetEncoding::MP3_128K
    }
}

/// [`Transcoder`] backed by the `ffmpeg` command-line tool.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    options: TranscodeOptions,
}

impl FfmpegTranscoder {
    pub fn new(options: TranscodeOptions) -> Self {
        Self { options }
    }

    pub fn program(&self) -> PathBuf {
        self.options.resolve_program()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
        let program = self.program();
        let args = transcode_args(input, output, &self.encoding());
        info!(command = %render_command(&program, &args), "ffmpeg started");

        // Arguments go straight to the process, never through a shell.
        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&program, e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let duration_us = AtomicU64::new(0);

        // Both pipes are drained while waiting so ffmpeg never blocks on a full pipe.
        let run = async {
            let (_, stderr_tail, status) = tokio::join!(
                report_progress(stdout, &duration_us),
                collect_stderr(stderr, &duration_us),
                child.wait(),
            );
            (stderr_tail, status)
        };

        let finished = match self.options.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.ok(),
            None => Some(run.await),
        };

        let Some((stderr_tail, status)) = finished else {
            let limit = self.options.timeout.unwrap_or_default();
            warn!(timeout = ?limit, "ffmpeg timed out, killing it");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill ffmpeg");
            }
            return Err(TranscodeError::TimedOut(limit));
        };

        let status = status.map_err(TranscodeError::Spawn)?;
        if !status.success() {
            warn!(%status, stderr = %stderr_tail, "ffmpeg failed");
            return Err(TranscodeError::Failed {
                status: status.to_string(),
                stderr: stderr_tail,
            });
        }

        if tokio::fs::metadata(output).await.is_err() {
            return Err(TranscodeError::NoOutput);
        }

        info!(output = %output.display(), "ffmpeg finished");
        Ok(output.to_path_buf())
    }

    async fn probe(&self) -> Result<(), CapabilityUnavailable> {
        let program = self.program();
        let output = Command::new(&program)
            .args(["-hide_banner", "-formats"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                warn!(program = %program.display(), error = %e, "ffmpeg probe could not start");
                CapabilityUnavailable::new(probe_reason(&e))
            })?;

        if !output.status.success() {
            return Err(CapabilityUnavailable::new(format!(
                "ffmpeg -formats exited with {}",
                output.status
            )));
        }

        let formats = count_formats(&String::from_utf8_lossy(&output.stdout));
        if formats == 0 {
            return Err(CapabilityUnavailable::new(
                "ffmpeg reported no supported formats",
            ));
        }

        debug!(formats, "ffmpeg probe succeeded");
        Ok(())
    }
}

/// Argument list for one conversion. Audio only, fixed codec and constant bitrate.
fn transcode_args(input: &Path, output: &Path, encoding: &TargetEncoding) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-nostdin",
        "-hide_banner",
        "-nostats",
        "-y",
        "-progress",
        "pipe:1",
        "-i",
    ]
    .map(OsString::from)
    .to_vec();
    args.push(input.as_os_str().to_owned());
    args.extend(["-vn", "-acodec", encoding.codec, "-b:a"].map(OsString::from));
    args.push(format!("{}k", encoding.bitrate_kbps).into());
    args.extend(["-f", encoding.format].map(OsString::from));
    args.push(output.as_os_str().to_owned());
    args
}

/// Human-readable command line for logs.
fn render_command(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|a| {
            let a = a.to_string_lossy();
            if a.contains(' ') {
                format!("\"{a}\"")
            } else {
                a.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn spawn_error(program: &Path, e: std::io::Error) -> TranscodeError {
    if e.kind() == std::io::ErrorKind::NotFound {
        warn!(program = %program.display(), "ffmpeg binary not found");
        TranscodeError::NotFound
    } else {
        TranscodeError::Spawn(e)
    }
}

fn probe_reason(e: &std::io::Error) -> String {
    match e.kind() {
        std::io::ErrorKind::NotFound => {
            "ffmpeg not found. Install ffmpeg and add it to the system PATH.".to_string()
        }
        std::io::ErrorKind::PermissionDenied => {
            "ffmpeg is not executable: permission denied".to_string()
        }
        _ => format!("failed to run ffmpeg: {e}"),
    }
}

/// Call `f` for every line of `reader`, tolerating non-UTF-8 output.
async fn for_each_line<R: AsyncRead + Unpin>(reader: R, mut f: impl FnMut(&str)) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => f(String::from_utf8_lossy(&buf).trim_end()),
        }
    }
}

/// Drain stderr, remembering the input duration and the last few lines.
async fn collect_stderr<R: AsyncRead + Unpin>(stderr: Option<R>, duration_us: &AtomicU64) -> String {
    let Some(stderr) = stderr else {
        return String::new();
    };

    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for_each_line(stderr, |line| {
        if duration_us.load(Ordering::Relaxed) == 0 {
            if let Some(us) = parse_duration(line) {
                duration_us.store(us, Ordering::Relaxed);
            }
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    })
    .await;

    let joined = Vec::from(tail).join("\n");
    let skip = joined.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    joined.chars().skip(skip).collect()
}

/// Drain `-progress` output and log the completion percentage.
async fn report_progress<R: AsyncRead + Unpin>(stdout: Option<R>, duration_us: &AtomicU64) {
    let Some(stdout) = stdout else {
        return;
    };

    let mut last: Option<u32> = None;
    for_each_line(stdout, |line| match parse_progress(line) {
        Some(Progress::OutTime(us)) => {
            if let Some(pct) = percent(us, duration_us.load(Ordering::Relaxed)) {
                if last != Some(pct) {
                    debug!(percent = pct, "transcoding progress");
                    last = Some(pct);
                }
            }
        }
        Some(Progress::End) => debug!("transcoding progress complete"),
        None => {}
    })
    .await;
}

#[derive(Debug, PartialEq, Eq)]
enum Progress {
    OutTime(u64),
    End,
}

/// Parse one `key=value` line of ffmpeg's `-progress` output.
///
/// `out_time_ms` is in microseconds too; ffmpeg has always mislabelled it.
fn parse_progress(line: &str) -> Option<Progress> {
    let (key, value) = line.split_once('=')?;
    match key.trim() {
        "out_time_us" | "out_time_ms" => value.trim().parse().ok().map(Progress::OutTime),
        "progress" if value.trim() == "end" => Some(Progress::End),
        _ => None,
    }
}

/// Extract the input duration, in microseconds, from a `Duration: HH:MM:SS.xx, ...` line.
fn parse_duration(line: &str) -> Option<u64> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let stamp = rest.split(',').next()?.trim();
    parse_timestamp(stamp)
}

fn parse_timestamp(stamp: &str) -> Option<u64> {
    let mut parts = stamp.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let total = (hours * 3600 + minutes * 60) as f64 + seconds;
    Some((total * 1_000_000.0).round() as u64)
}

fn percent(done_us: u64, total_us: u64) -> Option<u32> {
    if total_us == 0 {
        return None;
    }
    Some(((done_us as f64 / total_us as f64) * 100.0).min(100.0) as u32)
}

/// Number of entries in `ffmpeg -formats` output.
///
/// Entries follow a separator made only of dashes: `--` in older releases,
/// `---` once the `..d = Is a device` legend line was added. Listings without
/// a separator fall back to counting every entry-shaped line.
fn count_formats(listing: &str) -> usize {
    let has_separator = listing.lines().any(is_separator);
    listing
        .lines()
        .skip_while(|l| has_separator && !is_separator(l))
        .filter(|l| is_format_entry(l))
        .count()
}

fn is_separator(line: &str) -> bool {
    let line = line.trim();
    line.len() >= 2 && line.chars().all(|c| c == '-')
}

/// A `<flags> <name> <description>` line, flags drawn from `D`, `E` and `d`.
///
/// Legend lines such as ` D. = Demuxing supported` carry a `.` and never match.
fn is_format_entry(line: &str) -> bool {
    let mut tokens = line.split_whitespace();
    let (Some(flags), Some(name)) = (tokens.next(), tokens.next()) else {
        return false;
    };
    flags.len() <= 3
        && flags.chars().all(|c| matches!(c, 'D' | 'E' | 'd'))
        && flags.chars().any(|c| matches!(c, 'D' | 'E'))
        && name != "="
}
