use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tower::ServiceExt;

use mediascribe::{
    CapabilityUnavailable, Pipeline, TranscodeError, Transcoder, Transcriber, TranscriptionError,
    TransientStore,
};
use mediascribe_server::{create_router, AppState};

const BOUNDARY: &str = "mediascribe-test-boundary";

#[derive(Default)]
struct MockTranscoder {
    unavailable: bool,
    transcodes: AtomicUsize,
}

#[async_trait::async_trait]
impl Transcoder for MockTranscoder {
    async fn transcode(&self, _input: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
        self.transcodes.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output, b"mp3").map_err(TranscodeError::Spawn)?;
        Ok(output.to_path_buf())
    }

    async fn probe(&self) -> Result<(), CapabilityUnavailable> {
        if self.unavailable {
            Err(CapabilityUnavailable::new("ffmpeg not found"))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct MockTranscriber {
    fail: bool,
}

#[async_trait::async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<String, TranscriptionError> {
        if self.fail {
            Err(TranscriptionError::Auth("Incorrect API key provided".into()))
        } else {
            Ok("Bom dia a todos".to_string())
        }
    }
}

struct TestApp {
    tmp: tempfile::TempDir,
    transcoder: Arc<MockTranscoder>,
    router: Router,
}

impl TestApp {
    fn new(transcoder: MockTranscoder, transcriber: MockTranscriber) -> Self {
        Self::with_limit(transcoder, transcriber, 100 * 1024 * 1024)
    }

    fn with_limit(transcoder: MockTranscoder, transcriber: MockTranscriber, limit: u64) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let public = tmp.path().join("public");
        std::fs::create_dir_all(&public).unwrap();
        std::fs::write(public.join("index.html"), "<h1>mediascribe</h1>").unwrap();

        let transcoder = Arc::new(transcoder);
        let pipeline = Pipeline::new(
            TransientStore::new(tmp.path().join("uploads")),
            transcoder.clone(),
            Arc::new(transcriber),
        );
        let state = AppState::new(pipeline)
            .with_upload_limit(limit)
            .with_public_dir(public);

        Self {
            tmp,
            transcoder,
            router: create_router(state),
        }
    }

    fn leftover_uploads(&self) -> usize {
        match std::fs::read_dir(self.tmp.path().join("uploads")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}

fn multipart_request(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/transcribe")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_transcribe_wav_upload() {
    let app = TestApp::new(MockTranscoder::default(), MockTranscriber::default());

    let (status, body) = app
        .send(multipart_request("file", "lecture.wav", "audio/wav", b"RIFF....WAVE"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["transcription"], "Bom dia a todos");
    assert_eq!(body["originalFilename"], "lecture.wav");
    assert_eq!(app.transcoder.transcodes.load(Ordering::SeqCst), 1);
    assert_eq!(app.leftover_uploads(), 0);
}

#[tokio::test]
async fn test_transcribe_mp3_upload_skips_conversion() {
    let app = TestApp::new(MockTranscoder::default(), MockTranscriber::default());

    let (status, body) = app
        .send(multipart_request("file", "clip.mp3", "audio/mpeg", b"ID3"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["originalFilename"], "clip.mp3");
    assert_eq!(app.transcoder.transcodes.load(Ordering::SeqCst), 0);
    assert_eq!(app.leftover_uploads(), 0);
}

#[tokio::test]
async fn test_transcribe_without_file_field() {
    let app = TestApp::new(MockTranscoder::default(), MockTranscriber::default());

    let (status, body) = app
        .send(multipart_request("attachment", "lecture.wav", "audio/wav", b"data"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad input");
    assert!(body["details"].as_str().unwrap().contains("no file"));
    assert_eq!(app.leftover_uploads(), 0);
}

#[tokio::test]
async fn test_transcribe_non_multipart_request() {
    let app = TestApp::new(MockTranscoder::default(), MockTranscriber::default());

    let request = Request::builder()
        .method("POST")
        .uri("/transcribe")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad input");
}

#[tokio::test]
async fn test_transcribe_rejects_unsupported_format() {
    let app = TestApp::new(MockTranscoder::default(), MockTranscriber::default());

    let (status, body) = app
        .send(multipart_request("file", "notes.txt", "text/plain", b"hello"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad input");
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("unsupported file format"));
    assert_eq!(app.leftover_uploads(), 0);
}

#[tokio::test]
async fn test_transcribe_rejects_oversized_upload() {
    let app = TestApp::with_limit(MockTranscoder::default(), MockTranscriber::default(), 16);

    let (status, body) = app
        .send(multipart_request("file", "lecture.wav", "audio/wav", &[0u8; 64]))
        .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "bad input");
    assert_eq!(app.leftover_uploads(), 0);
}

#[tokio::test]
async fn test_cancelled_upload_leaves_no_file() {
    let app = TestApp::new(MockTranscoder::default(), MockTranscriber::default());

    // the part headers and a first chunk arrive, then the client goes quiet
    let head = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"lecture.wav\"\r\nContent-Type: audio/wav\r\n\r\nRIFF....WAVE"
    );
    let body = stream::iter([Ok::<_, std::io::Error>(Bytes::from(head))]).chain(stream::pending());
    let request = Request::builder()
        .method("POST")
        .uri("/transcribe")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from_stream(body))
        .unwrap();

    let router = app.router.clone();
    let task = tokio::spawn(async move { router.oneshot(request).await });

    let written = tokio::time::timeout(Duration::from_secs(5), async {
        while app.leftover_uploads() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(written.is_ok(), "upload never reached the store");
    assert!(!task.is_finished());

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(app.leftover_uploads(), 0);
}

#[tokio::test]
async fn test_transcribe_reports_missing_ffmpeg() {
    let app = TestApp::new(
        MockTranscoder {
            unavailable: true,
            ..Default::default()
        },
        MockTranscriber::default(),
    );

    let (status, body) = app
        .send(multipart_request("file", "lecture.wav", "audio/wav", b"data"))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "backend unavailable");
    assert_eq!(body["details"], "ffmpeg not found");
    assert_eq!(app.leftover_uploads(), 0);
}

#[tokio::test]
async fn test_transcribe_reports_transcription_failure() {
    let app = TestApp::new(MockTranscoder::default(), MockTranscriber { fail: true });

    let (status, body) = app
        .send(multipart_request("file", "talk.webm", "video/webm", b"data"))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "processing failed");
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("Incorrect API key"));
    assert_eq!(app.leftover_uploads(), 0);
}

#[tokio::test]
async fn test_check_ffmpeg_ok() {
    let app = TestApp::new(MockTranscoder::default(), MockTranscriber::default());

    let request = Request::builder()
        .uri("/check-ffmpeg")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_check_ffmpeg_unavailable() {
    let app = TestApp::new(
        MockTranscoder {
            unavailable: true,
            ..Default::default()
        },
        MockTranscriber::default(),
    );

    let request = Request::builder()
        .uri("/check-ffmpeg")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "ffmpeg not found");
}

#[tokio::test]
async fn test_index_page_is_served() {
    let app = TestApp::new(MockTranscoder::default(), MockTranscriber::default());

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("mediascribe"));
}
