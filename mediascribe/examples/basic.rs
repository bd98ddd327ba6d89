//! Transcribe a local audio or video file and print the text.
//!
//! Usage: OPENAI_API_KEY=sk-... cargo run --example basic -- path/to/lecture.wav

use std::path::Path;
use std::sync::Arc;

use mediascribe::{
    FfmpegTranscoder, OpenAiTranscriber, Pipeline, PipelineOutcome, TranscriptionConfig,
    TransientStore, UploadedArtifact,
};

#[tokio::main]
async fn main() -> mediascribe::Result<()> {
    let source = std::env::args()
        .nth(1)
        .expect("usage: basic <media-file>");
    let api_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set");

    let store = TransientStore::new(std::env::temp_dir().join("mediascribe-example"));
    store.ensure_dir().await?;

    // The pipeline deletes its input, so hand it a copy.
    let source = Path::new(&source);
    let extension = source.extension().and_then(|e| e.to_str());
    let copy = store.artifact_path("file", extension);
    let size = tokio::fs::copy(source, &copy).await?;
    let filename = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let pipeline = Pipeline::new(
        store,
        Arc::new(FfmpegTranscoder::default()),
        Arc::new(OpenAiTranscriber::new(TranscriptionConfig::new(api_key))?),
    );

    match pipeline
        .run(Some(UploadedArtifact::new(copy, filename, "audio/*", size)))
        .await
    {
        PipelineOutcome::Success(result) => println!("{}", result.text),
        PipelineOutcome::Failure(failure) => eprintln!("{failure}"),
    }

    Ok(())
}
