use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use mediascribe_server::observability::init_tracing;
use mediascribe_server::{create_router, AppState, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env has to be loaded before clap reads its env fallbacks
    dotenvy::dotenv().ok();
    let settings = Settings::parse();

    init_tracing(settings.log_format);

    let state = AppState::from_settings(&settings).context("invalid configuration")?;
    let store = state.pipeline.store().clone();
    store.ensure_dir().await.with_context(|| {
        format!(
            "failed to create upload directory {}",
            store.dir().display()
        )
    })?;

    if settings.api_key().is_none() {
        warn!("OPENAI_API_KEY is not set, transcription requests will be rejected");
    }

    let addr = SocketAddr::new(settings.host, settings.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        %addr,
        upload_dir = %store.dir().display(),
        public_dir = %settings.public_dir.display(),
        model = %settings.model,
        language = %settings.language,
        "mediascribe server listening"
    );

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        match pipeline.probe().await {
            Ok(()) => info!("ffmpeg is installed and working"),
            Err(e) => {
                warn!(reason = %e, "ffmpeg is not available, uploads will fail until it is installed");
                warn!("install ffmpeg: `choco install ffmpeg` (Windows), `brew install ffmpeg` (macOS), `sudo apt install ffmpeg` (Linux)");
            }
        }
    });

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
