use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handlers::{check_ffmpeg_handler, transcribe_handler};
use crate::state::AppState;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let body_limit = usize::try_from(state.upload_limit.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX);

    let mut router = Router::new()
        .route("/transcribe", post(transcribe_handler))
        .route("/check-ffmpeg", get(check_ffmpeg_handler))
        .layer(DefaultBodyLimit::max(body_limit));

    if let Some(dir) = &state.public_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router.layer(trace_layer).layer(cors).with_state(state)
}
