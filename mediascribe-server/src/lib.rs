//! HTTP front end for [`mediascribe`].
//!
//! `POST /transcribe` takes a multipart upload in the `file` field and
//! answers with the transcript; `GET /check-ffmpeg` reports whether the
//! transcoder is usable; everything else is served from the public directory.

pub mod config;
pub mod handlers;
pub mod observability;
pub mod router;
pub mod state;
pub mod upload;

pub use config::{LogFormat, Settings};
pub use router::create_router;
pub use state::AppState;
