//! # voxweave-server
//!
//! axum routes over a [`TtsService`]. Errors are answered as
//! `{status: "generate-failure", error_kind, message}` with a status code
//! chosen from the error kind.

pub mod error;
pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use voxweave::TtsService;

pub use error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub service: TtsService,
    /// Prefix for artifact links in responses.
    pub base_url: String,
}

impl AppState {
    pub fn new(service: TtsService) -> Self {
        let base_url = service.config().public_base_url();
        Self { service, base_url }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/tts-generate", post(handlers::tts_generate))
        .route(
            "/api/tts-generate-streaming",
            get(handlers::tts_generate_streaming).post(handlers::tts_generate_streaming_form),
        )
        .route("/api/generate", post(handlers::generate))
        .route("/api/previewvoice/", post(handlers::preview_voice))
        .route("/api/v1/tts", post(handlers::tts_v1))
        .route("/api/voices", get(handlers::voices))
        .route("/audio/{filename}", get(handlers::audio))
        .route("/audiocache/{filename}", get(handlers::audio_cache))
        .route("/api/lowvramsetting", post(handlers::low_vram_setting))
        .route("/api/currentsettings", get(handlers::current_settings))
        .route("/api/ready", get(|| async { "Ready" }))
        .route("/ready", get(|| async { "Ready endpoint" }))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
