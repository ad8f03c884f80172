//! Router assembly: grading relay, session WebSocket, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - session WebSocket at `/ws`
/// - grading relay at `/api/assess/{voice,text}`
/// - health, catalog and LLM connectivity probe under `/api`
/// - learner UI from `static_dir` with index fallback
/// - CORS (allow any origin/method/headers) and per-request trace spans
pub fn build_router(state: Arc<AppState>, static_dir: &str) -> Router {
    let index = format!("{}/index.html", static_dir.trim_end_matches('/'));
    let static_service = ServeDir::new(static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(index));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/health", get(http::http_health))
        .route("/api/catalog", get(http::http_catalog))
        .route("/api/assess/voice", post(http::http_assess_voice))
        .route("/api/assess/text", post(http::http_assess_text))
        .route("/api/test-llm", get(http::http_test_llm))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}
