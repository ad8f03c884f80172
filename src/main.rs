//! Language Assessment Backend
//!
//! - Axum HTTP grading relay + WebSocket assessment sessions
//! - Optional LLM grading through an OpenAI-compatible API (env variables)
//! - Static learner UI fallback (STATIC_DIR/index.html)
//!
//! Important env variables:
//!   PORT                      : u16 (default 5001)
//!   STATIC_DIR                : learner UI directory (default "./public")
//!   OPENAI_API_KEY            : enables LLM grading if present
//!   OPENAI_BASE_URL           : default "https://api.openai.com/v1"
//!   OPENAI_MODEL              : default "gpt-4o-mini"
//!   OPENAI_TIMEOUT_SECS       : default 20
//!   OPENAI_MAX_TOKENS         : optional completion cap (unset = provider default)
//!   ASSESS_CONFIG_PATH        : path to TOML config (prompts + catalog + time limit)
//!   QUESTION_TIME_LIMIT_SECS  : per-question deadline (default 60)
//!   LOG_LEVEL                 : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT                : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod responses;
mod config;
mod seeds;
mod openai;
mod grader;
mod flow;
mod session;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let (state, settings) = AppState::from_env()?;
  let app = build_router(Arc::new(state), &settings.static_dir);

  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "assess_backend", %addr, static_dir = %settings.static_dir, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  info!(target: "assess_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "assess_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "assess_backend", "Shutdown signal received");
}
