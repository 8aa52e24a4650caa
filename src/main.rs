//! QuizForge · Gamified Quiz Backend
//!
//! - Axum HTTP + WebSocket API for timed quiz attempts
//! - XP, badges and competition ranks kept in an in-process document store
//! - Optional PDF -> quiz generation through an OpenAI-compatible API
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables (a `.env` file is read if present):
//!   PORT                 : u16 (default 3000)
//!   OPENAI_API_KEY       : enables PDF quiz generation if present
//!   OPENAI_BASE_URL      : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL    : moderation model, default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL  : generation model, default "gpt-4o"
//!   OPENAI_TIMEOUT_SECS  : per-request HTTP timeout (default 60)
//!   QUIZ_CONFIG_PATH     : path to TOML config (prompts, tunables, optional quiz bank)
//!   UPLOAD_DIR           : where uploaded PDFs live while processed (default "uploads")
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod seeds;
mod store;
mod session;
mod timer;
mod scoring;
mod rank;
mod openai;
mod pdf;
mod generator;
mod ratelimit;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  dotenvy::dotenv().ok();
  telemetry::init_tracing();

  // Shared application state (document store, live sessions, model client, prompts).
  let state = Arc::new(AppState::from_env().await);

  // HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "quizforge", %addr, "HTTP server listening");
  // Client addresses feed the generation rate limiter.
  axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "quizforge", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "quizforge", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "quizforge", "Shutdown signal received");
}
