//! HTTP server wiring for the raport backend.
//!
//! Mounts [`raport_api::api_router`] under `/api` with request tracing, and
//! holds the runtime configuration shared by the binary's subcommands.

use std::{path::PathBuf, sync::Arc};

use axum::{Json, Router, routing::get};
use raport_core::store::RaportStore;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `config.toml` and `RAPORT_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:          String,
  #[serde(default = "default_port")]
  pub port:          u16,
  #[serde(default = "default_database_path")]
  pub database_path: PathBuf,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_database_path() -> PathBuf { PathBuf::from("raport.db") }

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full application: `/health` plus the JSON API under `/api`.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: RaportStore + 'static,
{
  Router::new()
    .route("/health", get(health))
    .nest("/api", raport_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> { Json(json!({ "success": true, "status": "ok" })) }

// ─── Integration tests ────────────────────────────────────────────────────────
