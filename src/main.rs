//! gatekeep demo server.
//!
//! ```text
//!     Client ──▶ axum (trace, request id, limits, timeout)
//!                  │
//!                  ▼  spawn_blocking
//!              Dispatcher ── session ── route ── XSRF guard ── handler
//!                  │                                 │ failure
//!                  │                                 ▼
//!                  │                      classify → log → alert task
//!                  │                                 │
//!                  ◀──────── commit ◀── error handler (same sink)
//! ```
//!
//! Without `--config` the server starts in development mode with throwaway
//! signing keys.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;

use gatekeep::config::{load_config, AppConfig};
use gatekeep::lifecycle::signals::shutdown_on_signal;
use gatekeep::lifecycle::{build_dispatcher, Collaborators};
use gatekeep::observability::{logging, metrics};
use gatekeep::security::xsrf::generate_token;
use gatekeep::storage::{Key, StorageExt};
use gatekeep::tasks::ChannelTaskQueue;
use gatekeep::{AppError, AppServer, RouteTable, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "gatekeep", version, about = "Dispatch pipeline demo server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Deserialize, serde::Serialize)]
struct Note {
    title: String,
    #[serde(default)]
    body: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => development_config(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(
        app_id = %config.app.app_id,
        bind_address = %config.listener.bind_address,
        development = config.app.development,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );
    if cli.config.is_none() {
        tracing::warn!("No --config given; using development mode with ephemeral keys");
    }

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let (queue, mut queued) = ChannelTaskQueue::new();
    tokio::spawn(async move {
        while let Some(item) = queued.recv().await {
            tracing::info!(
                queue = %item.queue,
                path = %item.task.path,
                bytes = item.task.payload.len(),
                "Task ready for delivery"
            );
        }
    });

    let collaborators = Collaborators::in_memory(&config, Arc::new(queue));
    let dispatcher = build_dispatcher(&config, demo_routes()?, collaborators)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let server = AppServer::new(Arc::new(dispatcher), &config.listener, &config.timeouts);
    let stopped = shutdown.subscribe();
    let signals = Arc::clone(&shutdown);
    tokio::spawn(async move { shutdown_on_signal(&signals).await });

    server.run(listener, stopped).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn development_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.app.development = true;
    config.listener.bind_address = "127.0.0.1:8080".to_string();
    config.session.secret = URL_SAFE_NO_PAD.encode(generate_token(32));
    config.xsrf.secrets = vec![URL_SAFE_NO_PAD.encode(generate_token(32))];
    config
}

fn demo_routes() -> Result<RouteTable, Box<dyn Error>> {
    let mut routes = RouteTable::new();
    routes
        .handle("GET::/", |ctx| {
            let visits = ctx.session().get::<u64>("visits").unwrap_or(0) + 1;
            ctx.session_mut().insert("visits", visits)?;
            let body = serde_json::json!({ "visits": visits, "request_id": ctx.request_id() });
            ctx.emit_json(&body)
        })?
        .handle("::/_/health", |ctx| ctx.write(b"ok"))?
        .handle("POST::/_/notes", |ctx| {
            let note: Note = ctx
                .load_json()?
                .ok_or_else(|| AppError::with_message(axum::http::StatusCode::BAD_REQUEST, "empty body"))?;
            let id = uuid::Uuid::new_v4().to_string();
            ctx.storage().put_json(&Key::named("Note", id.as_str()), &note)?;
            ctx.set_status(axum::http::StatusCode::CREATED);
            ctx.emit_json(&serde_json::json!({ "id": id, "title": note.title }))
        })?
        .handle("ERROR::403", |ctx| {
            ctx.emit_json(&serde_json::json!({ "error": "forbidden" }))
        })?
        .handle("ERROR::404", |ctx| {
            let path = ctx.path();
            ctx.emit_json(&serde_json::json!({ "error": "not found", "path": path }))
        })?
        .handle("ERROR::500", |ctx| {
            let id = ctx.request_id().to_string();
            ctx.emit_json(&serde_json::json!({ "error": "internal error", "request_id": id }))
        })?;
    Ok(routes)
}
