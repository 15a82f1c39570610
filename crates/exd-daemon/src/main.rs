//! exd-daemon entry point.
//!
//! This file is intentionally thin: it parses arguments, sets up tracing,
//! loads the layered configuration, wires the engine, and starts the HTTP
//! server plus the background fill poller. All route handlers live in
//! `routes.rs`; engine construction lives in `wiring.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use clap::Parser;
use exd_daemon::{routes, state::AppState, wiring};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[derive(Debug, Parser)]
#[command(name = "exd-daemon", about = "Trading execution engine daemon")]
struct Args {
    /// Configuration layers, merged in order (later files override).
    #[arg(long = "config", required = true)]
    config: Vec<std::path::PathBuf>,

    /// Override the bind address from the configuration.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file
    // does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let args = Args::parse();
    let loaded = exd_config::load_layered_yaml(&args.config)?;
    info!(config_hash = %loaded.config_hash, "configuration loaded");

    let engine = Arc::new(wiring::build_engine(&loaded.config).await?);
    engine.start().await.context("engine recovery failed")?;
    let poller = exd_engine::spawn_fill_poller(Arc::clone(&engine));

    let shared = Arc::new(AppState::new(Arc::clone(&engine)));
    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr: SocketAddr = match args.bind {
        Some(addr) => addr,
        None => loaded
            .config
            .daemon
            .bind_addr
            .parse()
            .context("invalid daemon.bind_addr")?,
    };
    info!("exd-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    engine.shutdown().await;
    poller.abort();

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
