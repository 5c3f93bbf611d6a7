mod auth;
mod config;

use anyhow::Context;
use auth::TokenStore;
use axum::{Router, middleware};
use clap::Parser;
use pkgr_http::{AppState, create_router};
use pkgr_runtime::{HttpFetcher, MemoryPackageService, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pkgr-server", version, about = "Serve the pkgr package endpoints")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "PKGR_CONFIG")]
    config: Option<PathBuf>,

    /// Override `server.bind` from the config.
    #[arg(long)]
    bind: Option<String>,
}

/// The package routes behind token auth and request tracing.
fn build_app(state: AppState, tokens: Arc<TokenStore>) -> Router {
    create_router(state)
        .layer(middleware::from_fn_with_state(tokens, auth::authenticate))
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        cfg.server.bind = bind;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log.filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let tokens = Arc::new(TokenStore::from_config(&cfg.auth));
    if tokens.is_empty() {
        tracing::warn!("No API tokens configured; apply requests will be rejected");
    }

    let engine = Arc::new(MemoryPackageService::new());
    let fetcher = Arc::new(HttpFetcher::new(cfg.remote.timeout())?);
    let app = build_app(AppState::new(Orchestrator::new(engine, fetcher)), tokens);

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.bind))?;
    tracing::info!(bind = %cfg.server.bind, "pkgr-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("pkgr-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
