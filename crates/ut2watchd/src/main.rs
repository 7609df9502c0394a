//! ut2watchd — the ut2watch daemon.
//!
//! Loads the config, registers the static servers, polls every registered
//! server over UDP and serves the results over HTTP until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! ut2watchd --config config.toml --http 0.0.0.0:8200 --root ./web/dist
//! ```

mod wiring;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ut2watch_api::{ApiState, build_router};
use ut2watch_core::WatchConfig;
use ut2watch_engine::QueryEngine;
use ut2watch_query::UdpQueryClient;
use ut2watch_state::{Registry, StateStore};

const DEFAULT_FILTER: &str = "info,ut2watchd=debug,ut2watch=debug";

#[derive(Parser)]
#[command(name = "ut2watchd", about = "UT2004 server status daemon")]
struct Cli {
    /// Config file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// HTTP listen address.
    #[arg(long, default_value = "0.0.0.0:8200")]
    http: SocketAddr,

    /// Directory served as the web frontend.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = WatchConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    run(cli, config).await
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli, config: WatchConfig) -> anyhow::Result<()> {
    info!(config = %cli.config.display(), "ut2watchd starting");

    // ── Initialize services ────────────────────────────────────

    let registry = Arc::new(Registry::new());
    let state = Arc::new(StateStore::new());

    let count = wiring::register_static(&registry, &config).await?;
    info!(servers = count, "static servers registered");

    let engine = Arc::new(
        QueryEngine::new(Arc::clone(&registry), Arc::clone(&state))
            .with_config(wiring::engine_config(&config)?),
    );

    let api = ApiState::new(Arc::clone(&registry), Arc::clone(&state))
        .with_dynamic(wiring::dynamic_registration(&config)?);
    if api.dynamic.tokens.is_empty() {
        info!("dynamic registration disabled (no tokens configured)");
    }
    let router = build_router(api, cli.root.as_deref());

    // ── HTTP server ────────────────────────────────────────────

    let shutdown = CancellationToken::new();
    let listener = tokio::net::TcpListener::bind(cli.http)
        .await
        .with_context(|| format!("failed to bind {}", cli.http))?;
    info!(addr = %cli.http, "http server listening");

    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        })
    };

    // Ctrl-C stops the HTTP server and the engine together.
    let signal = {
        let shutdown = shutdown.clone();
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                return;
            }
            info!("shutdown signal received");
            shutdown.cancel();
            engine.stop();
        })
    };

    // ── Query engine ───────────────────────────────────────────

    let bind = config.query.bind.clone();
    let result = engine.run(|| UdpQueryClient::new(&bind)).await;

    shutdown.cancel();
    signal.abort();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "http server error"),
        Err(e) => warn!(error = %e, "http server task failed"),
    }

    result.context("query engine failed")?;
    info!("ut2watchd stopped");
    Ok(())
}
