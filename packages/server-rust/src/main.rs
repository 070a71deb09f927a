//! Quakefeed server binary.
//!
//! # Environment Variables
//!
//! - `QUAKEFEED_CURSOR_SECRET`: required cursor signing secret
//! - `RUST_LOG`: log filter, defaults to `quakefeed_server=info,tower_http=info`

use std::sync::Arc;

use clap::Parser;
use quakefeed_core::CursorCodec;
use quakefeed_server::{Cli, LogFormat, MemoryEventStore, NetworkModule, QueryEngine, ServerConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::try_from(Cli::parse())?;
    init_tracing(config.log_format);

    let store = MemoryEventStore::with_config(config.store.clone());
    if let Some(path) = &config.seed_file {
        let loaded = store.load_seed_file(path)?;
        tracing::info!(path = %path.display(), loaded, "Seed events loaded");
    }
    tracing::info!(
        events = store.len(),
        partitions = store.partition_count(),
        "Event store ready"
    );

    let codec = Arc::new(CursorCodec::new(config.cursor_secret));
    let engine = Arc::new(QueryEngine::new(Arc::new(store), codec));

    let mut module = NetworkModule::new(config.network, engine);
    let port = module.start().await?;
    tracing::info!(port, "Starting Quakefeed server");

    module.serve(shutdown_signal()).await
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "quakefeed_server=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
