//! Discovery Cache gateway
//!
//! Serves the cached read path over HTTP, backed by the in-memory backend.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use discovery_cache::api::{create_router, AppState};
use discovery_cache::{spawn_sweeper, Backend, Config, DomainFetchers, InMemoryBackend};

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the backend (seeded from `SEED_FILE` when set)
/// 4. Create the domain fetchers and start the expiry sweeper
/// 5. Serve the router until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "discovery_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Discovery Cache gateway");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, page_size={}, port={}, sweep_interval={:?}",
        config.max_entries, config.page_size, config.server_port, config.sweep_interval
    );

    let backend: Arc<dyn Backend> = match &config.seed_file {
        Some(path) => Arc::new(InMemoryBackend::from_file(path)?),
        None => {
            warn!("SEED_FILE not set, starting with an empty backend");
            Arc::new(InMemoryBackend::default())
        }
    };

    let fetchers = DomainFetchers::new(backend, &config);
    let sweeper = spawn_sweeper(fetchers.clone(), config.sweep_interval);
    info!("Expiry sweeper started");

    let app = create_router(AppState::new(fetchers.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sweeper, fetchers))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then stops the background work.
async fn shutdown_signal(sweeper: JoinHandle<()>, fetchers: DomainFetchers) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    sweeper.abort();
    fetchers.shutdown();
    warn!("Sweeper aborted and coalescer timers cancelled");
}
