use catalog_sync::catalog::coordinator::SyncCoordinator;
use catalog_sync::catalog::handlers::routes;
use catalog_sync::config::{IndexBackend, Settings};
use catalog_sync::search::client::IndexClient;
use catalog_sync::search::memory::MemoryIndex;
use catalog_sync::search::sonic::SonicClient;
use catalog_sync::storage::memory::RecordStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut bind_override: Option<SocketAddr> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "--bind" if i + 1 >= args.len() => {
                eprintln!("Usage: {} [--config <file>] [--bind <addr:port>]", args[0]);
                std::process::exit(1);
            }
            "--config" => {
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--bind" => {
                bind_override = Some(args[i + 1].parse()?);
                i += 2;
            }
            other => {
                tracing::warn!("Ignoring unknown argument {}", other);
                i += 1;
            }
        }
    }

    let settings = Settings::load(config_path.as_deref())?;
    let bind_addr: SocketAddr = match bind_override {
        Some(addr) => addr,
        None => settings.http.bind.parse()?,
    };

    // 1. Search index:
    let index: Arc<dyn IndexClient> = match settings.index.backend {
        IndexBackend::Sonic => {
            tracing::info!(
                "Connecting to Sonic at {}:{}",
                settings.index.host,
                settings.index.port
            );
            Arc::new(SonicClient::connect(settings.sonic_options()).await?)
        }
        IndexBackend::Memory => {
            tracing::warn!("Using the in-memory index, search data is lost on restart");
            Arc::new(MemoryIndex::new())
        }
    };

    // 2. Record store + coordinator:
    let store = Arc::new(RecordStore::new());
    let coordinator = Arc::new(SyncCoordinator::new(
        store,
        index,
        settings.namespace(),
        settings.coordinator_settings(),
    ));

    // 3. HTTP Router:
    let app = routes(
        coordinator.clone(),
        &settings.catalog.entity,
        settings.catalog.create_policy,
    );

    // 4. Start HTTP server:
    tracing::info!(
        "Serving /{} on {} (collection={}, bucket={})",
        settings.catalog.entity,
        bind_addr,
        settings.catalog.collection,
        settings.catalog.bucket
    );
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 5. Release index connections:
    coordinator.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
