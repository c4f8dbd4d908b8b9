use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use upload_gateway::storage::GcsStore;
use upload_gateway::{AppState, Config, StorageAccessor, build_router, metrics, server};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting Upload Gateway v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        bucket = %config.bucket_name,
        "Configuration loaded"
    );

    if !std::path::Path::new(&config.service_account_path).exists() {
        error!(
            "Service account file not found at: {}. \
             Place your service-account-key.json in the project root or set GCS_SERVICE_ACCOUNT.",
            config.service_account_path
        );
        return Err(exitcode::CONFIG);
    }

    // Install the metrics recorder before serving begins
    let metrics_handle = metrics::init_metrics().map_err(|e| {
        error!("Failed to initialize metrics: {e}");
        exitcode::CONFIG
    })?;

    // Initialize storage accessors and verify the buckets are reachable;
    // an unreachable backend is fatal at startup, never mid-serve
    let primary = connect_bucket(&config.bucket_name, &config.service_account_path).await?;

    let dev: Option<Arc<dyn StorageAccessor>> = match &config.dev_bucket_name {
        Some(bucket) => Some(connect_bucket(bucket, &config.service_account_path).await?),
        None => None,
    };

    if config.auth_enabled() {
        info!("Authentication enabled");
        if config.ip_allowlist_enabled() {
            info!(allowed_ips = ?config.allowed_ips, "IP allowlist enabled");
        }
    } else {
        warn!("WARNING: No API key configured - authentication disabled!");
    }

    // Build application state and router
    let state = AppState::new(primary, dev, config.clone(), metrics_handle);
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /health     - Health check");
    info!("  GET  /metrics    - Prometheus metrics");
    info!("  POST /upload     - Upload an image (multipart field 'image')");
    info!("  POST /signedurl  - Generate a pre-signed upload URL");

    server::serve_with_grace(listener, app, config.shutdown_grace)
        .await
        .map_err(|e| {
            error!("Server error: {e}");
            exitcode::SOFTWARE
        })?;

    info!("Server shutdown complete");
    Ok(())
}

/// Connect a bucket accessor and verify it is reachable.
async fn connect_bucket(
    bucket: &str,
    service_account_path: &str,
) -> Result<Arc<GcsStore>, exitcode::ExitCode> {
    let store = GcsStore::connect(bucket, service_account_path).map_err(|e| {
        error!("Failed to initialize GCS client: {e}");
        exitcode::CONFIG
    })?;

    store.verify_access().await.map_err(|e| {
        error!("Storage backend unavailable: {e}");
        exitcode::UNAVAILABLE
    })?;

    Ok(Arc::new(store))
}
