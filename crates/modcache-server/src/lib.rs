//! # modcache-server
//!
//! The HTTP service around [`modcache_core`]: binds the configured modules,
//! sources, and downloads surfaces from a [`modcache_core::Config`] into a
//! running `axum` server.
//!
//! - [`state`] — builds the shared [`state::AppState`] from a config
//! - [`dispatcher`] — the module-protocol HTTP surface and reserved paths
//! - [`downloads`] — the generic-artifacts surface under `downloads_prefix`
//! - [`dashboard`] — the `GET /` status page
//! - [`default_proxy`] — queries the fall-through proxy's `/@latest`
//! - [`content_type`] — the fixed content-type table for stored files
//! - [`logging`] — installs the `tracing` subscriber from `log_level`
//! - [`request_id`] — per-request id attached to the tracing span

/// The fixed `Content-Type` table for module-protocol responses.
pub mod content_type;
/// Renders the `GET /` status page.
pub mod dashboard;
/// Queries the configured default proxy for a module's latest version.
pub mod default_proxy;
/// The module-protocol HTTP surface and reserved paths.
pub mod dispatcher;
/// The generic-artifacts download surface.
pub mod downloads;
/// Logging initialization.
pub mod logging;
/// Per-request identifiers attached to the tracing span.
pub mod request_id;
/// Shared, request-handling state built once at startup.
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

/// `modcache-server <config>` — the proxy takes no flags, only the path to
/// its JSON configuration file.
#[derive(Parser, Debug)]
#[command(name = "modcache-server")]
#[command(about = "Caching module proxy for a dependency-management protocol", long_about = None)]
pub struct Cli {
    /// Path to the service's JSON configuration file.
    pub config: PathBuf,
}

/// Loads the configuration named on the command line, builds the service,
/// and serves until a shutdown signal is received.
///
/// # Errors
///
/// Returns an error if the configuration fails to load or validate, or if
/// any configured source/module/download fails to construct.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config =
        modcache_core::Config::load(&cli.config).with_context(|| "unable to load config")?;

    logging::init(&config.log_level).with_context(|| "unable to initialize logging")?;

    let addr = config.addr.clone();
    let app_state = Arc::new(state::AppState::build(config).with_context(|| "unable to build service")?);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("unable to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, dispatcher::router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .with_context(|| "server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        else {
            return;
        };
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutting down");
}
