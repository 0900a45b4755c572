//! socksd - entry point

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use socksd::{Config, Server, VERSION};

fn main() -> Result<()> {
    let config = load_config()?;
    socksd::util::init_tracing(&config.logging)?;

    info!(version = VERSION, "Starting socksd");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.effective_workers())
        .enable_all()
        .build()
        .context("Failed to build runtime")?;

    runtime.block_on(serve(Arc::new(config)))
}

/// Read the config file named on the command line, falling back to
/// `socksd.toml` and then to built-in defaults.
fn load_config() -> Result<Config> {
    match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            Config::load(&path).with_context(|| format!("Failed to load config from {:?}", path))
        }
        None => {
            let default = PathBuf::from("socksd.toml");
            if default.exists() {
                Config::load(&default).context("Failed to load config from socksd.toml")
            } else {
                Ok(Config::default())
            }
        }
    }
}

async fn serve(config: Arc<Config>) -> Result<()> {
    if config.metrics.enabled {
        socksd::metrics::init_metrics(&config.metrics)?;
        info!(bind_addr = %config.metrics.bind_addr, "Metrics endpoint started");
    }

    let server = Server::new(config.clone()).await?;

    info!(
        bind_addr = %server.local_addr()?,
        workers = config.server.effective_workers(),
        "SOCKS5 proxy listening"
    );

    // Run server with graceful shutdown
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "Server error");
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, draining sessions...");
            server.shutdown().await;
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
