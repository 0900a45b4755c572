//! SOCKS5 TCP listener
//!
//! Accepts client connections and spawns one session task per connection.
//! The accept loop never waits on a session.

use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::auth::{CredentialProvider, StaticCredentials};
use crate::config::Config;
use crate::resolver::{Resolver, SystemResolver};
use crate::session::{SessionHandler, SessionManager};
use crate::util;

/// SOCKS5 proxy server
pub struct Server {
    /// Listening socket
    listener: TcpListener,
    /// Server configuration
    config: Arc<Config>,
    /// Live-session registry
    sessions: Arc<SessionManager>,
    /// Credential provider shared by all sessions
    credentials: Arc<dyn CredentialProvider>,
    /// Resolver shared by all sessions
    resolver: Arc<dyn Resolver>,
    /// Shutdown signal
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a server with the system resolver and the configured static
    /// credential pair.
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        let credentials = Arc::new(StaticCredentials::new(
            config.auth.username.clone(),
            config.auth.password.clone(),
        ));
        Self::with_providers(config, credentials, Arc::new(SystemResolver)).await
    }

    /// Create a server with injected credential and resolver providers.
    pub async fn with_providers(
        config: Arc<Config>,
        credentials: Arc<dyn CredentialProvider>,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self> {
        let sessions = SessionManager::new(config.relay.max_sessions);

        let listener = util::create_tcp_listener(config.server.bind_addr, config.server.backlog)
            .with_context(|| {
                format!(
                    "Failed to bind SOCKS5 listener to {}",
                    config.server.bind_addr
                )
            })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            listener,
            config,
            sessions,
            credentials,
            resolver,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Get the listener's bound address
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get current session count
    pub fn session_count(&self) -> usize {
        self.sessions.count()
    }

    /// Run the accept loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        info!(bind_addr = %self.local_addr()?, "Accepting SOCKS5 connections");

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, client_addr)) => {
                            if self.sessions.is_full() {
                                warn!(%client_addr, "Connection rejected: at capacity");
                                continue;
                            }

                            let handler = SessionHandler::new(
                                self.sessions.clone(),
                                self.credentials.clone(),
                                self.resolver.clone(),
                                self.config.clone(),
                            );

                            tokio::spawn(async move {
                                handler.handle(stream, client_addr).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Accept failed");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Accept loop stopping");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Gracefully shut down: stop accepting, signal sessions, wait for drain.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown");

        let _ = self.shutdown_tx.send(true);
        self.sessions.signal_shutdown();
        self.sessions.drain(Duration::from_secs(30)).await;

        info!("Server shutdown complete");
    }
}
