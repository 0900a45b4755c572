//! Session registry
//!
//! Tracks live sessions, gates capacity, and fans out the shutdown signal.

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::state::{SessionId, SessionPhase, SessionState};
use crate::metrics::METRICS;

/// Tracks all active sessions
pub struct SessionManager {
    /// Live session states
    sessions: DashMap<SessionId, SessionState>,
    /// ID generator
    next_id: AtomicU64,
    /// Maximum concurrent sessions
    max_sessions: usize,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(max_sessions: usize) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new(Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_sessions,
            shutdown_tx,
        })
    }

    /// Register a new session, unless the server is at capacity.
    pub fn register(&self, client_addr: SocketAddr) -> Option<SessionId> {
        if self.sessions.len() >= self.max_sessions {
            METRICS.session_rejected();
            warn!(%client_addr, "Session rejected: at capacity");
            return None;
        }

        let id = SessionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sessions.insert(id, SessionState::new(id, client_addr));

        METRICS.session_opened();
        info!(session_id = %id, %client_addr, "Client connected");
        Some(id)
    }

    /// Move a session to a new protocol phase
    pub fn set_phase(&self, id: SessionId, phase: SessionPhase) {
        if let Some(mut state) = self.sessions.get_mut(&id) {
            state.set_phase(phase);
            debug!(session_id = %id, ?phase, "Session phase");
        }
    }

    /// Record relayed traffic for a session
    pub fn record_traffic(&self, id: SessionId, up: u64, down: u64) {
        if let Some(mut state) = self.sessions.get_mut(&id) {
            state.record_traffic(up, down);
        }
    }

    /// Unregister a session
    pub fn unregister(&self, id: SessionId) {
        if let Some((_, state)) = self.sessions.remove(&id) {
            METRICS.session_closed();
            info!(
                session_id = %id,
                client_addr = %state.client_addr,
                duration_secs = state.duration().as_secs_f64(),
                bytes_up = state.bytes_up,
                bytes_down = state.bytes_down,
                "Client disconnected"
            );
        }
    }

    /// Get current session count
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Check if at capacity
    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }

    /// Get shutdown receiver
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown to all sessions
    pub fn signal_shutdown(&self) {
        info!("Signaling shutdown to all sessions");
        let _ = self.shutdown_tx.send(());
    }

    /// Wait for in-flight sessions to finish, up to `timeout`.
    pub async fn drain(&self, timeout: Duration) {
        info!(sessions = self.count(), "Draining sessions");

        let start = std::time::Instant::now();
        while self.count() > 0 && start.elapsed() < timeout {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let remaining = self.count();
        if remaining > 0 {
            warn!(remaining, "Sessions still open after drain timeout");
        } else {
            info!("All sessions drained");
        }
    }
}
