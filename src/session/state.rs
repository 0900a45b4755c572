//! Per-session state

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Create from raw u64
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Protocol position of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for the client greeting
    Greeting,
    /// Method selection sent
    MethodSent,
    /// Username/password sub-negotiation in progress
    Authenticating,
    /// Authenticated, awaiting the request frame
    Authenticated,
    /// CONNECT relay active
    RelayingTcp,
    /// UDP association active
    RelayingUdp,
    /// Session finished, sockets released
    Closed,
}

/// Per-session bookkeeping
#[derive(Debug)]
pub struct SessionState {
    /// Unique identifier
    pub id: SessionId,
    /// Client address
    pub client_addr: SocketAddr,
    /// Protocol position
    pub phase: SessionPhase,
    /// Session start time
    pub connected_at: Instant,
    /// Last activity time
    pub last_active: Instant,
    /// Bytes relayed client to upstream
    pub bytes_up: u64,
    /// Bytes relayed upstream to client
    pub bytes_down: u64,
}

impl SessionState {
    /// Create new session state
    pub fn new(id: SessionId, client_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id,
            client_addr,
            phase: SessionPhase::Greeting,
            connected_at: now,
            last_active: now,
            bytes_up: 0,
            bytes_down: 0,
        }
    }

    /// Move to a new protocol phase
    pub fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
        self.touch();
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Record relayed traffic
    pub fn record_traffic(&mut self, up: u64, down: u64) {
        self.bytes_up = self.bytes_up.saturating_add(up);
        self.bytes_down = self.bytes_down.saturating_add(down);
        self.touch();
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Check if the session entered a relay
    pub fn is_relaying(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::RelayingTcp | SessionPhase::RelayingUdp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_starts_in_greeting() {
        let addr: SocketAddr = "127.0.0.1:54321".parse().unwrap();
        let state = SessionState::new(SessionId::from_raw(7), addr);
        assert_eq!(state.phase, SessionPhase::Greeting);
        assert!(!state.is_relaying());
        assert_eq!(state.id.as_u64(), 7);
    }

    #[test]
    fn phase_transitions_track_relaying() {
        let addr: SocketAddr = "127.0.0.1:54321".parse().unwrap();
        let mut state = SessionState::new(SessionId::from_raw(1), addr);

        state.set_phase(SessionPhase::MethodSent);
        state.set_phase(SessionPhase::Authenticating);
        state.set_phase(SessionPhase::Authenticated);
        assert!(!state.is_relaying());

        state.set_phase(SessionPhase::RelayingTcp);
        assert!(state.is_relaying());

        state.set_phase(SessionPhase::Closed);
        assert!(!state.is_relaying());
    }

    #[test]
    fn traffic_accumulates_saturating() {
        let addr: SocketAddr = "127.0.0.1:54321".parse().unwrap();
        let mut state = SessionState::new(SessionId::from_raw(1), addr);

        state.record_traffic(100, 200);
        state.record_traffic(u64::MAX, 1);
        assert_eq!(state.bytes_up, u64::MAX);
        assert_eq!(state.bytes_down, 201);
    }

    #[test]
    fn session_id_displays_as_hex() {
        assert_eq!(SessionId::from_raw(0xAB).to_string(), "000000ab");
    }
}
