//! Per-connection SOCKS5 state machine
//!
//! Drives a session from greeting through authentication to the requested
//! relay. Every failure path releases the session's sockets; errors that can
//! still be answered on the control channel get a reply frame first.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, field, info, instrument, Span};

use crate::auth::{self, CredentialProvider};
use crate::config::Config;
use crate::metrics::METRICS;
use crate::protocol::{
    codec, zero_bnd_addr, Command, ProtocolError, Request, AUTH_NO_ACCEPTABLE, AUTH_USERPASS,
    CMD_BIND, REP_ATYP_NOT_SUPPORTED, REP_CMD_NOT_SUPPORTED, REP_CONN_REFUSED,
    REP_GENERAL_FAILURE, REP_HOST_UNREACHABLE, REP_SUCCESS,
};
use crate::relay::{tcp_splice, UdpRelay};
use crate::resolver::{resolve_target, Resolver};

use super::{SessionId, SessionManager, SessionPhase};

/// Errors that terminate a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("no acceptable authentication method")]
    NoAcceptableMethod,

    #[error("authentication failed for {username:?}")]
    AuthFailed { username: String },

    #[error("DNS resolution failed for {domain}: {source}")]
    DnsFailed { domain: String, source: io::Error },

    #[error("upstream connect to {target} failed: {source}")]
    ConnectFailed {
        target: SocketAddr,
        source: io::Error,
    },

    #[error("upstream connect to {target} timed out")]
    ConnectTimedOut { target: SocketAddr },

    #[error("UDP relay bind failed: {0}")]
    BindFailed(io::Error),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// SOCKS REP code for this error, when a reply frame can still be sent.
    ///
    /// Method-selection and auth failures already answered on the wire, and
    /// malformed frames get an abrupt close; both map to `None`.
    pub fn reply_code(&self) -> Option<u8> {
        match self {
            SessionError::Protocol(ProtocolError::UnsupportedCommand(_)) => {
                Some(REP_CMD_NOT_SUPPORTED)
            }
            SessionError::Protocol(ProtocolError::UnsupportedAddressType(_)) => {
                Some(REP_ATYP_NOT_SUPPORTED)
            }
            SessionError::DnsFailed { .. } => Some(REP_HOST_UNREACHABLE),
            SessionError::ConnectTimedOut { .. } => Some(REP_HOST_UNREACHABLE),
            SessionError::ConnectFailed { source, .. } => Some(match source.kind() {
                io::ErrorKind::ConnectionRefused => REP_CONN_REFUSED,
                io::ErrorKind::TimedOut => REP_HOST_UNREACHABLE,
                _ => REP_GENERAL_FAILURE,
            }),
            SessionError::BindFailed(_) => Some(REP_GENERAL_FAILURE),
            _ => None,
        }
    }
}

/// Handles a single accepted client connection.
pub struct SessionHandler {
    sessions: Arc<SessionManager>,
    credentials: Arc<dyn CredentialProvider>,
    resolver: Arc<dyn Resolver>,
    config: Arc<Config>,
}

impl SessionHandler {
    /// Create a new session handler
    pub fn new(
        sessions: Arc<SessionManager>,
        credentials: Arc<dyn CredentialProvider>,
        resolver: Arc<dyn Resolver>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            sessions,
            credentials,
            resolver,
            config,
        }
    }

    /// Run the session to completion, consuming the handler and the stream.
    #[instrument(skip_all, fields(session_id, client_addr = %client_addr))]
    pub async fn handle(self, mut stream: TcpStream, client_addr: SocketAddr) {
        let Some(id) = self.sessions.register(client_addr) else {
            return; // at capacity, drop the socket
        };
        Span::current().record("session_id", field::display(id));

        let _ = stream.set_nodelay(true);

        let mut shutdown_rx = self.sessions.subscribe_shutdown();
        let result = tokio::select! {
            result = self.run(id, &mut stream, client_addr) => result,
            _ = shutdown_rx.recv() => {
                debug!(session_id = %id, "Session closed by shutdown");
                Ok(())
            }
        };

        self.sessions.set_phase(id, SessionPhase::Closed);
        self.sessions.unregister(id);

        if let Err(e) = &result {
            if matches!(e, SessionError::Protocol(_)) {
                METRICS.protocol_error();
            }
            debug!(session_id = %id, error = %e, "Session ended with error");
        }
    }

    /// The linear state machine: greet, authenticate, dispatch the request.
    async fn run(
        &self,
        id: SessionId,
        stream: &mut TcpStream,
        client_addr: SocketAddr,
    ) -> Result<(), SessionError> {
        let methods = codec::read_greeting(stream).await?;

        let Some(method) = auth::select_method(&methods, self.config.auth.allow_anonymous) else {
            codec::write_method_selection(stream, AUTH_NO_ACCEPTABLE).await?;
            return Err(SessionError::NoAcceptableMethod);
        };
        codec::write_method_selection(stream, method).await?;
        self.sessions.set_phase(id, SessionPhase::MethodSent);

        if method == AUTH_USERPASS {
            self.sessions.set_phase(id, SessionPhase::Authenticating);
            let (username, password) = codec::read_userpass(stream).await?;
            let ok = self.credentials.verify(&username, &password);
            codec::write_auth_status(stream, ok).await?;
            if !ok {
                METRICS.auth_failure();
                return Err(SessionError::AuthFailed { username });
            }
        }
        self.sessions.set_phase(id, SessionPhase::Authenticated);

        let request = match codec::read_request(stream).await {
            Ok(request) => request,
            Err(e) => return Err(self.reject(stream, e.into()).await),
        };

        debug!(
            session_id = %id,
            command = ?request.command,
            dst = %request.addr,
            port = request.port,
            "Request"
        );

        match request.command {
            Command::Connect => self.connect(id, stream, &request).await,
            Command::UdpAssociate => self.udp_associate(id, stream, client_addr).await,
            Command::Bind => {
                let err = SessionError::Protocol(ProtocolError::UnsupportedCommand(CMD_BIND));
                Err(self.reject(stream, err).await)
            }
        }
    }

    /// Send the error's reply frame when one applies, then hand the error back.
    async fn reject(&self, stream: &mut TcpStream, err: SessionError) -> SessionError {
        if let Some(rep) = err.reply_code() {
            let _ = codec::write_reply(stream, rep, zero_bnd_addr()).await;
        }
        err
    }

    /// CONNECT: open the upstream, then splice until either side closes.
    async fn connect(
        &self,
        id: SessionId,
        stream: &mut TcpStream,
        request: &Request,
    ) -> Result<(), SessionError> {
        let target = match resolve_target(self.resolver.as_ref(), &request.addr, request.port).await
        {
            Ok(target) => target,
            Err(source) => {
                let err = SessionError::DnsFailed {
                    domain: request.addr.to_string(),
                    source,
                };
                return Err(self.reject(stream, err).await);
            }
        };

        let connect = TcpStream::connect(target);
        let upstream = match timeout(self.config.relay.connect_timeout(), connect).await {
            Ok(Ok(upstream)) => upstream,
            Ok(Err(source)) => {
                METRICS.connect_failed();
                let err = SessionError::ConnectFailed { target, source };
                return Err(self.reject(stream, err).await);
            }
            Err(_) => {
                METRICS.connect_failed();
                METRICS.timeout();
                let err = SessionError::ConnectTimedOut { target };
                return Err(self.reject(stream, err).await);
            }
        };
        let _ = upstream.set_nodelay(true);
        METRICS.connect_opened();

        codec::write_reply(stream, REP_SUCCESS, zero_bnd_addr()).await?;
        self.sessions.set_phase(id, SessionPhase::RelayingTcp);
        info!(session_id = %id, target = %target, "CONNECT established");

        let (up, down) = tcp_splice(
            stream,
            upstream,
            self.config.relay.chunk_size,
            self.config.relay.tcp_idle_timeout(),
        )
        .await;

        self.sessions.record_traffic(id, up, down);
        debug!(session_id = %id, bytes_up = up, bytes_down = down, "CONNECT relay finished");
        Ok(())
    }

    /// UDP ASSOCIATE: bind a relay socket, report its port, proxy datagrams
    /// until the control channel closes.
    async fn udp_associate(
        &self,
        id: SessionId,
        stream: &mut TcpStream,
        client_addr: SocketAddr,
    ) -> Result<(), SessionError> {
        let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
            Ok(socket) => socket,
            Err(e) => return Err(self.reject(stream, SessionError::BindFailed(e)).await),
        };

        let relay = UdpRelay::new(
            socket,
            client_addr.ip(),
            self.resolver.clone(),
            self.config.relay.udp_idle_timeout(),
        );
        let bound = relay.local_addr()?;

        let bnd = SocketAddr::from((Ipv4Addr::UNSPECIFIED, bound.port()));
        codec::write_reply(stream, REP_SUCCESS, bnd).await?;
        self.sessions.set_phase(id, SessionPhase::RelayingUdp);
        METRICS.association_opened();
        info!(session_id = %id, udp_port = bound.port(), "UDP association established");

        let (up, down) = relay.run(stream).await;

        self.sessions.record_traffic(id, up, down);
        debug!(session_id = %id, bytes_up = up, bytes_down = down, "UDP association finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_codes_follow_error_kind() {
        let err = SessionError::Protocol(ProtocolError::UnsupportedCommand(CMD_BIND));
        assert_eq!(err.reply_code(), Some(REP_CMD_NOT_SUPPORTED));

        let err = SessionError::Protocol(ProtocolError::UnsupportedAddressType(0x05));
        assert_eq!(err.reply_code(), Some(REP_ATYP_NOT_SUPPORTED));

        let err = SessionError::DnsFailed {
            domain: "example.invalid".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
        };
        assert_eq!(err.reply_code(), Some(REP_HOST_UNREACHABLE));

        let err = SessionError::ConnectFailed {
            target: "127.0.0.1:1".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.reply_code(), Some(REP_CONN_REFUSED));
    }

    #[test]
    fn already_answered_errors_have_no_reply() {
        assert_eq!(SessionError::NoAcceptableMethod.reply_code(), None);
        let err = SessionError::AuthFailed {
            username: "user".into(),
        };
        assert_eq!(err.reply_code(), None);
        let err = SessionError::Protocol(ProtocolError::Malformed("empty domain name"));
        assert_eq!(err.reply_code(), None);
    }
}
