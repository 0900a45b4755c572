//! UDP association relay
//!
//! One relay socket serves both directions: datagrams from the client are
//! unwrapped and forwarded, datagrams from anyone else are wrapped and sent
//! back to the client. The association lives until the TCP control channel
//! closes, the socket errors, or the idle timeout fires.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, warn};

use crate::metrics::METRICS;
use crate::protocol::datagram;
use crate::resolver::{resolve_target, Resolver};

/// Maximum size of a relayed datagram including the SOCKS header.
const MAX_DATAGRAM: usize = 65536;

/// Relay for one UDP association
pub struct UdpRelay {
    socket: UdpSocket,
    client_ip: IpAddr,
    resolver: Arc<dyn Resolver>,
    idle: Option<Duration>,
}

impl UdpRelay {
    /// Create a relay over an already-bound socket.
    pub fn new(
        socket: UdpSocket,
        client_ip: IpAddr,
        resolver: Arc<dyn Resolver>,
        idle: Option<Duration>,
    ) -> Self {
        Self {
            socket,
            client_ip,
            resolver,
            idle,
        }
    }

    /// Get the relay socket's bound address
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Run the datagram loop until the control channel closes, the socket
    /// errors, or the idle timeout fires.
    ///
    /// Returns (client-to-upstream, upstream-to-client) payload byte counts.
    pub async fn run(self, control: &mut TcpStream) -> (u64, u64) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        // The first datagram from the control connection's IP pins the
        // client's reply address; later datagrams must match it exactly.
        let mut client: Option<SocketAddr> = None;
        let (mut up, mut down) = (0u64, 0u64);

        loop {
            tokio::select! {
                received = recv_datagram(&self.socket, &mut buf, self.idle) => {
                    let (len, src) = match received {
                        Ok(pair) => pair,
                        Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                            METRICS.timeout();
                            debug!("UDP association idle timeout");
                            break;
                        }
                        Err(e) => {
                            debug!(error = %e, "UDP receive error");
                            break;
                        }
                    };

                    if from_client(src, client, self.client_ip) {
                        client = Some(src);
                        up += self.forward(&buf[..len]).await;
                    } else if let Some(client_addr) = client {
                        down += self.reply(src, &buf[..len], client_addr).await;
                    } else {
                        debug!(%src, "Datagram from unknown source dropped");
                    }
                }
                _ = wait_for_close(control) => {
                    debug!("Control channel closed, ending UDP association");
                    break;
                }
            }
        }

        (up, down)
    }

    /// Unwrap a client datagram and forward its payload to the destination.
    async fn forward(&self, data: &[u8]) -> u64 {
        let dg = match datagram::parse(data) {
            Ok(dg) => dg,
            Err(e) => {
                debug!(error = %e, "Malformed client datagram dropped");
                return 0;
            }
        };
        if dg.frag != 0 {
            warn!(frag = dg.frag, "Fragmented datagram dropped");
            return 0;
        }

        let target = match resolve_target(self.resolver.as_ref(), &dg.addr, dg.port).await {
            Ok(target) => target,
            Err(e) => {
                debug!(dst = %dg.addr, error = %e, "Datagram destination unresolvable");
                return 0;
            }
        };

        match self.socket.send_to(&dg.payload, target).await {
            Ok(sent) => {
                METRICS.datagram_out();
                sent as u64
            }
            Err(e) => {
                debug!(%target, error = %e, "Datagram forward failed");
                0
            }
        }
    }

    /// Wrap an upstream datagram and send it back to the client.
    async fn reply(&self, src: SocketAddr, payload: &[u8], client: SocketAddr) -> u64 {
        let packet = datagram::pack(&src, payload);
        match self.socket.send_to(&packet, client).await {
            Ok(_) => {
                METRICS.datagram_in();
                payload.len() as u64
            }
            Err(e) => {
                debug!(%client, error = %e, "Datagram reply failed");
                0
            }
        }
    }
}

fn from_client(src: SocketAddr, pinned: Option<SocketAddr>, client_ip: IpAddr) -> bool {
    match pinned {
        Some(addr) => src == addr,
        None => src.ip() == client_ip,
    }
}

async fn recv_datagram(
    socket: &UdpSocket,
    buf: &mut [u8],
    idle: Option<Duration>,
) -> io::Result<(usize, SocketAddr)> {
    match idle {
        Some(limit) => match tokio::time::timeout(limit, socket.recv_from(buf)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "udp idle timeout")),
        },
        None => socket.recv_from(buf).await,
    }
}

/// Resolves when the peer closes the TCP control channel.
async fn wait_for_close(stream: &mut TcpStream) {
    let mut buf = [0u8; 1];
    let _ = stream.read(&mut buf).await;
}
