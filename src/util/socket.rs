//! Socket construction and tuning

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the SOCKS5 listening socket with an explicit accept backlog.
pub fn create_tcp_listener(addr: SocketAddr, backlog: u32) -> Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .context("Failed to create listener socket")?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("Failed to bind {addr}"))?;
    socket
        .listen(backlog as i32)
        .context("Failed to listen")?;

    TcpListener::from_std(socket.into()).context("Failed to register listener with the runtime")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listener_binds_ephemeral_port() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = create_tcp_listener(addr, 16).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
