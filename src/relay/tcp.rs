//! Bidirectional TCP splice for CONNECT sessions

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::metrics::METRICS;

use super::read_some;

/// Splice bytes between the client and the upstream until either side
/// reaches EOF, errors, or idles out. First EOF or error on either side ends
/// the relay for both directions; both sockets are closed on return.
///
/// Returns (client-to-upstream, upstream-to-client) byte counts.
pub async fn tcp_splice(
    client: &mut TcpStream,
    mut upstream: TcpStream,
    chunk_size: usize,
    idle: Option<Duration>,
) -> (u64, u64) {
    let (mut client_read, mut client_write) = client.split();
    let (mut upstream_read, mut upstream_write) = upstream.split();

    let up = AtomicU64::new(0);
    let down = AtomicU64::new(0);

    let client_to_upstream = async {
        let mut buf = vec![0u8; chunk_size];
        loop {
            match read_some(&mut client_read, &mut buf, idle).await {
                Ok(0) => break,
                Ok(n) => {
                    if upstream_write.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                    up.fetch_add(n as u64, Ordering::Relaxed);
                    METRICS.bytes_up(n as u64);
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    METRICS.timeout();
                    debug!("Client side idle timeout");
                    break;
                }
                Err(_) => break,
            }
        }
    };

    let upstream_to_client = async {
        let mut buf = vec![0u8; chunk_size];
        loop {
            match read_some(&mut upstream_read, &mut buf, idle).await {
                Ok(0) => break,
                Ok(n) => {
                    if client_write.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                    down.fetch_add(n as u64, Ordering::Relaxed);
                    METRICS.bytes_down(n as u64);
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    METRICS.timeout();
                    debug!("Upstream side idle timeout");
                    break;
                }
                Err(_) => break,
            }
        }
    };

    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }

    (up.load(Ordering::Relaxed), down.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (accepted, _) = listener.accept().await.unwrap();
        (accepted, connect.await.unwrap())
    }

    #[tokio::test]
    async fn splice_forwards_both_directions() {
        let (client_far, client_near) = tcp_pair().await;
        let (upstream_near, mut upstream_far) = tcp_pair().await;

        let relay = tokio::spawn(async move {
            let mut client = client_near;
            tcp_splice(&mut client, upstream_near, 4096, None).await
        });

        let mut client_far = client_far;
        client_far.write_all(b"to-upstream").await.unwrap();

        let mut buf = [0u8; 11];
        upstream_far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"to-upstream");

        upstream_far.write_all(b"to-client").await.unwrap();
        let mut buf = [0u8; 9];
        client_far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"to-client");

        // Client EOF tears the relay down.
        drop(client_far);
        let (up, down) = relay.await.unwrap();
        assert_eq!(up, 11);
        assert_eq!(down, 9);
    }

    #[tokio::test]
    async fn upstream_eof_closes_client_side() {
        let (mut client_far, client_near) = tcp_pair().await;
        let (upstream_near, upstream_far) = tcp_pair().await;

        let relay = tokio::spawn(async move {
            let mut client = client_near;
            tcp_splice(&mut client, upstream_near, 4096, None).await
        });

        drop(upstream_far);
        relay.await.unwrap();

        // The relay released the client socket; reads see EOF.
        let mut buf = [0u8; 1];
        assert_eq!(client_far.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn idle_timeout_ends_the_splice() {
        let (_client_far, client_near) = tcp_pair().await;
        let (upstream_near, _upstream_far) = tcp_pair().await;

        let mut client = client_near;
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            tcp_splice(
                &mut client,
                upstream_near,
                4096,
                Some(Duration::from_millis(50)),
            ),
        )
        .await;
        assert!(result.is_ok());
    }
}
