//! Byte relays for established sessions
//!
//! TCP splice for CONNECT and the datagram loop for UDP ASSOCIATE.

mod tcp;
mod udp;

pub use tcp::tcp_splice;
pub use udp::UdpRelay;

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Read into `buf`, failing with `TimedOut` if `idle` elapses first.
pub(crate) async fn read_some<R>(
    reader: &mut R,
    buf: &mut [u8],
    idle: Option<Duration>,
) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match idle {
        Some(limit) => match tokio::time::timeout(limit, reader.read(buf)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "relay idle timeout")),
        },
        None => reader.read(buf).await,
    }
}
