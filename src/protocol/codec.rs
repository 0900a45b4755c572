//! Async frame readers and writers for the SOCKS5 control channel.
//!
//! All multi-byte integers are big-endian. Every read is length-checked; a
//! short read surfaces as `UnexpectedEof` and terminates the session.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{
    Address, Command, ProtocolError, Request, ATYP_DOMAIN, ATYP_IPV4, ATYP_IPV6, AUTH_VERSION,
    RESERVED, SOCKS_VERSION,
};

/// Read the client greeting, returning the offered method list.
pub async fn read_greeting<S>(stream: &mut S) -> Result<Vec<u8>, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;

    if header[0] != SOCKS_VERSION {
        return Err(ProtocolError::BadVersion(header[0]));
    }

    let mut methods = vec![0u8; header[1] as usize];
    stream.read_exact(&mut methods).await?;
    Ok(methods)
}

/// Write the method selection reply.
pub async fn write_method_selection<S>(stream: &mut S, method: u8) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&[SOCKS_VERSION, method]).await?;
    Ok(())
}

/// Read the RFC 1929 username/password sub-negotiation frame.
pub async fn read_userpass<S>(stream: &mut S) -> Result<(String, String), ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;

    if header[0] != AUTH_VERSION {
        return Err(ProtocolError::Malformed("bad auth sub-negotiation version"));
    }

    let mut username = vec![0u8; header[1] as usize];
    stream.read_exact(&mut username).await?;
    let username = String::from_utf8(username)
        .map_err(|_| ProtocolError::Malformed("username is not valid UTF-8"))?;

    let plen = stream.read_u8().await?;
    let mut password = vec![0u8; plen as usize];
    stream.read_exact(&mut password).await?;
    let password = String::from_utf8(password)
        .map_err(|_| ProtocolError::Malformed("password is not valid UTF-8"))?;

    Ok((username, password))
}

/// Write the auth status frame. A nonzero status means the session must close.
pub async fn write_auth_status<S>(stream: &mut S, ok: bool) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    let status = if ok { 0x00 } else { 0x01 };
    stream.write_all(&[AUTH_VERSION, status]).await?;
    Ok(())
}

/// Read a full SOCKS5 request: header, destination address, and port.
pub async fn read_request<S>(stream: &mut S) -> Result<Request, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;

    if header[0] != SOCKS_VERSION {
        return Err(ProtocolError::BadVersion(header[0]));
    }
    if header[2] != RESERVED {
        return Err(ProtocolError::Malformed("reserved byte must be zero"));
    }

    let command = Command::try_from(header[1])?;
    let addr = read_address(stream, header[3]).await?;
    let port = stream.read_u16().await?;

    Ok(Request { command, addr, port })
}

/// Read a destination address of the given ATYP.
pub async fn read_address<S>(stream: &mut S, atyp: u8) -> Result<Address, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    match atyp {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await?;
            Ok(Address::Ipv4(Ipv4Addr::from(octets)))
        }
        ATYP_DOMAIN => {
            let len = stream.read_u8().await?;
            if len == 0 {
                return Err(ProtocolError::Malformed("empty domain name"));
            }
            let mut name = vec![0u8; len as usize];
            stream.read_exact(&mut name).await?;
            let name = String::from_utf8(name)
                .map_err(|_| ProtocolError::Malformed("domain name is not valid UTF-8"))?;
            Ok(Address::Domain(name))
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            stream.read_exact(&mut octets).await?;
            Ok(Address::Ipv6(Ipv6Addr::from(octets)))
        }
        other => Err(ProtocolError::UnsupportedAddressType(other)),
    }
}

/// Write a reply frame with the given REP code and bound address.
pub async fn write_reply<S>(stream: &mut S, rep: u8, bnd: SocketAddr) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(22);
    buf.push(SOCKS_VERSION);
    buf.push(rep);
    buf.push(RESERVED);

    match bnd {
        SocketAddr::V4(addr) => {
            buf.push(ATYP_IPV4);
            buf.extend_from_slice(&addr.ip().octets());
        }
        SocketAddr::V6(addr) => {
            buf.push(ATYP_IPV6);
            buf.extend_from_slice(&addr.ip().octets());
        }
    }
    buf.extend_from_slice(&bnd.port().to_be_bytes());

    stream.write_all(&buf).await?;
    Ok(())
}
