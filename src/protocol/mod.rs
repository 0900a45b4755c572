//! SOCKS5 protocol implementation
//!
//! Wire-level types and constants for RFC 1928 (SOCKS5) and RFC 1929
//! (username/password sub-negotiation).

pub mod codec;
pub mod datagram;

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use thiserror::Error;

/// SOCKS protocol version
pub const SOCKS_VERSION: u8 = 0x05;
/// Username/password sub-negotiation version (RFC 1929)
pub const AUTH_VERSION: u8 = 0x01;
/// Reserved byte value
pub const RESERVED: u8 = 0x00;

/// Authentication methods
pub const AUTH_NONE: u8 = 0x00;
pub const AUTH_USERPASS: u8 = 0x02;
pub const AUTH_NO_ACCEPTABLE: u8 = 0xFF;

/// Commands
pub const CMD_CONNECT: u8 = 0x01;
pub const CMD_BIND: u8 = 0x02;
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

/// Address types
pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// Reply codes
pub const REP_SUCCESS: u8 = 0x00;
pub const REP_GENERAL_FAILURE: u8 = 0x01;
pub const REP_CONN_NOT_ALLOWED: u8 = 0x02;
pub const REP_NETWORK_UNREACHABLE: u8 = 0x03;
pub const REP_HOST_UNREACHABLE: u8 = 0x04;
pub const REP_CONN_REFUSED: u8 = 0x05;
pub const REP_TTL_EXPIRED: u8 = 0x06;
pub const REP_CMD_NOT_SUPPORTED: u8 = 0x07;
pub const REP_ATYP_NOT_SUPPORTED: u8 = 0x08;

/// Errors produced while reading or writing SOCKS5 frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported SOCKS version {0:#04x}")]
    BadVersion(u8),

    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    #[error("unsupported command {0:#04x}")]
    UnsupportedCommand(u8),

    #[error("unsupported address type {0:#04x}")]
    UnsupportedAddressType(u8),
}

/// Request commands the server understands at the wire level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Bind,
    UdpAssociate,
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            CMD_CONNECT => Ok(Command::Connect),
            CMD_BIND => Ok(Command::Bind),
            CMD_UDP_ASSOCIATE => Ok(Command::UdpAssociate),
            other => Err(ProtocolError::UnsupportedCommand(other)),
        }
    }
}

/// A destination address as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ipv4(Ipv4Addr),
    Domain(String),
    Ipv6(Ipv6Addr),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ipv4(ip) => ip.fmt(f),
            Address::Domain(name) => f.write_str(name),
            Address::Ipv6(ip) => ip.fmt(f),
        }
    }
}

/// A parsed SOCKS5 request (VER/CMD/RSV/ATYP/DST.ADDR/DST.PORT).
#[derive(Debug, Clone)]
pub struct Request {
    pub command: Command,
    pub addr: Address,
    pub port: u16,
}

/// The all-zero IPv4 bind tuple used in replies that carry no bound address.
pub fn zero_bnd_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes_map_to_variants() {
        assert_eq!(Command::try_from(CMD_CONNECT).unwrap(), Command::Connect);
        assert_eq!(Command::try_from(CMD_BIND).unwrap(), Command::Bind);
        assert_eq!(
            Command::try_from(CMD_UDP_ASSOCIATE).unwrap(),
            Command::UdpAssociate
        );
        assert!(matches!(
            Command::try_from(0x09),
            Err(ProtocolError::UnsupportedCommand(0x09))
        ));
    }

    #[test]
    fn address_displays_all_families() {
        assert_eq!(Address::Ipv4([10, 0, 0, 1].into()).to_string(), "10.0.0.1");
        assert_eq!(
            Address::Domain("example.com".into()).to_string(),
            "example.com"
        );
        assert_eq!(Address::Ipv6("::1".parse().unwrap()).to_string(), "::1");
    }
}
