//! RFC 1928 §7 UDP encapsulation.
//!
//! Every datagram between client and relay carries a header in front of the
//! payload: RSV(2) FRAG(1) ATYP(1) DST.ADDR(variable) DST.PORT(2).

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Address, ProtocolError, ATYP_DOMAIN, ATYP_IPV4, ATYP_IPV6};

/// A decoded UDP relay datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub frag: u8,
    pub addr: Address,
    pub port: u16,
    pub payload: Bytes,
}

/// Parse a SOCKS UDP datagram.
pub fn parse(data: &[u8]) -> Result<UdpDatagram, ProtocolError> {
    let mut buf = Bytes::copy_from_slice(data);
    if buf.remaining() < 4 {
        return Err(ProtocolError::Malformed("datagram header truncated"));
    }

    if buf.get_u16() != 0 {
        return Err(ProtocolError::Malformed("reserved bytes must be zero"));
    }
    let frag = buf.get_u8();
    let atyp = buf.get_u8();

    let addr = match atyp {
        ATYP_IPV4 => {
            if buf.remaining() < 4 {
                return Err(ProtocolError::Malformed("truncated IPv4 address"));
            }
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            Address::Ipv4(Ipv4Addr::from(octets))
        }
        ATYP_DOMAIN => {
            if !buf.has_remaining() {
                return Err(ProtocolError::Malformed("missing domain length"));
            }
            let len = buf.get_u8() as usize;
            if len == 0 {
                return Err(ProtocolError::Malformed("empty domain name"));
            }
            if buf.remaining() < len {
                return Err(ProtocolError::Malformed("truncated domain name"));
            }
            let name = String::from_utf8(buf.copy_to_bytes(len).to_vec())
                .map_err(|_| ProtocolError::Malformed("domain name is not valid UTF-8"))?;
            Address::Domain(name)
        }
        ATYP_IPV6 => {
            if buf.remaining() < 16 {
                return Err(ProtocolError::Malformed("truncated IPv6 address"));
            }
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            Address::Ipv6(Ipv6Addr::from(octets))
        }
        other => return Err(ProtocolError::UnsupportedAddressType(other)),
    };

    if buf.remaining() < 2 {
        return Err(ProtocolError::Malformed("missing port"));
    }
    let port = buf.get_u16();

    Ok(UdpDatagram {
        frag,
        addr,
        port,
        payload: buf,
    })
}

/// Pack a datagram carrying `payload` from the given source address.
///
/// FRAG is always zero; the header address names the peer the payload came
/// from so the client can demultiplex replies.
pub fn pack(src: &SocketAddr, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(22 + payload.len());
    buf.put_u16(0); // RSV
    buf.put_u8(0); // FRAG
    match src {
        SocketAddr::V4(addr) => {
            buf.put_u8(ATYP_IPV4);
            buf.put_slice(&addr.ip().octets());
        }
        SocketAddr::V6(addr) => {
            buf.put_u8(ATYP_IPV6);
            buf.put_slice(&addr.ip().octets());
        }
    }
    buf.put_u16(src.port());
    buf.put_slice(payload);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_inverts_pack_for_ipv4() {
        let src: SocketAddr = "192.0.2.10:5300".parse().unwrap();
        let packet = pack(&src, b"hello");

        let datagram = parse(&packet).unwrap();
        assert_eq!(datagram.frag, 0);
        assert_eq!(datagram.addr, Address::Ipv4("192.0.2.10".parse().unwrap()));
        assert_eq!(datagram.port, 5300);
        assert_eq!(&datagram.payload[..], b"hello");
    }

    #[test]
    fn parse_inverts_pack_for_ipv6() {
        let src: SocketAddr = "[2001:db8::1]:53".parse().unwrap();
        let packet = pack(&src, b"payload");

        let datagram = parse(&packet).unwrap();
        assert_eq!(datagram.addr, Address::Ipv6("2001:db8::1".parse().unwrap()));
        assert_eq!(datagram.port, 53);
        assert_eq!(&datagram.payload[..], b"payload");
    }

    #[test]
    fn parse_domain_header() {
        let mut packet = vec![0x00, 0x00, 0x00, 0x03, 0x09];
        packet.extend_from_slice(b"localhost");
        packet.extend_from_slice(&1234u16.to_be_bytes());
        packet.extend_from_slice(b"ping");

        let datagram = parse(&packet).unwrap();
        assert_eq!(datagram.addr, Address::Domain("localhost".into()));
        assert_eq!(datagram.port, 1234);
        assert_eq!(&datagram.payload[..], b"ping");
    }

    #[test]
    fn parse_keeps_frag_byte() {
        let packet = [0x00, 0x00, 0x02, 0x01, 127, 0, 0, 1, 0x00, 0x35, 0xAA];
        assert_eq!(parse(&packet).unwrap().frag, 2);
    }

    #[test]
    fn parse_allows_empty_payload() {
        let packet = [0x00, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x35];
        assert!(parse(&packet).unwrap().payload.is_empty());
    }

    #[test]
    fn parse_rejects_nonzero_reserved() {
        let packet = [0x00, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x35];
        assert!(matches!(
            parse(&packet),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn parse_rejects_truncated_headers() {
        assert!(parse(&[0x00, 0x00, 0x00]).is_err());
        assert!(parse(&[0x00, 0x00, 0x00, 0x01, 127, 0]).is_err());
        assert!(parse(&[0x00, 0x00, 0x00, 0x03, 0x05, b'a', b'b']).is_err());
        assert!(parse(&[0x00, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x00]).is_err());
    }

    #[test]
    fn parse_rejects_unknown_atyp() {
        let packet = [0x00, 0x00, 0x00, 0x02, 127, 0, 0, 1, 0x00, 0x35];
        assert!(matches!(
            parse(&packet),
            Err(ProtocolError::UnsupportedAddressType(0x02))
        ));
    }
}
