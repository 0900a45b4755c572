//! Destination address resolution.
//!
//! The session controller receives its resolver as an injected dependency so
//! lookups can be replaced wholesale (tests, split-horizon DNS).

use std::io;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;

use crate::protocol::Address;

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve a domain name to a single IP address, preferring IPv4.
    async fn resolve(&self, domain: &str) -> io::Result<IpAddr>;
}

/// Resolver backed by the operating system via `tokio::net::lookup_host`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, domain: &str) -> io::Result<IpAddr> {
        let mut fallback = None;
        for addr in tokio::net::lookup_host((domain, 0)).await? {
            if addr.is_ipv4() {
                return Ok(addr.ip());
            }
            fallback.get_or_insert(addr.ip());
        }
        fallback.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {domain}"),
            )
        })
    }
}

/// Turn a request destination into a connectable socket address.
pub async fn resolve_target(
    resolver: &dyn Resolver,
    addr: &Address,
    port: u16,
) -> io::Result<SocketAddr> {
    match addr {
        Address::Ipv4(ip) => Ok(SocketAddr::new(IpAddr::V4(*ip), port)),
        Address::Ipv6(ip) => Ok(SocketAddr::new(IpAddr::V6(*ip), port)),
        Address::Domain(name) => Ok(SocketAddr::new(resolver.resolve(name).await?, port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literals_pass_through_unresolved() {
        let addr = Address::Ipv4("192.0.2.1".parse().unwrap());
        let target = resolve_target(&SystemResolver, &addr, 80).await.unwrap();
        assert_eq!(target, "192.0.2.1:80".parse().unwrap());

        let addr = Address::Ipv6("::1".parse().unwrap());
        let target = resolve_target(&SystemResolver, &addr, 443).await.unwrap();
        assert_eq!(target, "[::1]:443".parse().unwrap());
    }

    #[tokio::test]
    async fn localhost_resolves() {
        let addr = Address::Domain("localhost".into());
        let target = resolve_target(&SystemResolver, &addr, 8080).await.unwrap();
        assert!(target.ip().is_loopback());
        assert_eq!(target.port(), 8080);
    }

    #[tokio::test]
    async fn unresolvable_domain_is_an_error() {
        let result = SystemResolver.resolve("nonexistent.invalid").await;
        assert!(result.is_err());
    }
}
