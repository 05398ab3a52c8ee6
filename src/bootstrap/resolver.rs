//! IPv4 name resolution used by the bootstrap.

use std::io;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

/// Resolves a hostname to its IPv4 addresses.
///
/// Implementations return addresses in the order the resolver produced them;
/// callers take the first one and never re-sort.
pub trait Ipv4Resolver {
    /// Looks up the A records for `host`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn lookup_ipv4(&self, host: &str, port: u16) -> io::Result<Vec<Ipv4Addr>>;
}

/// Resolver backed by the operating system (`getaddrinfo`).
///
/// Blocking. The bootstrap calls it on the main thread before the async
/// runtime exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Ipv4Resolver for SystemResolver {
    fn lookup_ipv4(&self, host: &str, port: u16) -> io::Result<Vec<Ipv4Addr>> {
        let addrs = (host, port).to_socket_addrs()?;
        Ok(addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_resolver_localhost_literal() {
        let addrs = SystemResolver.lookup_ipv4("127.0.0.1", 5432).unwrap();
        assert_eq!(addrs, vec![Ipv4Addr::LOCALHOST]);
    }

    #[test]
    fn test_system_resolver_drops_ipv6() {
        let addrs = SystemResolver.lookup_ipv4("::1", 5432).unwrap();
        assert!(addrs.is_empty());
    }
}
