//! Parsed database connection strings.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use url::Url;

/// Errors produced while parsing a connection string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    /// The string is not a URL at all.
    #[error("connection string is not a valid URL: {0}")]
    Invalid(#[from] url::ParseError),

    /// The URL parsed but carries no hostname (e.g. `postgres:///db`).
    #[error("connection string has no host")]
    MissingHost,
}

/// A database connection URL: scheme, credentials, host, port, path, query.
///
/// Only the hostname is mutable, and only towards an IPv4 literal. Every other
/// component is carried through re-serialization untouched.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    url: Url,
}

impl ConnectionDescriptor {
    /// Parses a connection string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a URL or has no host.
    pub fn parse(raw: &str) -> Result<Self, DescriptorError> {
        let url = Url::parse(raw.trim())?;
        match url.host_str() {
            Some(host) if !host.is_empty() => Ok(Self { url }),
            _ => Err(DescriptorError::MissingHost),
        }
    }

    /// Hostname as written in the connection string.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Explicit port, if the connection string carries one.
    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// True when the host is a dotted-decimal IPv4 address.
    ///
    /// Non-special schemes such as `postgres` keep IP hosts as opaque strings,
    /// so this checks the text rather than the parsed host kind.
    pub fn is_ipv4_literal(&self) -> bool {
        Ipv4Addr::from_str(self.host()).is_ok()
    }

    /// Replaces the hostname with an IPv4 literal.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot carry a host.
    pub fn set_ipv4_host(&mut self, addr: Ipv4Addr) -> Result<(), DescriptorError> {
        self.url.set_host(Some(&addr.to_string()))?;
        Ok(())
    }

    /// Serialized connection string, credentials included.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Displays the URL with the password masked, safe for logs.
impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.url.password().is_none() {
            return f.write_str(self.url.as_str());
        }
        let mut redacted = self.url.clone();
        let _ = redacted.set_password(Some("***"));
        f.write_str(redacted.as_str())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionDescriptor")
            .field(&self.to_string())
            .finish()
    }
}
