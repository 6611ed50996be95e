//! A `(hostname, port)` pair with async DNS resolution (spec.md §4.G).

use std::io;
use std::net::SocketAddr;

/// Where to connect. Resolution is deferred to [`Target::resolve`] rather
/// than done eagerly at construction, so building a `Target` never blocks
/// and never touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
    /// Builds a target for `host:port`. `host` may be a hostname or a
    /// literal IP address; either way resolution happens in
    /// [`Target::resolve`].
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The hostname or address, unresolved.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Resolves this target to a concrete socket address via async DNS
    /// lookup (spec.md §4.G), taking the first address the resolver
    /// returns.
    pub async fn resolve(&self) -> io::Result<SocketAddr> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no addresses for {}:{}", self.host, self.port)))
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<(String, u16)> for Target {
    fn from((host, port): (String, u16)) -> Self {
        Self::new(host, port)
    }
}

impl From<(&str, u16)> for Target {
    fn from((host, port): (&str, u16)) -> Self {
        Self::new(host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_localhost() {
        let target = Target::new("localhost", 4433);
        let addr = target.resolve().await.expect("resolve");
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 4433);
    }

    #[test]
    fn display_matches_host_colon_port() {
        assert_eq!(Target::new("example.com", 80).to_string(), "example.com:80");
    }
}
