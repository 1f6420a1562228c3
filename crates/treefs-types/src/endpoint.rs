//! Network endpoints and storage node identity.
//!
//! Nodes are identified by the endpoint they advertise for their storage
//! surface, compared by value. A node that restarts on the same address has
//! the same identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An advertised `host:port` address.
///
/// The host is kept as text so that advertised hostnames survive unchanged;
/// resolving them is the transport's job.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint. Validation happens at registration time.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns an error message if this endpoint cannot be advertised.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err(format!("endpoint {} has an empty host", self));
        }
        if self.port == 0 {
            return Err(format!("endpoint {} has no port", self));
        }
        Ok(())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({})", self)
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("endpoint {:?} is not host:port", s))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("endpoint {:?} has a bad port: {}", s, e))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(e: Endpoint) -> String {
        e.to_string()
    }
}

impl From<std::net::SocketAddr> for Endpoint {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Stable identity of a storage node: its advertised storage endpoint.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Endpoint);

impl NodeId {
    pub fn new(storage_endpoint: Endpoint) -> Self {
        Self(storage_endpoint)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.0
    }
}

impl From<Endpoint> for NodeId {
    fn from(e: Endpoint) -> Self {
        Self(e)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let e: Endpoint = "storage-1.local:7001".parse().unwrap();
        assert_eq!(e.host(), "storage-1.local");
        assert_eq!(e.port(), 7001);
        assert_eq!(e.to_string(), "storage-1.local:7001");

        let v6: Endpoint = "[::1]:9000".parse().unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.to_string(), "[::1]:9000");

        assert!("no-port".parse::<Endpoint>().is_err());
        assert!("host:99999".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(Endpoint::new("10.0.0.5", 7001).validate().is_ok());
        assert!(Endpoint::new("", 7001).validate().is_err());
        assert!(Endpoint::new("10.0.0.5", 0).validate().is_err());
    }

    #[test]
    fn test_node_id_compares_by_value() {
        let a = NodeId::new(Endpoint::new("10.0.0.5", 7001));
        let b = NodeId::new("10.0.0.5:7001".parse().unwrap());
        let c = NodeId::new(Endpoint::new("10.0.0.5", 7002));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
