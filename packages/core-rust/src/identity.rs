//! Identity of a connected client.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Stable key for a connected client, derived from the remote endpoint of
/// its connection.
///
/// Unique among concurrently connected clients. The same address may be
/// reused by a later connection once the previous session is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentity(pub SocketAddr);

impl ClientIdentity {
    /// Builds an identity from a host address and port.
    #[must_use]
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(host, port))
    }

    /// Remote host of the connection.
    #[must_use]
    pub fn host(&self) -> IpAddr {
        self.0.ip()
    }

    /// Remote port of the connection.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl From<SocketAddr> for ClientIdentity {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
