//! Endpoint addresses
//!
//! Upgraded connections have no network address of their own, so listeners
//! report a fixed logical [`Address`]. Transports backed by real sockets
//! convert their socket addresses into the same type.

use crate::protocol::constants::{LOGICAL_ADDRESS, LOGICAL_NETWORK};
use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;

/// An immutable endpoint address: a network name plus an address string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    network: Cow<'static, str>,
    address: Cow<'static, str>,
}

impl Address {
    /// The logical endpoint shared by every upgraded connection
    pub const LOGICAL: Address = Address::from_static(LOGICAL_NETWORK, LOGICAL_ADDRESS);

    /// Create an address from static strings
    pub const fn from_static(network: &'static str, address: &'static str) -> Self {
        Self {
            network: Cow::Borrowed(network),
            address: Cow::Borrowed(address),
        }
    }

    /// Create an address from owned parts
    pub fn new(network: impl Into<Cow<'static, str>>, address: impl Into<Cow<'static, str>>) -> Self {
        Self {
            network: network.into(),
            address: address.into(),
        }
    }

    /// Name of the network, e.g. `"tcp"` or `"ws"`
    pub fn network(&self) -> &str {
        &self.network
    }

    /// The address string
    pub fn as_str(&self) -> &str {
        &self.address
    }

    /// Parse the address as a socket address, if it is one
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.address.parse().ok()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::new("tcp", addr.to_string())
    }
}
