use super::{
    datagram::HeaderBuildError, fragmentation::FragmentError, interfaces::InterfaceId,
    Ipv4Address,
};
use thiserror::Error as ThisError;

/// What the transport layer says about a payload it hands down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendInfo {
    pub destination: Ipv4Address,
    /// Must belong to one of the node's interfaces. When `None`, the address
    /// of the outgoing interface is used.
    pub source: Option<Ipv4Address>,
    /// Bypasses the route lookup
    pub interface: Option<InterfaceId>,
    /// Zero selects the configured default
    pub time_to_live: u8,
    pub dont_fragment: bool,
    pub dscp: u8,
    pub protocol: u8,
}

impl SendInfo {
    pub fn new(destination: Ipv4Address, protocol: impl Into<u8>) -> Self {
        Self {
            destination,
            source: None,
            interface: None,
            time_to_live: 0,
            dont_fragment: false,
            dscp: 0,
            protocol: protocol.into(),
        }
    }

    pub fn source(mut self, source: Ipv4Address) -> Self {
        self.source = Some(source);
        self
    }

    pub fn interface(mut self, interface: InterfaceId) -> Self {
        self.interface = Some(interface);
        self
    }

    pub fn time_to_live(mut self, time_to_live: u8) -> Self {
        self.time_to_live = time_to_live;
        self
    }

    pub fn dont_fragment(mut self) -> Self {
        self.dont_fragment = true;
        self
    }

    pub fn dscp(mut self, dscp: u8) -> Self {
        self.dscp = dscp;
        self
    }
}

/// The routing decision that travels with a datagram to the link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Egress {
    pub interface: InterfaceId,
    /// The neighbor that should receive the frame. For directly attached
    /// destinations this is the destination itself.
    pub next_hop: Ipv4Address,
}

/// Configuration mistakes detected while sending transport data.
#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("No interface has the source address {0}")]
    UnknownSource(Ipv4Address),
    #[error("No interface with id {0}")]
    UnknownInterface(InterfaceId),
    #[error("Could not build the header: {0}")]
    Header(#[from] HeaderBuildError),
    #[error("Could not fragment the datagram: {0}")]
    Fragmentation(#[from] FragmentError),
}
