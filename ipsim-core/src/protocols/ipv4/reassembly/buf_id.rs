use crate::protocols::ipv4::{datagram::Ipv4Header, Ipv4Address};

/// Uniquely identifies the fragments of a particular datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufId {
    /// The sending node
    pub source: Ipv4Address,
    /// The final destination
    pub destination: Ipv4Address,
    /// The identification field shared by every fragment
    pub identification: u16,
}

impl BufId {
    /// Gets the reassembly key for a given header
    pub fn from_header(header: &Ipv4Header) -> Self {
        Self {
            source: header.source,
            destination: header.destination,
            identification: header.identification,
        }
    }
}
