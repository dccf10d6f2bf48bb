//! The datagram model: an IPv4 header plus the data it carries.
//!
//! Unlike the wire format of RFC 791, fragment offsets here are counted in
//! bytes rather than 8-octet blocks. Converting to block units belongs to
//! whatever serializes headers onto a link.

use super::Ipv4Address;
use crate::payload::Payload;
use std::fmt::{self, Debug, Formatter};
use thiserror::Error as ThisError;

/// The number of bytes in an IPv4 header without options
pub const MIN_HEADER_OCTETS: u16 = 20;
/// The largest header RFC 791 allows (IHL = 15 words)
pub const MAX_HEADER_OCTETS: u16 = 60;

/// Transport protocol numbers the simulation knows by name.
///
/// See <https://en.wikipedia.org/wiki/List_of_IP_protocol_numbers>.
#[derive(Eq, PartialEq, Hash, Debug, Clone, Copy)]
#[repr(u8)]
pub enum ProtocolNumber {
    Icmp = 1,
    Igmp = 2,
    Tcp = 6,
    Udp = 17,
}

impl From<ProtocolNumber> for u8 {
    fn from(value: ProtocolNumber) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for ProtocolNumber {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Icmp),
            2 => Ok(Self::Igmp),
            6 => Ok(Self::Tcp),
            17 => Ok(Self::Udp),
            other => Err(other),
        }
    }
}

/// The header fields the network layer acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Header {
    /// Length of the header in bytes, options included
    pub header_length: u16,
    /// Length of the datagram in bytes, header included
    pub total_length: u16,
    /// Assigned by the sender to aid in assembling fragments
    pub identification: u16,
    /// Where in the original datagram this fragment's data begins, in bytes
    pub fragment_offset: u16,
    /// Flags describing fragmentation properties
    pub flags: ControlFlags,
    /// The number of remaining hops this datagram can take before being removed
    pub time_to_live: u8,
    /// Indicates the next level protocol in the data portion of the datagram
    pub protocol: u8,
    /// Differentiated services code point
    pub dscp: u8,
    pub source: Ipv4Address,
    pub destination: Ipv4Address,
}

impl Ipv4Header {
    /// The number of data bytes following the header.
    pub fn payload_length(&self) -> u16 {
        self.total_length.saturating_sub(self.header_length)
    }

    /// Whether this header describes one piece of a larger datagram.
    pub fn is_fragment(&self) -> bool {
        self.fragment_offset != 0 || self.flags.more_fragments()
    }
}

/// A builder for [`Ipv4Header`]s, used when encapsulating transport data.
#[derive(Debug, Clone)]
pub struct Ipv4HeaderBuilder {
    header_length: u16,
    payload_length: usize,
    identification: u16,
    fragment_offset: u16,
    flags: ControlFlags,
    time_to_live: u8,
    protocol: u8,
    dscp: u8,
    source: Ipv4Address,
    destination: Ipv4Address,
}

impl Ipv4HeaderBuilder {
    /// Creates a builder for a basic header in front of `payload_length`
    /// bytes of data.
    pub fn new(
        source: Ipv4Address,
        destination: Ipv4Address,
        protocol: u8,
        payload_length: usize,
    ) -> Self {
        Self {
            header_length: MIN_HEADER_OCTETS,
            payload_length,
            identification: 0,
            fragment_offset: 0,
            flags: ControlFlags::DEFAULT,
            time_to_live: 30,
            protocol,
            dscp: 0,
            source,
            destination,
        }
    }

    pub fn header_length(mut self, header_length: u16) -> Self {
        self.header_length = header_length;
        self
    }

    pub fn identification(mut self, identification: u16) -> Self {
        self.identification = identification;
        self
    }

    pub fn fragment_offset(mut self, fragment_offset: u16) -> Self {
        self.fragment_offset = fragment_offset;
        self
    }

    pub fn flags(mut self, flags: ControlFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn time_to_live(mut self, time_to_live: u8) -> Self {
        self.time_to_live = time_to_live;
        self
    }

    pub fn dscp(mut self, dscp: u8) -> Self {
        self.dscp = dscp;
        self
    }

    /// Validates the configuration and produces the header.
    pub fn build(self) -> Result<Ipv4Header, HeaderBuildError> {
        if !(MIN_HEADER_OCTETS..=MAX_HEADER_OCTETS).contains(&self.header_length) {
            Err(HeaderBuildError::InvalidHeaderLength(self.header_length))?
        }
        let total_length = u16::try_from(self.payload_length)
            .ok()
            .and_then(|payload| payload.checked_add(self.header_length))
            .ok_or(HeaderBuildError::OverlyLongPayload(self.payload_length))?;
        Ok(Ipv4Header {
            header_length: self.header_length,
            total_length,
            identification: self.identification,
            fragment_offset: self.fragment_offset,
            flags: self.flags,
            time_to_live: self.time_to_live,
            protocol: self.protocol,
            dscp: self.dscp,
            source: self.source,
            destination: self.destination,
        })
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum HeaderBuildError {
    #[error("A payload of {0} bytes does not fit in a single datagram")]
    OverlyLongPayload(usize),
    #[error("Header length {0} is outside the range allowed by IPv4")]
    InvalidHeaderLength(u16),
}

/// The don't-fragment and more-fragments bits, laid out as in the wire
/// format's flags field.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlFlags(u8);

impl ControlFlags {
    const MORE_FRAGMENTS: u8 = 0b001;
    const DONT_FRAGMENT: u8 = 0b010;

    /// Fragmentation allowed, last (or only) fragment.
    pub const DEFAULT: Self = Self::new(false, false);

    pub const fn new(dont_fragment: bool, more_fragments: bool) -> Self {
        Self((more_fragments as u8) | ((dont_fragment as u8) << 1))
    }

    pub const fn dont_fragment(&self) -> bool {
        self.0 & Self::DONT_FRAGMENT != 0
    }

    pub fn set_dont_fragment(&mut self, value: bool) {
        self.0 = (self.0 & !Self::DONT_FRAGMENT) | ((value as u8) << 1);
    }

    pub const fn more_fragments(&self) -> bool {
        self.0 & Self::MORE_FRAGMENTS != 0
    }

    pub fn set_more_fragments(&mut self, value: bool) {
        self.0 = (self.0 & !Self::MORE_FRAGMENTS) | value as u8;
    }

    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

impl Debug for ControlFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlFlags")
            .field("DF", &self.dont_fragment())
            .field("MF", &self.more_fragments())
            .finish()
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One network-layer protocol data unit, whole or a fragment.
///
/// `payload` is `None` for datagrams whose size is modelled only by
/// `header.total_length`, and for header-only placeholders handed to the
/// error collaborator. When present, its length equals
/// [`Ipv4Header::payload_length`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub header: Ipv4Header,
    pub payload: Option<Payload>,
    /// Set by the link layer when the frame was corrupted in transit
    pub bit_error: bool,
}

impl Datagram {
    /// Creates a datagram carrying real bytes.
    pub fn new(header: Ipv4Header, payload: Payload) -> Self {
        debug_assert_eq!(header.payload_length() as usize, payload.len());
        Self {
            header,
            payload: Some(payload),
            bit_error: false,
        }
    }

    /// Creates a datagram whose data is represented only by its length.
    pub fn length_only(header: Ipv4Header) -> Self {
        Self {
            header,
            payload: None,
            bit_error: false,
        }
    }

    /// Marks the datagram as corrupted in transit.
    pub fn with_bit_error(mut self) -> Self {
        self.bit_error = true;
        self
    }

    pub fn source(&self) -> Ipv4Address {
        self.header.source
    }

    pub fn destination(&self) -> Ipv4Address {
        self.header.destination
    }

    pub fn total_length(&self) -> u16 {
        self.header.total_length
    }

    pub fn is_fragment(&self) -> bool {
        self.header.is_fragment()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip() {
        let mut flags = ControlFlags::DEFAULT;
        assert!(!flags.dont_fragment());
        assert!(!flags.more_fragments());
        flags.set_more_fragments(true);
        flags.set_dont_fragment(true);
        assert_eq!(flags, ControlFlags::new(true, true));
        assert_eq!(flags.as_u8(), 0b011);
        flags.set_more_fragments(false);
        assert!(flags.dont_fragment());
        assert!(!flags.more_fragments());
    }

    #[test]
    fn builder_computes_total_length() {
        let header = Ipv4HeaderBuilder::new(
            Ipv4Address::new([10, 0, 0, 1]),
            Ipv4Address::new([10, 0, 1, 1]),
            ProtocolNumber::Udp.into(),
            3000,
        )
        .build()
        .unwrap();
        assert_eq!(header.total_length, 3020);
        assert_eq!(header.payload_length(), 3000);
        assert!(!header.is_fragment());
    }

    #[test]
    fn builder_rejects_oversize_payload() {
        let result = Ipv4HeaderBuilder::new(
            Ipv4Address::LOCALHOST,
            Ipv4Address::LOCALHOST,
            17,
            u16::MAX as usize,
        )
        .build();
        assert_eq!(
            result,
            Err(HeaderBuildError::OverlyLongPayload(u16::MAX as usize))
        );
    }

    #[test]
    fn builder_rejects_short_header() {
        let result = Ipv4HeaderBuilder::new(Ipv4Address::LOCALHOST, Ipv4Address::LOCALHOST, 17, 10)
            .header_length(12)
            .build();
        assert_eq!(result, Err(HeaderBuildError::InvalidHeaderLength(12)));
    }
}
