use std::{
    fmt::{self, Display},
    net::Ipv4Addr,
    str::FromStr,
};

/// Represents an address used by the [`Ipv4`](super::Ipv4) protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ipv4Address([u8; 4]);

impl Ipv4Address {
    /// The address `0.0.0.0`, used for "not yet assigned".
    pub const UNSPECIFIED: Self = Self([0u8, 0, 0, 0]);

    /// The address `127.0.0.1`.
    pub const LOCALHOST: Self = Self([127u8, 0, 0, 1]);

    /// The limited broadcast address `255.255.255.255`.
    pub const BROADCAST: Self = Self([255u8, 255, 255, 255]);

    /// Creates a new address.
    pub const fn new(address: [u8; 4]) -> Self {
        Self(address)
    }

    /// Gets the address as a `u32`.
    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Gets the address as a `[u8; 4]`.
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0
    }

    /// Whether this is `0.0.0.0`.
    pub const fn is_unspecified(self) -> bool {
        self.to_u32() == 0
    }

    /// Whether the address is in the class D range `224.0.0.0/4`.
    pub const fn is_multicast(self) -> bool {
        self.0[0] & 0xf0 == 0xe0
    }

    /// Whether the address is a multicast group that must not leave the
    /// local link (`224.0.0.0/24`).
    pub const fn is_link_local_multicast(self) -> bool {
        self.0[0] == 224 && self.0[1] == 0 && self.0[2] == 0
    }

    /// Whether this is the limited broadcast address.
    pub const fn is_broadcast(self) -> bool {
        self.to_u32() == u32::MAX
    }
}

impl Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl From<u32> for Ipv4Address {
    fn from(n: u32) -> Self {
        Self(n.to_be_bytes())
    }
}

impl From<[u8; 4]> for Ipv4Address {
    fn from(n: [u8; 4]) -> Self {
        Self(n)
    }
}

impl From<Ipv4Address> for u32 {
    fn from(address: Ipv4Address) -> Self {
        address.to_u32()
    }
}

impl From<Ipv4Address> for [u8; 4] {
    fn from(address: Ipv4Address) -> Self {
        address.0
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(address: Ipv4Addr) -> Self {
        Self(address.octets())
    }
}

impl FromStr for Ipv4Address {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Ipv4Addr::from_str(s)?.into())
    }
}
