//! Network masks and CIDR prefixes for the routing table.
//!
//! Routing is classless: every route and interface network is an address
//! plus a contiguous mask, written in
//! [CIDR notation](https://en.wikipedia.org/wiki/Classless_Inter-Domain_Routing#CIDR_notation).

use super::Ipv4Address;
use std::{fmt, net::Ipv4Addr, str::FromStr};

/// A contiguous IPv4 network mask.
#[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Ipv4Mask(u32);

impl fmt::Debug for Ipv4Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ipv4Mask(/{})", self.count_ones())
    }
}

impl Ipv4Mask {
    /// The mask `0.0.0.0`, matching every address.
    pub const ANY: Self = Self(0);

    /// The mask `255.255.255.255`, matching a single host.
    pub const HOST: Self = Self(u32::MAX);

    /// Returns a mask of `size` leading 1s. Sizes above 32 are clamped.
    ///
    /// # Examples
    ///
    /// ```
    /// # use ipsim_core::protocols::ipv4::subnetting::Ipv4Mask;
    /// let mask = Ipv4Mask::from_bitcount(16);
    /// assert_eq!(mask.to_u32(), 0xFF_FF_00_00);
    /// ```
    pub const fn from_bitcount(size: u32) -> Ipv4Mask {
        match size {
            0 => Ipv4Mask(0),
            1..=31 => Ipv4Mask(u32::MAX << (32 - size)),
            _ => Ipv4Mask(u32::MAX),
        }
    }

    /// The prefix length of the mask.
    pub const fn count_ones(&self) -> u32 {
        self.0.count_ones()
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }
}

impl From<Ipv4Mask> for u32 {
    fn from(mask: Ipv4Mask) -> u32 {
        mask.0
    }
}

impl TryFrom<u32> for Ipv4Mask {
    type Error = u32;

    /// Fails with the original number when its 1s are not contiguous.
    fn try_from(mask: u32) -> Result<Ipv4Mask, u32> {
        let result = Ipv4Mask::from_bitcount(mask.count_ones());
        if result.0 == mask {
            Ok(result)
        } else {
            Err(mask)
        }
    }
}

impl TryFrom<Ipv4Address> for Ipv4Mask {
    type Error = Ipv4Address;

    fn try_from(mask: Ipv4Address) -> Result<Ipv4Mask, Ipv4Address> {
        Ipv4Mask::try_from(mask.to_u32()).or(Err(mask))
    }
}

/// A network: an address prefix and its mask.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ipv4Net {
    /// Always stored with the host bits cleared so that equality compares
    /// networks rather than addresses
    network_id: Ipv4Address,
    mask: Ipv4Mask,
}

impl Ipv4Net {
    /// The network `0.0.0.0/0`, used for default routes.
    pub const DEFAULT: Self = Self {
        network_id: Ipv4Address::UNSPECIFIED,
        mask: Ipv4Mask::ANY,
    };

    /// Creates the network containing `ip` under `mask`.
    pub fn new(ip: Ipv4Address, mask: Ipv4Mask) -> Self {
        Self {
            network_id: Ipv4Address::from(ip.to_u32() & mask.to_u32()),
            mask,
        }
    }

    /// Creates a network from an address and a prefix length.
    ///
    /// # Example
    ///
    /// ```
    /// # use ipsim_core::protocols::ipv4::{Ipv4Address, subnetting::*};
    /// let a = Ipv4Net::new_short([12, 13, 12, 0], 28);
    /// let b = Ipv4Net::new(Ipv4Address::from([12, 13, 12, 9]), Ipv4Mask::from_bitcount(28));
    /// assert_eq!(a, b);
    /// ```
    pub fn new_short(ip: impl Into<Ipv4Address>, prefix_len: u32) -> Ipv4Net {
        Ipv4Net::new(ip.into(), Ipv4Mask::from_bitcount(prefix_len))
    }

    /// Parses `address/prefix_len`.
    pub fn from_cidr(cidr: &str) -> Result<Ipv4Net, CidrParseError> {
        cidr_to_ip(cidr).map(|(ip, mask)| Ipv4Net::new(ip, mask))
    }

    /// The first address in the network.
    pub fn id(&self) -> Ipv4Address {
        self.network_id
    }

    /// The directed broadcast address, the last address in the network.
    ///
    /// ```
    /// # use ipsim_core::protocols::ipv4::{Ipv4Address, subnetting::*};
    /// let net = Ipv4Net::from_cidr("10.0.0.119/24").unwrap();
    /// assert_eq!(net.broadcast(), Ipv4Address::from([10, 0, 0, 255]));
    /// ```
    pub fn broadcast(&self) -> Ipv4Address {
        Ipv4Address::from(self.network_id.to_u32() | !self.mask.to_u32())
    }

    pub fn mask(&self) -> Ipv4Mask {
        self.mask
    }

    /// Whether `address` lies inside this network.
    pub fn contains(&self, address: Ipv4Address) -> bool {
        self.network_id.to_u32() == address.to_u32() & self.mask.to_u32()
    }
}

impl fmt::Debug for Ipv4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ipv4Net {{{}/{}}}", self.network_id, self.mask.count_ones())
    }
}

impl fmt::Display for Ipv4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network_id, self.mask.count_ones())
    }
}

impl FromStr for Ipv4Net {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ipv4Net::from_cidr(s)
    }
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum CidrParseError {
    #[error("Expected an address of the form a.b.c.d/len")]
    Ipv4,
    #[error("Invalid prefix length: {0}")]
    Mask(#[from] std::num::ParseIntError),
    #[error("Prefix length {0} is longer than 32 bits")]
    PrefixTooLong(u32),
}

/// Splits a CIDR string into an address and a mask.
///
/// ```
/// # use ipsim_core::protocols::ipv4::{Ipv4Address, subnetting::*};
/// let (ip, mask) = cidr_to_ip("123.45.67.8/14").unwrap();
/// assert_eq!(ip, Ipv4Address::new([123, 45, 67, 8]));
/// assert_eq!(mask, Ipv4Mask::from_bitcount(14));
/// assert!(cidr_to_ip("5.6.7.8").is_err());
/// ```
pub fn cidr_to_ip(cidr: &str) -> Result<(Ipv4Address, Ipv4Mask), CidrParseError> {
    let (ip_str, mask_str) = cidr.split_once('/').ok_or(CidrParseError::Ipv4)?;
    let ip = Ipv4Addr::from_str(ip_str)
        .or(Err(CidrParseError::Ipv4))?
        .into();
    let prefix_len = u32::from_str(mask_str)?;
    if prefix_len > 32 {
        Err(CidrParseError::PrefixTooLong(prefix_len))?
    }
    Ok((ip, Ipv4Mask::from_bitcount(prefix_len)))
}
