use super::{
    datagram::MIN_HEADER_OCTETS,
    subnetting::{cidr_to_ip, CidrParseError, Ipv4Mask, Ipv4Net},
    Ipv4Address,
};
use std::fmt::{self, Display};

/// The maximum transmission unit of an interface, in bytes.
pub type Mtu = u16;

/// Identifies one network interface of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId(u32);

impl InterfaceId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u32 {
        self.0
    }
}

impl From<u32> for InterfaceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}

/// Link capabilities of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceFlags {
    pub broadcast: bool,
    pub multicast: bool,
    pub point_to_point: bool,
    pub loopback: bool,
}

impl InterfaceFlags {
    /// A shared broadcast medium such as Ethernet.
    pub const BROADCAST: Self = Self {
        broadcast: true,
        multicast: true,
        point_to_point: false,
        loopback: false,
    };

    pub const POINT_TO_POINT: Self = Self {
        broadcast: false,
        multicast: true,
        point_to_point: true,
        loopback: false,
    };

    pub const LOOPBACK: Self = Self {
        broadcast: false,
        multicast: false,
        point_to_point: false,
        loopback: true,
    };
}

impl Default for InterfaceFlags {
    fn default() -> Self {
        Self::BROADCAST
    }
}

/// One network interface: its address, the network it sits on and the
/// largest datagram it can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    id: InterfaceId,
    name: String,
    address: Ipv4Address,
    mask: Ipv4Mask,
    mtu: Mtu,
    flags: InterfaceFlags,
    multicast_groups: Vec<Ipv4Address>,
}

impl Interface {
    /// Creates an interface. Fails if the MTU could not carry even an empty
    /// datagram.
    pub fn new(
        id: InterfaceId,
        name: impl Into<String>,
        address: Ipv4Address,
        mask: Ipv4Mask,
        mtu: Mtu,
    ) -> Result<Self, InterfaceError> {
        if mtu < MIN_HEADER_OCTETS {
            Err(InterfaceError::MtuTooSmall(mtu))?
        }
        Ok(Self {
            id,
            name: name.into(),
            address,
            mask,
            mtu,
            flags: InterfaceFlags::default(),
            multicast_groups: vec![],
        })
    }

    /// Creates an interface from an address in CIDR notation, such as
    /// `10.0.0.1/24`.
    pub fn from_cidr(
        id: InterfaceId,
        name: impl Into<String>,
        cidr: &str,
        mtu: Mtu,
    ) -> Result<Self, InterfaceError> {
        let (address, mask) = cidr_to_ip(cidr)?;
        Self::new(id, name, address, mask, mtu)
    }

    pub fn with_flags(mut self, flags: InterfaceFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Subscribes the interface to a multicast group.
    pub fn join_group(mut self, group: Ipv4Address) -> Self {
        if !self.multicast_groups.contains(&group) {
            self.multicast_groups.push(group);
        }
        self
    }

    pub fn id(&self) -> InterfaceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Ipv4Address {
        self.address
    }

    pub fn mtu(&self) -> Mtu {
        self.mtu
    }

    pub fn flags(&self) -> InterfaceFlags {
        self.flags
    }

    /// The network this interface is directly attached to.
    pub fn network(&self) -> Ipv4Net {
        Ipv4Net::new(self.address, self.mask)
    }

    /// The directed broadcast address of the attached network.
    pub fn broadcast_address(&self) -> Ipv4Address {
        self.network().broadcast()
    }

    pub fn is_member_of(&self, group: Ipv4Address) -> bool {
        self.multicast_groups.contains(&group)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("An MTU of {0} bytes cannot carry a minimal IPv4 header")]
    MtuTooSmall(Mtu),
    #[error("{0}")]
    Address(#[from] CidrParseError),
}
