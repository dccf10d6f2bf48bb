//! The ICMP errors the network layer raises about datagrams it cannot handle.
//!
//! Only the error kind is modelled here. Building and sending the actual
//! ICMP message is up to whatever implements
//! [`ErrorSignal`](super::ErrorSignal).

use std::fmt::{self, Display};

/// ICMP message type 3 codes used by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnreachableCode {
    /// No route to the destination network
    Network,
    /// The datagram needed fragmenting but had the don't-fragment flag set
    FragmentationNeeded,
}

impl UnreachableCode {
    pub const fn code(self) -> u8 {
        match self {
            Self::Network => 0,
            Self::FragmentationNeeded => 4,
        }
    }
}

/// ICMP message type 11 codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeExceededCode {
    TtlExpired,
    ReassemblyTimeout,
}

impl TimeExceededCode {
    pub const fn code(self) -> u8 {
        match self {
            Self::TtlExpired => 0,
            Self::ReassemblyTimeout => 1,
        }
    }
}

/// An error condition reported about a specific datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcmpError {
    DestinationUnreachable(UnreachableCode),
    TimeExceeded(TimeExceededCode),
    /// The header was damaged in transit
    ParameterProblem,
}

impl IcmpError {
    /// The ICMP type field for this error.
    pub const fn icmp_type(self) -> u8 {
        match self {
            Self::DestinationUnreachable(_) => 3,
            Self::TimeExceeded(_) => 11,
            Self::ParameterProblem => 12,
        }
    }

    /// The ICMP code field for this error.
    pub const fn icmp_code(self) -> u8 {
        match self {
            Self::DestinationUnreachable(code) => code.code(),
            Self::TimeExceeded(code) => code.code(),
            Self::ParameterProblem => 0,
        }
    }
}

impl Display for IcmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DestinationUnreachable(UnreachableCode::Network) => {
                write!(f, "destination network unreachable")
            }
            Self::DestinationUnreachable(UnreachableCode::FragmentationNeeded) => {
                write!(f, "fragmentation needed and DF set")
            }
            Self::TimeExceeded(TimeExceededCode::TtlExpired) => {
                write!(f, "time to live exceeded in transit")
            }
            Self::TimeExceeded(TimeExceededCode::ReassemblyTimeout) => {
                write!(f, "fragment reassembly time exceeded")
            }
            Self::ParameterProblem => write!(f, "parameter problem"),
        }
    }
}
