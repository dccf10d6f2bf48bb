//! The network layer of a discrete-event internet simulator: IPv4 routing
//! decisions, fragmentation and reassembly for simulated nodes.
//!
//! # Uses
//!
//! - Simulation kernels can drive one [`Ipv4`](protocols::Ipv4) router per
//!   node, feeding it datagrams from links and data from transport protocols,
//!   and receiving back whatever should go out on a link, up to the
//!   transport layer, or to an ICMP implementation.
//! - Tests and teaching material can inspect each routing decision in
//!   isolation, since the router is synchronous and never reads a clock.
//!
//! # Organization
//!
//! - [`Payload`](payload::Payload) holds datagram contents and splits them
//!   without copying
//! - [`protocols::ipv4`] contains the router along with its routing table,
//!   fragmenter and reassembly buffer
//! - [`node`] runs a router as a tokio task fed by a channel, for simulations
//!   that give each node its own task
//!
//! # Time
//!
//! Time is a [`SimTime`], the simulated time elapsed since the start of the
//! simulation. It is always passed in by the caller along with the event it
//! belongs to, which keeps runs deterministic.

use std::time::Duration;

pub mod payload;
pub use payload::Payload;

pub mod protocols;

pub mod node;

mod shutdown;
pub use shutdown::{ExitStatus, Shutdown};

/// Simulated time since the start of a simulation.
pub type SimTime = Duration;
