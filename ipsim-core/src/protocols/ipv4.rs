//! An implementation of the forwarding path of [Internet Protocol version
//! 4](https://datatracker.ietf.org/doc/html/rfc791) for simulated nodes.
//!
//! An [`Ipv4`] router decides the fate of every datagram entering a node's
//! network layer. Datagrams from the link layer go through
//! [`Ipv4::handle_from_network`] and data from the transport layer through
//! [`Ipv4::handle_from_transport`]. Everything the router produces is handed
//! to its collaborators: the link layer ([`LinkOutput`]), the transport layer
//! ([`Upstream`]) and whatever turns errors into ICMP messages
//! ([`ErrorSignal`]).
//!
//! The router never reads a clock. Simulation time arrives with each call.

use crate::{payload::Payload, SimTime};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing::{debug, error, trace, warn};

pub mod datagram;
use datagram::{ControlFlags, Datagram, Ipv4HeaderBuilder};

pub mod fragmentation;
use fragmentation::{fragment, FragmentError, Fragments};

pub mod icmp;
use icmp::{IcmpError, TimeExceededCode, UnreachableCode};

pub mod interfaces;
use interfaces::{Interface, InterfaceId};

mod ipv4_address;
pub use ipv4_address::Ipv4Address;

mod ipv4_config;
pub use ipv4_config::{Ipv4Config, Stats};

mod ipv4_misc;
pub use ipv4_misc::{Egress, SendError, SendInfo};

pub mod reassembly;
use reassembly::Reassembly;

mod recorder;
pub use recorder::Recorder;

pub mod routing_table;
use routing_table::{NextHop, RoutingTable};

pub mod subnetting;

/// Receives datagrams ready for transmission on a link.
pub trait LinkOutput {
    fn send_to_output(&mut self, datagram: Datagram, egress: Egress);
}

/// Receives complete datagrams addressed to this node.
pub trait Upstream {
    /// `arrival` is the interface the datagram came in on, or `None` for
    /// datagrams that never left the node.
    fn deliver(&mut self, datagram: Datagram, arrival: Option<InterfaceId>);
}

/// Receives datagrams the router could not handle, along with the reason.
/// Deciding whether an ICMP message is actually sent in response is up to
/// the implementor.
pub trait ErrorSignal {
    fn signal_error(&mut self, datagram: Datagram, error: IcmpError);
}

/// Everything a router hands datagrams to.
pub trait Collaborators: LinkOutput + Upstream + ErrorSignal {}

impl<T: LinkOutput + Upstream + ErrorSignal> Collaborators for T {}

/// The network layer of one node.
#[derive(Debug, Clone)]
pub struct Ipv4 {
    table: RoutingTable,
    config: Ipv4Config,
    reassembly: Reassembly,
    /// Identification for the next datagram this node originates
    next_identification: u16,
    last_purge: SimTime,
    rng: SmallRng,
    stats: Stats,
}

impl Ipv4 {
    /// Creates a router over the given interfaces and routes. The forwarding
    /// switch and lookup policy of `config` are applied to the table.
    pub fn new(mut table: RoutingTable, config: Ipv4Config) -> Self {
        table.set_forwarding(config.forwarding);
        table.set_lookup(config.route_lookup);
        Self {
            rng: SmallRng::seed_from_u64(config.seed),
            table,
            config,
            reassembly: Reassembly::new(),
            next_identification: 0,
            last_purge: SimTime::ZERO,
            stats: Stats::default(),
        }
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut RoutingTable {
        &mut self.table
    }

    pub fn config(&self) -> &Ipv4Config {
        &self.config
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// The number of datagrams still waiting on fragments.
    pub fn pending_reassemblies(&self) -> usize {
        self.reassembly.len()
    }

    /// Handles a datagram that arrived from the link layer on `arrival`.
    #[tracing::instrument(
        name = "from_network",
        level = "debug",
        skip_all,
        fields(arrival = %arrival, source = %datagram.source(), destination = %datagram.destination())
    )]
    pub fn handle_from_network(
        &mut self,
        mut datagram: Datagram,
        arrival: InterfaceId,
        now: SimTime,
        collaborators: &mut impl Collaborators,
    ) {
        if datagram.bit_error && self.header_corrupted(&datagram) {
            debug!("Bit error in the header");
            self.stats.dropped += 1;
            collaborators.signal_error(datagram, IcmpError::ParameterProblem);
            return;
        }

        datagram.header.time_to_live = datagram.header.time_to_live.saturating_sub(1);

        let destination = datagram.destination();
        let result = if destination.is_multicast() {
            self.route_multicast(datagram, None, Some(arrival), now, collaborators)
        } else if self.table.is_local_address(destination)
            || destination.is_broadcast()
            || self.table.is_local_broadcast(destination)
        {
            self.local_deliver(datagram, Some(arrival), now, collaborators);
            Ok(())
        } else if !self.table.forwarding_enabled() {
            debug!("Forwarding is disabled, dropping");
            self.stats.dropped += 1;
            Ok(())
        } else {
            self.route_unicast(datagram, None, collaborators)
        };

        if let Err(e) = result {
            error!("Dropping datagram: {e}");
            self.stats.dropped += 1;
        }
    }

    /// Encapsulates transport data in a new datagram and sends it on its
    /// way. Returns an error only for misconfiguration. Datagrams that
    /// cannot be delivered are dropped or reported to `collaborators` as
    /// usual.
    #[tracing::instrument(
        name = "from_transport",
        level = "debug",
        skip_all,
        fields(destination = %info.destination, length = payload.len())
    )]
    pub fn handle_from_transport(
        &mut self,
        payload: Payload,
        info: SendInfo,
        now: SimTime,
        collaborators: &mut impl Collaborators,
    ) -> Result<(), SendError> {
        if self.table.num_interfaces() == 0 {
            warn!("No interfaces exist, dropping datagram");
            self.stats.dropped += 1;
            return Ok(());
        }

        let datagram = self.encapsulate(payload, &info)?;
        let destination = info.destination;
        if destination.is_multicast() {
            self.route_multicast(datagram, info.interface, None, now, collaborators)?;
        } else if self.table.is_local_address(destination) {
            self.local_deliver(datagram, None, now, collaborators);
        } else if destination.is_broadcast() || self.table.is_local_broadcast(destination) {
            self.route_broadcast(datagram, info.interface, collaborators)?;
        } else {
            self.route_unicast(datagram, info.interface, collaborators)?;
        }
        Ok(())
    }

    /// The last check before a datagram leaves the node: datagrams whose time
    /// to live has run out are reported instead of transmitted.
    pub fn send_to_output<C>(&mut self, datagram: Datagram, egress: Egress, collaborators: &mut C)
    where
        C: LinkOutput + ErrorSignal,
    {
        if datagram.header.time_to_live == 0 {
            debug!("Time to live expired");
            self.stats.dropped += 1;
            collaborators.signal_error(
                datagram,
                IcmpError::TimeExceeded(TimeExceededCode::TtlExpired),
            );
            return;
        }
        trace!(interface = %egress.interface, next_hop = %egress.next_hop, "Sending to link");
        collaborators.send_to_output(datagram, egress);
    }

    /// Discards reassemblies that have gone without a new fragment for longer
    /// than the configured fragment timeout, reporting each to `errors`.
    /// Returns how many were discarded.
    pub fn purge_stale_fragments(&mut self, now: SimTime, errors: &mut impl ErrorSignal) -> usize {
        let threshold = now.saturating_sub(self.config.fragment_timeout);
        let purged = self.reassembly.purge_stale_fragments(threshold, errors);
        if purged > 0 {
            debug!(purged, "Purged stale fragments");
        }
        self.stats.reassembly_timeouts += purged as u64;
        purged
    }

    /// Decides whether a bit error landed in the header, assuming errors are
    /// spread evenly over the datagram.
    fn header_corrupted(&mut self, datagram: &Datagram) -> bool {
        let total_length = datagram.total_length();
        if total_length == 0 {
            return true;
        }
        let probability =
            (f64::from(datagram.header.header_length) / f64::from(total_length)).min(1.0);
        self.rng.gen_bool(probability)
    }

    fn encapsulate(&mut self, payload: Payload, info: &SendInfo) -> Result<Datagram, SendError> {
        if let Some(id) = info.interface {
            self.table
                .interface(id)
                .ok_or(SendError::UnknownInterface(id))?;
        }

        let source = match info.source {
            Some(source) if !source.is_unspecified() => {
                if !self.table.is_local_address(source) {
                    Err(SendError::UnknownSource(source))?
                }
                source
            }
            _ => Ipv4Address::UNSPECIFIED,
        };

        let destination = info.destination;
        let time_to_live = if info.time_to_live > 0 {
            info.time_to_live
        } else if destination.is_link_local_multicast() {
            1
        } else if destination.is_multicast() {
            self.config.default_multicast_ttl
        } else {
            self.config.default_ttl
        };

        let header = Ipv4HeaderBuilder::new(source, destination, info.protocol, payload.len())
            .identification(self.next_identification)
            .flags(ControlFlags::new(info.dont_fragment, false))
            .time_to_live(time_to_live)
            .dscp(info.dscp)
            .build()?;
        self.next_identification = self.next_identification.wrapping_add(1);
        Ok(Datagram::new(header, payload))
    }

    /// Gives an unaddressed datagram the address of the interface it leaves
    /// through.
    fn fill_source(&self, datagram: &mut Datagram, interface: InterfaceId) {
        if datagram.source().is_unspecified() {
            if let Some(interface) = self.table.interface(interface) {
                datagram.header.source = interface.address();
            }
        }
    }

    fn route_unicast(
        &mut self,
        mut datagram: Datagram,
        interface: Option<InterfaceId>,
        collaborators: &mut impl Collaborators,
    ) -> Result<(), FragmentError> {
        let destination = datagram.destination();
        let hop = match interface {
            Some(interface) => NextHop {
                interface,
                gateway: self
                    .table
                    .find_best_route(destination)
                    .filter(|hop| hop.interface == interface)
                    .and_then(|hop| hop.gateway),
            },
            None => match self.table.find_best_route(destination) {
                Some(hop) => hop,
                None => {
                    debug!("Unroutable destination");
                    self.stats.unroutable += 1;
                    collaborators.signal_error(
                        datagram,
                        IcmpError::DestinationUnreachable(UnreachableCode::Network),
                    );
                    return Ok(());
                }
            },
        };

        self.fill_source(&mut datagram, hop.interface);
        debug!(interface = %hop.interface, gateway = ?hop.gateway, "Routing datagram");
        self.stats.forwarded += 1;
        let egress = Egress {
            interface: hop.interface,
            next_hop: hop.gateway.unwrap_or(destination),
        };
        self.fragment_and_send(datagram, egress, collaborators)
    }

    fn route_broadcast(
        &mut self,
        mut datagram: Datagram,
        interface: Option<InterfaceId>,
        collaborators: &mut impl Collaborators,
    ) -> Result<(), FragmentError> {
        let destination = datagram.destination();
        let interface = interface.or_else(|| {
            self.table
                .interfaces()
                .find(|interface| {
                    interface.flags().broadcast && interface.broadcast_address() == destination
                })
                .map(Interface::id)
        });

        if let Some(interface) = interface {
            self.fill_source(&mut datagram, interface);
            let egress = Egress {
                interface,
                next_hop: Ipv4Address::BROADCAST,
            };
            return self.fragment_and_send(datagram, egress, collaborators);
        }

        if !self.config.force_broadcast {
            debug!("No interface chosen for the broadcast, dropping");
            self.stats.dropped += 1;
            return Ok(());
        }

        let interfaces: Vec<InterfaceId> = self
            .table
            .interfaces()
            .filter(|interface| !interface.flags().loopback)
            .map(Interface::id)
            .collect();
        for interface in interfaces {
            let mut copy = datagram.clone();
            self.fill_source(&mut copy, interface);
            let egress = Egress {
                interface,
                next_hop: Ipv4Address::BROADCAST,
            };
            // One unusable interface does not stop the others
            if let Err(e) = self.fragment_and_send(copy, egress, collaborators) {
                error!(%interface, "Skipping interface for the broadcast: {e}");
                self.stats.dropped += 1;
            }
        }
        Ok(())
    }

    /// Routes a multicast datagram. `explicit` is an interface chosen by the
    /// sender and `arrival` the interface a received datagram came in on.
    fn route_multicast(
        &mut self,
        mut datagram: Datagram,
        explicit: Option<InterfaceId>,
        arrival: Option<InterfaceId>,
        now: SimTime,
        collaborators: &mut impl Collaborators,
    ) -> Result<(), FragmentError> {
        self.stats.multicast += 1;
        let destination = datagram.destination();
        let mut delivered = false;

        if let Some(arrival) = arrival {
            // Only accept datagrams that arrive on the shortest path back to
            // their source
            match self.table.interface_towards(datagram.source()) {
                Some(expected) if expected != arrival => {
                    debug!(%expected, "Multicast failed the reverse path check, dropping");
                    self.stats.dropped += 1;
                    return Ok(());
                }
                _ => {}
            }

            if self.table.is_local_multicast(destination) {
                self.local_deliver(datagram.clone(), Some(arrival), now, collaborators);
                delivered = true;
            }

            if !self.table.forwarding_enabled() || destination.is_link_local_multicast() {
                if !delivered {
                    self.stats.dropped += 1;
                }
                return Ok(());
            }
        }

        if let Some(interface) = explicit {
            self.fill_source(&mut datagram, interface);
            let egress = Egress {
                interface,
                next_hop: destination,
            };
            return self.fragment_and_send(datagram, egress, collaborators);
        }

        let hops: Vec<NextHop> = self
            .table
            .multicast_routes_for(destination)
            .into_iter()
            .filter(|hop| Some(hop.interface) != arrival)
            .collect();
        if hops.is_empty() && !delivered {
            debug!("No multicast routes, dropping");
            self.stats.dropped += 1;
        }

        for hop in hops {
            let mut copy = datagram.clone();
            self.fill_source(&mut copy, hop.interface);
            let egress = Egress {
                interface: hop.interface,
                next_hop: hop.gateway.unwrap_or(destination),
            };
            if let Err(e) = self.fragment_and_send(copy, egress, collaborators) {
                error!(interface = %hop.interface, "Skipping interface for the multicast: {e}");
                self.stats.dropped += 1;
            }
        }
        Ok(())
    }

    /// Hands a datagram addressed to this node upward, once any fragments
    /// have been reassembled.
    fn local_deliver(
        &mut self,
        mut datagram: Datagram,
        arrival: Option<InterfaceId>,
        now: SimTime,
        collaborators: &mut impl Collaborators,
    ) {
        self.stats.local_deliveries += 1;
        if datagram.source().is_unspecified() {
            datagram.header.source = datagram.destination();
        }

        let datagram = if datagram.is_fragment() {
            if now >= self.last_purge + self.config.purge_interval {
                self.last_purge = now;
                self.purge_stale_fragments(now, collaborators);
            }
            match self.reassembly.add_fragment(datagram, now) {
                Some(complete) => {
                    self.stats.reassembled += 1;
                    complete
                }
                None => {
                    trace!("Waiting on more fragments");
                    return;
                }
            }
        } else {
            datagram
        };

        debug!("Delivering locally");
        collaborators.deliver(datagram, arrival);
    }

    /// Sends the datagram out of `egress.interface`, fragmenting it first if
    /// it exceeds the interface's MTU. Each fragment is checked for an
    /// expired time to live on its own.
    fn fragment_and_send(
        &mut self,
        datagram: Datagram,
        egress: Egress,
        collaborators: &mut impl Collaborators,
    ) -> Result<(), FragmentError> {
        let Some(mtu) = self.table.interface_mtu(egress.interface) else {
            error!(interface = %egress.interface, "No such interface, dropping");
            self.stats.dropped += 1;
            return Ok(());
        };

        match fragment(datagram, mtu)? {
            Fragments::Whole(datagram) => self.send_to_output(datagram, egress, collaborators),
            Fragments::Discard(datagram) => {
                debug!(mtu, "Datagram needs fragmenting but may not be fragmented");
                self.stats.dropped += 1;
                collaborators.signal_error(
                    datagram,
                    IcmpError::DestinationUnreachable(UnreachableCode::FragmentationNeeded),
                );
            }
            Fragments::Fragmented(fragments) => {
                debug!(count = fragments.len(), mtu, "Fragmented datagram");
                self.stats.fragments_created += fragments.len() as u64;
                for fragment in fragments {
                    self.send_to_output(fragment, egress, collaborators);
                }
            }
        }
        Ok(())
    }
}
