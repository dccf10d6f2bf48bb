//! Prebuilt simulations for testing and for the command line.
//!
//! Every simulation runs on the same small internet:
//!
//! ```text
//! client 10.0.0.2 --- mtu 1500 --- router --- bottleneck mtu --- server 10.0.1.2
//! ```

use crate::internet::{Internet, InternetError, Link, NodeId, Port};
use ipsim_core::{
    payload::Payload,
    protocols::ipv4::{
        interfaces::{Interface, InterfaceId, Mtu},
        routing_table::RoutingTable,
        Ipv4, Ipv4Address, Ipv4Config, SendInfo,
    },
    ExitStatus, SimTime,
};
use std::{
    fmt::{self, Display},
    time::Duration,
};

pub const CLIENT_ADDRESS: Ipv4Address = Ipv4Address::new([10, 0, 0, 2]);
pub const SERVER_ADDRESS: Ipv4Address = Ipv4Address::new([10, 0, 1, 2]);
const UDP: u8 = 17;
const IF0: InterfaceId = InterfaceId::new(0);
const IF1: InterfaceId = InterfaceId::new(1);

/// What can be tuned about a simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    /// Bytes of transport data per datagram
    pub payload_size: usize,
    /// MTU of the link between the router and the server
    pub bottleneck_mtu: Mtu,
    /// Overrides the default time to live of the client
    pub time_to_live: Option<u8>,
    pub fragment_timeout: Duration,
    /// Delay of every link
    pub delay: Duration,
    /// Chance of losing a datagram on the bottleneck link
    pub loss_rate: f64,
    /// Chance of corrupting a datagram on the bottleneck link
    pub bit_error_rate: f64,
    /// How many datagrams the client sends, where a simulation sends several
    pub messages: usize,
    pub seed: u64,
    /// Simulated time after which to stop, even with events left
    pub deadline: Option<SimTime>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            payload_size: 4000,
            bottleneck_mtu: 576,
            time_to_live: None,
            fragment_timeout: Duration::from_secs(60),
            delay: Duration::from_millis(1),
            loss_rate: 0.0,
            bit_error_rate: 0.0,
            messages: 100,
            seed: 0xBAD5EED,
            deadline: None,
        }
    }
}

/// A finished simulation.
pub struct Run {
    pub status: ExitStatus,
    pub internet: Internet,
    pub client: NodeId,
    pub router: NodeId,
    pub server: NodeId,
    /// Bytes the client sent in each datagram
    pub sent: Vec<Vec<u8>>,
}

impl Run {
    /// Datagrams the server received exactly as the client sent them.
    pub fn intact_deliveries(&self) -> usize {
        self.internet
            .delivered(self.server)
            .into_iter()
            .filter_map(|datagram| datagram.payload.as_ref())
            .filter(|payload| self.sent.iter().any(|bytes| payload.to_vec() == *bytes))
            .count()
    }
}

impl Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Finished at {:?}: {:?}", self.internet.now(), self.status)?;
        writeln!(
            f,
            "Sent {}, delivered {} intact, lost {} on links",
            self.sent.len(),
            self.intact_deliveries(),
            self.internet.lost()
        )?;
        for (id, (name, stats)) in self.internet.stats().enumerate() {
            writeln!(f, "{name}: {stats:?}")?;
            for error in self.internet.errors(id) {
                writeln!(f, "{name} reported: {error}")?;
            }
            for rejected in self.internet.rejected(id) {
                writeln!(f, "{name} rejected: {rejected}")?;
            }
        }
        Ok(())
    }
}

/// The internet every simulation runs on, before any traffic.
struct Topology {
    internet: Internet,
    client: NodeId,
    router: NodeId,
    server: NodeId,
}

impl Topology {
    fn build(params: &Params, bottleneck: Link) -> Result<Self, InternetError> {
        let config = Ipv4Config::default()
            .fragment_timeout(params.fragment_timeout)
            .seed(params.seed);
        let host_config = config.clone().forwarding(false);

        let mut client = RoutingTable::new();
        client.add_interface(Interface::from_cidr(IF0, "eth0", "10.0.0.2/24", 1500)?)?;
        client.set_default_route([10, 0, 0, 1].into(), IF0)?;

        let mut router = RoutingTable::new();
        router.add_interface(Interface::from_cidr(IF0, "eth0", "10.0.0.1/24", 1500)?)?;
        router.add_interface(Interface::from_cidr(
            IF1,
            "eth1",
            "10.0.1.1/24",
            params.bottleneck_mtu,
        )?)?;

        let mut server = RoutingTable::new();
        server.add_interface(Interface::from_cidr(
            IF0,
            "eth0",
            "10.0.1.2/24",
            params.bottleneck_mtu,
        )?)?;
        server.set_default_route([10, 0, 1, 1].into(), IF0)?;

        let mut internet = Internet::new(params.seed);
        let client = internet.add_node("client", Ipv4::new(client, host_config.clone()));
        let router = internet.add_node("router", Ipv4::new(router, config));
        let server = internet.add_node("server", Ipv4::new(server, host_config));
        internet.connect(
            Port::new(client, IF0),
            Port::new(router, IF0),
            Link::new(params.delay),
        )?;
        internet.connect(Port::new(router, IF1), Port::new(server, IF0), bottleneck)?;
        Ok(Self {
            internet,
            client,
            router,
            server,
        })
    }

    fn bottleneck(params: &Params) -> Link {
        Link::new(params.delay)
            .loss_rate(params.loss_rate)
            .bit_error_rate(params.bit_error_rate)
    }

    /// Schedules the client to send a datagram to the server and returns its
    /// bytes.
    fn send(
        &mut self,
        at: SimTime,
        params: &Params,
        info: SendInfo,
        fill: u8,
    ) -> Result<Vec<u8>, InternetError> {
        let bytes: Vec<u8> = (0..params.payload_size)
            .map(|i| (i as u8).wrapping_add(fill))
            .collect();
        self.internet
            .send(at, self.client, Payload::new(bytes.clone()), info)?;
        Ok(bytes)
    }

    fn to_server(params: &Params) -> SendInfo {
        let info = SendInfo::new(SERVER_ADDRESS, UDP);
        match params.time_to_live {
            Some(ttl) => info.time_to_live(ttl),
            None => info,
        }
    }

    fn run(mut self, deadline: Option<SimTime>, sent: Vec<Vec<u8>>) -> Run {
        let status = self.internet.run(deadline);
        Run {
            status,
            internet: self.internet,
            client: self.client,
            router: self.router,
            server: self.server,
            sent,
        }
    }
}

/// The client sends one large datagram that the router has to fragment to
/// fit the bottleneck.
pub fn fragmented_transfer(params: &Params) -> Result<Run, InternetError> {
    let mut topology = Topology::build(params, Topology::bottleneck(params))?;
    let sent = topology.send(SimTime::ZERO, params, Topology::to_server(params), 0)?;
    Ok(topology.run(params.deadline, vec![sent]))
}

/// The client sends with a time to live of one, so the router reports the
/// datagram instead of forwarding it.
pub fn ttl_expiry(params: &Params) -> Result<Run, InternetError> {
    let mut topology = Topology::build(params, Topology::bottleneck(params))?;
    let info = SendInfo::new(SERVER_ADDRESS, UDP).time_to_live(1);
    let sent = topology.send(SimTime::ZERO, params, info, 0)?;
    Ok(topology.run(params.deadline, vec![sent]))
}

/// The client forbids fragmentation of its datagram, so the first hop that
/// cannot carry it whole reports it.
pub fn dont_fragment(params: &Params) -> Result<Run, InternetError> {
    let mut topology = Topology::build(params, Topology::bottleneck(params))?;
    let info = Topology::to_server(params).dont_fragment();
    let sent = topology.send(SimTime::ZERO, params, info, 0)?;
    Ok(topology.run(params.deadline, vec![sent]))
}

/// The bottleneck loses the second fragment, so the server gives up on the
/// datagram once the fragment timeout has passed.
pub fn reassembly_timeout(params: &Params) -> Result<Run, InternetError> {
    let link = Topology::bottleneck(params).drop_nth(1);
    let mut topology = Topology::build(params, link)?;
    let sent = topology.send(SimTime::ZERO, params, Topology::to_server(params), 0)?;
    let purge_at = params.fragment_timeout + Duration::from_secs(1);
    topology.internet.purge(purge_at, topology.server)?;
    Ok(topology.run(params.deadline, vec![sent]))
}

/// The client sends a stream of datagrams over a bottleneck that may lose
/// or corrupt them. The server purges on a fixed schedule.
pub fn lossy_transfer(params: &Params) -> Result<Run, InternetError> {
    let mut topology = Topology::build(params, Topology::bottleneck(params))?;
    let spacing = params.delay * 4;
    let mut sent = Vec::with_capacity(params.messages);
    for i in 0..params.messages {
        let at = spacing * i as u32;
        sent.push(topology.send(at, params, Topology::to_server(params), i as u8)?);
    }
    let end = spacing * params.messages as u32 + params.fragment_timeout * 2;
    let interval = params.fragment_timeout / 2;
    let mut at = interval;
    while !interval.is_zero() && at <= end {
        topology.internet.purge(at, topology.server)?;
        at += interval;
    }
    Ok(topology.run(params.deadline, sent))
}

/// The simulations that can be chosen from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    Fragmentation,
    TtlExpiry,
    DontFragment,
    ReassemblyTimeout,
    Lossy,
}

impl Scenario {
    pub fn run(self, params: &Params) -> Result<Run, InternetError> {
        match self {
            Scenario::Fragmentation => fragmented_transfer(params),
            Scenario::TtlExpiry => ttl_expiry(params),
            Scenario::DontFragment => dont_fragment(params),
            Scenario::ReassemblyTimeout => reassembly_timeout(params),
            Scenario::Lossy => lossy_transfer(params),
        }
    }
}
