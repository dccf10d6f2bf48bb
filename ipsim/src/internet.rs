//! A discrete-event driver that connects routers with point-to-point links.
//!
//! Every event is stamped with the simulated time it happens at and kept in a
//! single queue. Events with the same time run in the order they were
//! scheduled, so a run with the same setup and seed always plays out the same
//! way.

use ipsim_core::{
    node::{self, Event},
    payload::Payload,
    protocols::ipv4::{
        datagram::Datagram,
        icmp::IcmpError,
        interfaces::{InterfaceError, InterfaceId},
        routing_table::RouteError,
        Egress, Ipv4, Recorder, SendError, SendInfo, Stats,
    },
    ExitStatus, SimTime,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    fmt::{self, Display},
    time::Duration,
};
use thiserror::Error as ThisError;
use tracing::{debug, info, trace, warn};

pub type NodeId = usize;

/// One end of a link: an interface of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port {
    pub node: NodeId,
    pub interface: InterfaceId,
}

impl Port {
    pub fn new(node: NodeId, interface: InterfaceId) -> Self {
        Self { node, interface }
    }
}

impl Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} {}", self.node, self.interface)
    }
}

/// How a link treats the datagrams crossing it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Link {
    pub delay: Duration,
    /// Chance that a datagram is lost
    pub loss_rate: f64,
    /// Chance that a datagram arrives with a bit error
    pub bit_error_rate: f64,
    /// Datagrams to lose regardless of chance, counted from zero in the order
    /// they start crossing
    pub drops: FxHashSet<u64>,
}

impl Link {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate;
        self
    }

    pub fn bit_error_rate(mut self, rate: f64) -> Self {
        self.bit_error_rate = rate;
        self
    }

    pub fn drop_nth(mut self, n: u64) -> Self {
        self.drops.insert(n);
        self
    }

    fn validate(&self) -> Result<(), InternetError> {
        for rate in [self.loss_rate, self.bit_error_rate] {
            if !(0.0..=1.0).contains(&rate) {
                Err(InternetError::InvalidRate(rate))?
            }
        }
        Ok(())
    }
}

/// Something that happened at a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Handed to the transport layer
    Delivered {
        datagram: Datagram,
        arrival: Option<InterfaceId>,
    },
    /// Handed to ICMP
    Error { datagram: Datagram, error: IcmpError },
    /// The transport layer asked for something impossible
    Rejected(SendError),
    /// Sent out of an interface but never arrived
    Lost { datagram: Datagram, egress: Egress },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub time: SimTime,
    pub node: NodeId,
    pub record: Record,
}

#[derive(Debug, ThisError, Clone, PartialEq)]
pub enum InternetError {
    #[error("No node with id {0}")]
    UnknownNode(NodeId),
    #[error("No interface at {0}")]
    UnknownInterface(Port),
    #[error("{0} is already connected")]
    PortInUse(Port),
    #[error("A rate of {0} is not a probability")]
    InvalidRate(f64),
    #[error("{0}")]
    Interface(#[from] InterfaceError),
    #[error("{0}")]
    Route(#[from] RouteError),
}

struct Node {
    name: String,
    ipv4: Ipv4,
}

struct Wire {
    link: Link,
    ends: [Port; 2],
    crossed: u64,
}

impl Wire {
    fn far_end(&self, near: Port) -> Port {
        if self.ends[0] == near {
            self.ends[1]
        } else {
            self.ends[0]
        }
    }
}

struct Scheduled {
    time: SimTime,
    sequence: u64,
    node: NodeId,
    event: Event,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the heap pops the earliest event first
        (other.time, other.sequence).cmp(&(self.time, self.sequence))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

/// Routers, the links between them and the events still to happen.
pub struct Internet {
    nodes: Vec<Node>,
    wires: Vec<Wire>,
    ports: FxHashMap<Port, usize>,
    queue: BinaryHeap<Scheduled>,
    sequence: u64,
    now: SimTime,
    rng: SmallRng,
    trace: Vec<Trace>,
}

impl Internet {
    /// Creates an empty internet. `seed` drives link losses and bit errors.
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: vec![],
            wires: vec![],
            ports: Default::default(),
            queue: Default::default(),
            sequence: 0,
            now: SimTime::ZERO,
            rng: SmallRng::seed_from_u64(seed),
            trace: vec![],
        }
    }

    pub fn add_node(&mut self, name: impl Into<String>, ipv4: Ipv4) -> NodeId {
        self.nodes.push(Node {
            name: name.into(),
            ipv4,
        });
        self.nodes.len() - 1
    }

    /// Connects two interfaces. Each interface takes at most one link.
    pub fn connect(&mut self, a: Port, b: Port, link: Link) -> Result<(), InternetError> {
        link.validate()?;
        for port in [a, b] {
            let node = self.node_mut(port.node)?;
            if node.ipv4.table().interface(port.interface).is_none() {
                Err(InternetError::UnknownInterface(port))?
            }
            if self.ports.contains_key(&port) {
                Err(InternetError::PortInUse(port))?
            }
        }
        let index = self.wires.len();
        self.wires.push(Wire {
            link,
            ends: [a, b],
            crossed: 0,
        });
        self.ports.insert(a, index);
        self.ports.insert(b, index);
        Ok(())
    }

    /// Has the transport layer of `node` send `payload` at time `at`.
    pub fn send(
        &mut self,
        at: SimTime,
        node: NodeId,
        payload: Payload,
        info: SendInfo,
    ) -> Result<(), InternetError> {
        self.schedule(at, node, Event::FromTransport { payload, info })
    }

    /// Has `node` purge stale reassemblies at time `at`.
    pub fn purge(&mut self, at: SimTime, node: NodeId) -> Result<(), InternetError> {
        self.schedule(at, node, Event::Purge)
    }

    fn schedule(&mut self, time: SimTime, node: NodeId, event: Event) -> Result<(), InternetError> {
        self.node_mut(node)?;
        self.queue.push(Scheduled {
            time,
            sequence: self.sequence,
            node,
            event,
        });
        self.sequence += 1;
        Ok(())
    }

    /// Runs events until none are left, or until the next one would happen
    /// after `deadline`.
    pub fn run(&mut self, deadline: Option<SimTime>) -> ExitStatus {
        info!(nodes = self.nodes.len(), links = self.wires.len(), "Starting simulation");
        while let Some(next) = self.queue.peek() {
            if let Some(deadline) = deadline {
                if next.time > deadline {
                    self.now = deadline;
                    info!(pending = self.queue.len(), "Simulation timed out");
                    return ExitStatus::TimedOut;
                }
            }
            let Some(Scheduled {
                time, node, event, ..
            }) = self.queue.pop()
            else {
                break;
            };
            self.now = time;
            self.dispatch(node, event);
        }
        info!(now = ?self.now, "Simulation completed");
        ExitStatus::Completed
    }

    fn dispatch(&mut self, id: NodeId, event: Event) {
        let now = self.now;
        let mut recorder = Recorder::new();
        let Some(target) = self.nodes.get_mut(id) else {
            return;
        };
        if let Err(e) = node::handle(&mut target.ipv4, now, event, &mut recorder) {
            warn!(node = %target.name, "Rejected transport data: {e}");
            self.record(id, Record::Rejected(e));
        }

        for (datagram, egress) in recorder.sent {
            self.transmit(Port::new(id, egress.interface), datagram, egress);
        }
        for (datagram, arrival) in recorder.delivered {
            self.record(id, Record::Delivered { datagram, arrival });
        }
        for (datagram, error) in recorder.errors {
            debug!(node = id, %error, "ICMP error");
            self.record(id, Record::Error { datagram, error });
        }
    }

    fn transmit(&mut self, from: Port, mut datagram: Datagram, egress: Egress) {
        let Some(wire) = self.ports.get(&from).and_then(|i| self.wires.get_mut(*i)) else {
            warn!(%from, "Interface is not connected");
            self.record(from.node, Record::Lost { datagram, egress });
            return;
        };
        let index = wire.crossed;
        wire.crossed += 1;
        let to = wire.far_end(from);
        let time = self.now + wire.link.delay;
        let lost =
            wire.link.drops.contains(&index) || self.rng.gen_bool(wire.link.loss_rate);
        let corrupted = self.rng.gen_bool(wire.link.bit_error_rate);

        if lost {
            debug!(%from, %to, index, "Datagram lost");
            self.record(from.node, Record::Lost { datagram, egress });
            return;
        }
        if corrupted {
            datagram = datagram.with_bit_error();
        }
        trace!(%from, %to, next_hop = %egress.next_hop, "Datagram crossing link");
        self.queue.push(Scheduled {
            time,
            sequence: self.sequence,
            node: to.node,
            event: Event::FromNetwork {
                datagram,
                arrival: to.interface,
            },
        });
        self.sequence += 1;
    }

    fn record(&mut self, node: NodeId, record: Record) {
        self.trace.push(Trace {
            time: self.now,
            node,
            record,
        });
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, InternetError> {
        self.nodes.get_mut(id).ok_or(InternetError::UnknownNode(id))
    }

    /// The time of the last event handled.
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn router(&self, id: NodeId) -> Option<&Ipv4> {
        self.nodes.get(id).map(|node| &node.ipv4)
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id).map(|node| node.name.as_str())
    }

    /// Every node's name and counters, in the order they were added.
    pub fn stats(&self) -> impl Iterator<Item = (&str, Stats)> {
        self.nodes
            .iter()
            .map(|node| (node.name.as_str(), node.ipv4.stats()))
    }

    pub fn trace(&self) -> &[Trace] {
        &self.trace
    }

    /// Datagrams handed to the transport layer of `node`.
    pub fn delivered(&self, node: NodeId) -> Vec<&Datagram> {
        self.records(node)
            .filter_map(|record| match record {
                Record::Delivered { datagram, .. } => Some(datagram),
                _ => None,
            })
            .collect()
    }

    /// Errors `node` handed to ICMP.
    pub fn errors(&self, node: NodeId) -> Vec<IcmpError> {
        self.records(node)
            .filter_map(|record| match record {
                Record::Error { error, .. } => Some(*error),
                _ => None,
            })
            .collect()
    }

    pub fn rejected(&self, node: NodeId) -> Vec<SendError> {
        self.records(node)
            .filter_map(|record| match record {
                Record::Rejected(e) => Some(*e),
                _ => None,
            })
            .collect()
    }

    /// How many datagrams never made it across a link.
    pub fn lost(&self) -> usize {
        self.trace
            .iter()
            .filter(|t| matches!(t.record, Record::Lost { .. }))
            .count()
    }

    fn records(&self, node: NodeId) -> impl Iterator<Item = &Record> {
        self.trace
            .iter()
            .filter(move |t| t.node == node)
            .map(|t| &t.record)
    }
}
