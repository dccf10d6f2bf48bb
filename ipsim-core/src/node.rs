//! Runs one node's network layer as a tokio task.
//!
//! A node owns its [`Ipv4`] router outright. Events reach it through an
//! unbounded channel and are handled strictly one at a time in the order they
//! were sent, so the router's state never needs a lock. Everything the router
//! hands to its collaborators comes back out of a second channel as an
//! [`Output`].

use crate::{
    payload::Payload,
    protocols::ipv4::{
        datagram::Datagram, icmp::IcmpError, interfaces::InterfaceId, Collaborators, Egress,
        ErrorSignal, Ipv4, LinkOutput, SendError, SendInfo, Upstream,
    },
    Shutdown, SimTime,
};
use thiserror::Error as ThisError;
use tokio::{sync::mpsc, task::JoinHandle};

/// Something for a node to handle, at a given simulated time.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub now: SimTime,
    pub event: Event,
}

/// Where an event came from.
#[derive(Debug, Clone)]
pub enum Event {
    /// Data from the transport layer to send
    FromTransport { payload: Payload, info: SendInfo },
    /// A datagram received on a link
    FromNetwork {
        datagram: Datagram,
        arrival: InterfaceId,
    },
    /// Time to discard stale reassemblies
    Purge,
}

/// What the node's router produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Sent(Datagram, Egress),
    Delivered(Datagram, Option<InterfaceId>),
    Error(Datagram, IcmpError),
    /// The transport layer asked for something impossible
    Rejected(SendError),
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum NodeError {
    #[error("The node is no longer running")]
    Stopped,
}

/// The sending side of a running node.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    events: mpsc::UnboundedSender<Envelope>,
}

impl NodeHandle {
    pub fn send(&self, now: SimTime, event: Event) -> Result<(), NodeError> {
        self.events
            .send(Envelope { now, event })
            .map_err(|_| NodeError::Stopped)
    }
}

/// Starts a task running `ipv4`. The task ends when `shutdown` fires or every
/// [`NodeHandle`] is dropped, and gives back the router so its state can be
/// inspected.
pub fn spawn(
    ipv4: Ipv4,
    shutdown: Shutdown,
) -> (
    NodeHandle,
    mpsc::UnboundedReceiver<Output>,
    JoinHandle<Ipv4>,
) {
    let (events_send, events_recv) = mpsc::unbounded_channel();
    let (outputs_send, outputs_recv) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(
        ipv4,
        events_recv,
        ChannelOutput(outputs_send),
        shutdown,
    ));
    (NodeHandle { events: events_send }, outputs_recv, task)
}

async fn run(
    mut ipv4: Ipv4,
    mut events: mpsc::UnboundedReceiver<Envelope>,
    mut output: ChannelOutput,
    mut shutdown: Shutdown,
) -> Ipv4 {
    loop {
        tokio::select! {
            biased;
            status = shutdown.wait_for_shutdown() => {
                tracing::debug!(?status, "Node shutting down");
                break;
            }
            envelope = events.recv() => match envelope {
                Some(Envelope { now, event }) => {
                    if let Err(e) = handle(&mut ipv4, now, event, &mut output) {
                        tracing::warn!("Rejected transport data: {e}");
                        output.push(Output::Rejected(e));
                    }
                }
                None => break,
            },
        }
    }
    ipv4
}

/// Hands one event to `ipv4`. Only transport data can be rejected, when the
/// request itself is impossible to carry out.
pub fn handle(
    ipv4: &mut Ipv4,
    now: SimTime,
    event: Event,
    collaborators: &mut impl Collaborators,
) -> Result<(), SendError> {
    match event {
        Event::FromTransport { payload, info } => {
            ipv4.handle_from_transport(payload, info, now, collaborators)?
        }
        Event::FromNetwork { datagram, arrival } => {
            ipv4.handle_from_network(datagram, arrival, now, collaborators)
        }
        Event::Purge => {
            ipv4.purge_stale_fragments(now, collaborators);
        }
    }
    Ok(())
}

/// Collaborators that forward everything into a channel.
struct ChannelOutput(mpsc::UnboundedSender<Output>);

impl ChannelOutput {
    fn push(&mut self, output: Output) {
        if self.0.send(output).is_err() {
            tracing::trace!("Node output receiver dropped");
        }
    }
}

impl LinkOutput for ChannelOutput {
    fn send_to_output(&mut self, datagram: Datagram, egress: Egress) {
        self.push(Output::Sent(datagram, egress))
    }
}

impl Upstream for ChannelOutput {
    fn deliver(&mut self, datagram: Datagram, arrival: Option<InterfaceId>) {
        self.push(Output::Delivered(datagram, arrival))
    }
}

impl ErrorSignal for ChannelOutput {
    fn signal_error(&mut self, datagram: Datagram, error: IcmpError) {
        self.push(Output::Error(datagram, error))
    }
}
