use super::{
    datagram::Datagram, icmp::IcmpError, interfaces::InterfaceId, Egress, ErrorSignal, LinkOutput,
    Upstream,
};

/// Collaborators that keep everything handed to them, in order. Useful for
/// inspecting what a router did with a datagram.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    pub sent: Vec<(Datagram, Egress)>,
    pub delivered: Vec<(Datagram, Option<InterfaceId>)>,
    pub errors: Vec<(Datagram, IcmpError)>,
}

impl Recorder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Whether nothing at all was handed over.
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty() && self.delivered.is_empty() && self.errors.is_empty()
    }

    /// Only the error kinds, for brief assertions.
    pub fn error_kinds(&self) -> Vec<IcmpError> {
        self.errors.iter().map(|(_, error)| *error).collect()
    }
}

impl LinkOutput for Recorder {
    fn send_to_output(&mut self, datagram: Datagram, egress: Egress) {
        self.sent.push((datagram, egress));
    }
}

impl Upstream for Recorder {
    fn deliver(&mut self, datagram: Datagram, arrival: Option<InterfaceId>) {
        self.delivered.push((datagram, arrival));
    }
}

impl ErrorSignal for Recorder {
    fn signal_error(&mut self, datagram: Datagram, error: IcmpError) {
        self.errors.push((datagram, error));
    }
}
