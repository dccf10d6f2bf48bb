use super::routing_table::RouteLookup;
use std::time::Duration;

/// Tunable behavior of an [`Ipv4`](super::Ipv4) router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Config {
    /// Time to live for unicast datagrams when the sender does not choose one
    pub default_ttl: u8,
    /// Time to live for multicast datagrams when the sender does not choose
    /// one
    pub default_multicast_ttl: u8,
    /// How long an incomplete reassembly may go without a new fragment
    pub fragment_timeout: Duration,
    /// Minimum simulated time between two automatic purges of the
    /// reassembly buffer
    pub purge_interval: Duration,
    /// Whether datagrams for other nodes are routed onward
    pub forwarding: bool,
    /// Whether limited broadcasts from the transport layer without an
    /// explicit interface go out of every non-loopback interface
    pub force_broadcast: bool,
    pub route_lookup: RouteLookup,
    /// Seeds the generator that decides whether a bit error hit the header
    pub seed: u64,
}

impl Default for Ipv4Config {
    fn default() -> Self {
        Self {
            default_ttl: 32,
            default_multicast_ttl: 1,
            fragment_timeout: Duration::from_secs(60),
            purge_interval: Duration::from_secs(10),
            forwarding: true,
            force_broadcast: false,
            route_lookup: RouteLookup::LongestPrefix,
            seed: 0xBAD5EED,
        }
    }
}

impl Ipv4Config {
    /// The configuration of an end host: like the default, but datagrams
    /// addressed elsewhere are dropped.
    pub fn host() -> Self {
        Self {
            forwarding: false,
            ..Default::default()
        }
    }

    pub fn default_ttl(mut self, ttl: u8) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_multicast_ttl(mut self, ttl: u8) -> Self {
        self.default_multicast_ttl = ttl;
        self
    }

    pub fn fragment_timeout(mut self, timeout: Duration) -> Self {
        self.fragment_timeout = timeout;
        self
    }

    pub fn purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }

    pub fn forwarding(mut self, forwarding: bool) -> Self {
        self.forwarding = forwarding;
        self
    }

    pub fn force_broadcast(mut self, force_broadcast: bool) -> Self {
        self.force_broadcast = force_broadcast;
        self
    }

    pub fn route_lookup(mut self, lookup: RouteLookup) -> Self {
        self.route_lookup = lookup;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Counters kept by each router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Datagrams (or fragments) handed to local delivery
    pub local_deliveries: u64,
    /// Unicast datagrams routed out of an interface
    pub forwarded: u64,
    /// Multicast datagrams routed
    pub multicast: u64,
    pub dropped: u64,
    /// Datagrams without a route to their destination
    pub unroutable: u64,
    pub fragments_created: u64,
    pub reassembled: u64,
    pub reassembly_timeouts: u64,
}
