//! The address and route table of a node.
//!
//! Holds the node's interfaces, its unicast routes, its multicast routes and
//! the forwarding switch. The router only ever reads from it while handling
//! datagrams; routes change during configuration.

use super::{
    interfaces::{Interface, InterfaceId, Mtu},
    subnetting::{Ipv4Mask, Ipv4Net},
    Ipv4Address,
};
use std::collections::BTreeMap;

/// A prefix-indexed table. Lookups try each known mask from the longest to
/// the shortest, so a match costs one map probe per distinct prefix length.
#[derive(Debug, Clone)]
pub struct IpTable<T> {
    table: BTreeMap<Ipv4Net, T>,
    /// How many entries use each mask
    masks: BTreeMap<Ipv4Mask, u32>,
    /// Insertion order, for first-match lookups
    order: Vec<Ipv4Net>,
}

impl<T> Default for IpTable<T> {
    fn default() -> Self {
        Self {
            table: Default::default(),
            masks: Default::default(),
            order: Default::default(),
        }
    }
}

impl<T> IpTable<T> {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds an entry for `net`, returning the entry it replaced.
    pub fn add(&mut self, net: Ipv4Net, value: T) -> Option<T> {
        let previous = self.table.insert(net, value);
        if previous.is_none() {
            *self.masks.entry(net.mask()).or_insert(0) += 1;
            self.order.push(net);
        }
        previous
    }

    pub fn remove(&mut self, net: Ipv4Net) -> Option<T> {
        let removed = self.table.remove(&net)?;
        if let Some(count) = self.masks.get_mut(&net.mask()) {
            *count -= 1;
            if *count == 0 {
                self.masks.remove(&net.mask());
            }
        }
        self.order.retain(|entry| *entry != net);
        Some(removed)
    }

    pub fn get(&self, net: Ipv4Net) -> Option<&T> {
        self.table.get(&net)
    }

    /// The entry with the longest prefix containing `address`.
    pub fn longest_match(&self, address: Ipv4Address) -> Option<&T> {
        self.masks
            .keys()
            .rev()
            .find_map(|mask| self.table.get(&Ipv4Net::new(address, *mask)))
    }

    /// The earliest inserted entry containing `address`.
    pub fn first_match(&self, address: Ipv4Address) -> Option<&T> {
        self.order
            .iter()
            .find(|net| net.contains(address))
            .and_then(|net| self.table.get(net))
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Ipv4Net, &T)> {
        self.order
            .iter()
            .filter_map(|net| self.table.get(net).map(|value| (*net, value)))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// How a unicast destination is matched against the route list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteLookup {
    /// The most specific route wins
    #[default]
    LongestPrefix,
    /// The first route added that contains the destination wins, regardless
    /// of prefix length
    FirstMatch,
}

/// A unicast route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub net: Ipv4Net,
    /// `None` for directly attached networks
    pub gateway: Option<Ipv4Address>,
    pub interface: InterfaceId,
    pub metric: u32,
}

impl Route {
    /// A route to a directly attached network.
    pub fn direct(net: Ipv4Net, interface: InterfaceId) -> Self {
        Self {
            net,
            gateway: None,
            interface,
            metric: 0,
        }
    }

    /// A route through a gateway.
    pub fn via(net: Ipv4Net, gateway: Ipv4Address, interface: InterfaceId) -> Self {
        Self {
            net,
            gateway: Some(gateway),
            interface,
            metric: 1,
        }
    }
}

/// A route for a range of multicast groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulticastRoute {
    pub groups: Ipv4Net,
    pub interface: InterfaceId,
    pub gateway: Option<Ipv4Address>,
}

/// Where a route lookup says to send a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NextHop {
    pub interface: InterfaceId,
    pub gateway: Option<Ipv4Address>,
}

/// Interfaces and routes of one node.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    interfaces: Vec<Interface>,
    routes: IpTable<Route>,
    multicast_routes: Vec<MulticastRoute>,
    forwarding: bool,
    lookup: RouteLookup,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self {
            interfaces: vec![],
            routes: IpTable::new(),
            multicast_routes: vec![],
            forwarding: false,
            lookup: RouteLookup::default(),
        }
    }
}

impl RoutingTable {
    /// Creates an empty table with forwarding disabled, as for a host.
    pub fn new() -> Self {
        Default::default()
    }

    /// Enables or disables forwarding of datagrams not addressed to this node.
    pub fn set_forwarding(&mut self, forwarding: bool) {
        self.forwarding = forwarding;
    }

    pub fn forwarding_enabled(&self) -> bool {
        self.forwarding
    }

    pub fn set_lookup(&mut self, lookup: RouteLookup) {
        self.lookup = lookup;
    }

    pub fn lookup(&self) -> RouteLookup {
        self.lookup
    }

    /// Adds an interface and a direct route to the network it is attached to.
    pub fn add_interface(&mut self, interface: Interface) -> Result<(), RouteError> {
        if self.interface(interface.id()).is_some() {
            Err(RouteError::DuplicateInterface(interface.id()))?
        }
        let network = interface.network();
        let id = interface.id();
        self.interfaces.push(interface);
        if self.routes.get(network).is_none() {
            self.routes.add(network, Route::direct(network, id));
        }
        Ok(())
    }

    /// Adds or replaces the route for `route.net`.
    pub fn add_route(&mut self, route: Route) -> Result<Option<Route>, RouteError> {
        self.check_interface(route.interface)?;
        Ok(self.routes.add(route.net, route))
    }

    pub fn remove_route(&mut self, net: Ipv4Net) -> Option<Route> {
        self.routes.remove(net)
    }

    /// Installs the `0.0.0.0/0` route.
    pub fn set_default_route(
        &mut self,
        gateway: Ipv4Address,
        interface: InterfaceId,
    ) -> Result<Option<Route>, RouteError> {
        self.add_route(Route::via(Ipv4Net::DEFAULT, gateway, interface))
    }

    pub fn add_multicast_route(&mut self, route: MulticastRoute) -> Result<(), RouteError> {
        self.check_interface(route.interface)?;
        self.multicast_routes.push(route);
        Ok(())
    }

    fn check_interface(&self, id: InterfaceId) -> Result<(), RouteError> {
        match self.interface(id) {
            Some(_) => Ok(()),
            None => Err(RouteError::UnknownInterface(id)),
        }
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter()
    }

    pub fn num_interfaces(&self) -> usize {
        self.interfaces.len()
    }

    pub fn interface(&self, id: InterfaceId) -> Option<&Interface> {
        self.interfaces.iter().find(|interface| interface.id() == id)
    }

    pub fn interface_mtu(&self, id: InterfaceId) -> Option<Mtu> {
        self.interface(id).map(Interface::mtu)
    }

    pub fn interface_by_address(&self, address: Ipv4Address) -> Option<&Interface> {
        self.interfaces
            .iter()
            .find(|interface| interface.address() == address)
    }

    /// Whether `address` belongs to one of this node's interfaces.
    pub fn is_local_address(&self, address: Ipv4Address) -> bool {
        self.interface_by_address(address).is_some()
    }

    /// Whether `address` is the directed broadcast address of a network this
    /// node is attached to through a broadcast-capable interface.
    pub fn is_local_broadcast(&self, address: Ipv4Address) -> bool {
        self.interfaces.iter().any(|interface| {
            interface.flags().broadcast && interface.broadcast_address() == address
        })
    }

    /// Whether any interface has joined the multicast `group`.
    pub fn is_local_multicast(&self, group: Ipv4Address) -> bool {
        self.interfaces
            .iter()
            .any(|interface| interface.is_member_of(group))
    }

    /// Picks the route for a unicast destination according to the configured
    /// [`RouteLookup`].
    pub fn find_best_route(&self, destination: Ipv4Address) -> Option<NextHop> {
        let route = match self.lookup {
            RouteLookup::LongestPrefix => self.routes.longest_match(destination),
            RouteLookup::FirstMatch => self.routes.first_match(destination),
        }?;
        Some(NextHop {
            interface: route.interface,
            gateway: route.gateway,
        })
    }

    /// The interface this node would use to reach `address`.
    pub fn interface_towards(&self, address: Ipv4Address) -> Option<InterfaceId> {
        self.find_best_route(address).map(|hop| hop.interface)
    }

    /// Every interface a datagram for `group` should be copied to.
    pub fn multicast_routes_for(&self, group: Ipv4Address) -> Vec<NextHop> {
        self.multicast_routes
            .iter()
            .filter(|route| route.groups.contains(group))
            .map(|route| NextHop {
                interface: route.interface,
                gateway: route.gateway,
            })
            .collect()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().map(|(_, route)| route)
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("No interface with id {0}")]
    UnknownInterface(InterfaceId),
    #[error("An interface with id {0} already exists")]
    DuplicateInterface(InterfaceId),
}
