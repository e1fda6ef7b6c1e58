//! In-process topology, mutated directly by the caller.

use async_trait::async_trait;
use bgpvpn_common::{Bgpvpn, DriverResult, Port, Router, Subnet};
use parking_lot::RwLock;

use super::{BgpvpnFilter, PortFilter, TopologyQuery};

#[derive(Debug, Default)]
struct State {
    routers: Vec<Router>,
    ports: Vec<Port>,
    subnets: Vec<Subnet>,
    bgpvpns: Vec<Bgpvpn>,
}

/// Topology held in memory. Listings keep insertion order.
#[derive(Debug, Default)]
pub struct MemoryTopology {
    state: RwLock<State>,
}

fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T) -> bool) {
    match items.iter_mut().find(|i| same(i)) {
        Some(slot) => *slot = item,
        None => items.push(item),
    }
}

impl MemoryTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_router(&self, router_id: &str) {
        let router = Router {
            id: router_id.to_string(),
            name: String::new(),
        };
        upsert(&mut self.state.write().routers, router, |r| r.id == router_id);
    }

    pub fn remove_router(&self, router_id: &str) {
        self.state.write().routers.retain(|r| r.id != router_id);
    }

    pub fn add_subnet(&self, subnet_id: &str, network_id: &str) {
        let subnet = Subnet {
            id: subnet_id.to_string(),
            network_id: network_id.to_string(),
        };
        upsert(&mut self.state.write().subnets, subnet, |s| s.id == subnet_id);
    }

    pub fn add_port(&self, port: Port) {
        let id = port.id.clone();
        upsert(&mut self.state.write().ports, port, |p| p.id == id);
    }

    pub fn remove_port(&self, port_id: &str) {
        self.state.write().ports.retain(|p| p.id != port_id);
    }

    /// Inserts or replaces a BGPVPN snapshot, associations included
    pub fn put_bgpvpn(&self, bgpvpn: Bgpvpn) {
        let id = bgpvpn.id.clone();
        upsert(&mut self.state.write().bgpvpns, bgpvpn, |b| b.id == id);
    }

    pub fn remove_bgpvpn(&self, bgpvpn_id: &str) {
        self.state.write().bgpvpns.retain(|b| b.id != bgpvpn_id);
    }

    pub fn associate_network(&self, bgpvpn_id: &str, network_id: &str) {
        self.with_bgpvpn(bgpvpn_id, |b| {
            if !b.has_network(network_id) {
                b.networks.push(network_id.to_string());
            }
        });
    }

    pub fn dissociate_network(&self, bgpvpn_id: &str, network_id: &str) {
        self.with_bgpvpn(bgpvpn_id, |b| b.networks.retain(|n| n != network_id));
    }

    pub fn associate_router(&self, bgpvpn_id: &str, router_id: &str) {
        self.with_bgpvpn(bgpvpn_id, |b| {
            if !b.has_router(router_id) {
                b.routers.push(router_id.to_string());
            }
        });
    }

    pub fn dissociate_router(&self, bgpvpn_id: &str, router_id: &str) {
        self.with_bgpvpn(bgpvpn_id, |b| b.routers.retain(|r| r != router_id));
    }

    fn with_bgpvpn(&self, bgpvpn_id: &str, f: impl FnOnce(&mut Bgpvpn)) {
        if let Some(b) = self
            .state
            .write()
            .bgpvpns
            .iter_mut()
            .find(|b| b.id == bgpvpn_id)
        {
            f(b);
        }
    }
}

#[async_trait]
impl TopologyQuery for MemoryTopology {
    async fn get_router(&self, router_id: &str) -> DriverResult<Option<Router>> {
        Ok(self
            .state
            .read()
            .routers
            .iter()
            .find(|r| r.id == router_id)
            .cloned())
    }

    async fn list_ports(&self, filter: &PortFilter) -> DriverResult<Vec<Port>> {
        Ok(self
            .state
            .read()
            .ports
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn get_subnet(&self, subnet_id: &str) -> DriverResult<Option<Subnet>> {
        Ok(self
            .state
            .read()
            .subnets
            .iter()
            .find(|s| s.id == subnet_id)
            .cloned())
    }

    async fn get_bgpvpn(&self, bgpvpn_id: &str) -> DriverResult<Option<Bgpvpn>> {
        Ok(self
            .state
            .read()
            .bgpvpns
            .iter()
            .find(|b| b.id == bgpvpn_id)
            .cloned())
    }

    async fn list_bgpvpns(&self, filter: &BgpvpnFilter) -> DriverResult<Vec<Bgpvpn>> {
        Ok(self
            .state
            .read()
            .bgpvpns
            .iter()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect())
    }
}
