//! Read-only queries against the authoritative network topology.
//!
//! The reconciler never caches topology: every query reflects the state at
//! call time, which during a precommit hook still includes the object being
//! removed.

mod memory;
mod redis;

pub use self::memory::MemoryTopology;
pub use self::redis::RedisTopology;

use async_trait::async_trait;
use bgpvpn_common::{Bgpvpn, DriverResult, Port, Router, Subnet};

/// Filter on port listings. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortFilter {
    pub device_id: Option<String>,
    pub device_owner: Option<String>,
    pub network_id: Option<String>,
}

impl PortFilter {
    /// Router interfaces owned by `router_id`
    pub fn router_interfaces_of(router_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(router_id.into()),
            device_owner: Some(bgpvpn_common::types::DEVICE_OWNER_ROUTER_INTF.to_string()),
            network_id: None,
        }
    }

    /// Router interfaces attached to `network_id`
    pub fn router_interfaces_on(network_id: impl Into<String>) -> Self {
        Self {
            device_id: None,
            device_owner: Some(bgpvpn_common::types::DEVICE_OWNER_ROUTER_INTF.to_string()),
            network_id: Some(network_id.into()),
        }
    }

    pub fn matches(&self, port: &Port) -> bool {
        fn check(want: &Option<String>, have: &str) -> bool {
            want.as_deref().map_or(true, |w| w == have)
        }
        check(&self.device_id, &port.device_id)
            && check(&self.device_owner, &port.device_owner)
            && check(&self.network_id, &port.network_id)
    }
}

/// Filter on BGPVPN listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BgpvpnFilter {
    #[default]
    All,
    /// BGPVPNs associated with any of these networks
    Networks(Vec<String>),
    /// BGPVPNs associated with any of these routers
    Routers(Vec<String>),
}

impl BgpvpnFilter {
    pub fn network(network_id: impl Into<String>) -> Self {
        Self::Networks(vec![network_id.into()])
    }

    pub fn router(router_id: impl Into<String>) -> Self {
        Self::Routers(vec![router_id.into()])
    }

    pub fn matches(&self, bgpvpn: &Bgpvpn) -> bool {
        match self {
            Self::All => true,
            Self::Networks(ids) => ids.iter().any(|n| bgpvpn.has_network(n)),
            Self::Routers(ids) => ids.iter().any(|r| bgpvpn.has_router(r)),
        }
    }
}

/// Topology query facade.
#[async_trait]
pub trait TopologyQuery: Send + Sync {
    async fn get_router(&self, router_id: &str) -> DriverResult<Option<Router>>;

    async fn list_ports(&self, filter: &PortFilter) -> DriverResult<Vec<Port>>;

    async fn get_subnet(&self, subnet_id: &str) -> DriverResult<Option<Subnet>>;

    async fn get_bgpvpn(&self, bgpvpn_id: &str) -> DriverResult<Option<Bgpvpn>>;

    async fn list_bgpvpns(&self, filter: &BgpvpnFilter) -> DriverResult<Vec<Bgpvpn>>;
}
