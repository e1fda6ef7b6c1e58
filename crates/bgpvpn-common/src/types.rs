//! BGPVPN service-model records and the topology objects they attach to

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// Name under which this driver reports validation errors
pub const OVN_DRIVER_NAME: &str = "ovn";

/// VNI domain (24-bit VXLAN segment id, 0 reserved)
pub const VNI_MIN: u32 = 1;
pub const VNI_MAX: u32 = 16_777_215;

/// Device owner of ports that attach a network to a router
pub const DEVICE_OWNER_ROUTER_INTF: &str = "network:router_interface";

/// BGPVPN flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BgpvpnType {
    /// EVPN-VPLS (layer 2)
    L2,
    /// EVPN-VRF with type-5 routes (layer 3)
    L3,
}

impl BgpvpnType {
    /// Returns the type as written to the metadata store
    pub fn as_str(&self) -> &'static str {
        match self {
            BgpvpnType::L2 => "l2",
            BgpvpnType::L3 => "l3",
        }
    }
}

impl fmt::Display for BgpvpnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BgpvpnType {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("l2") {
            Ok(BgpvpnType::L2)
        } else if s.eq_ignore_ascii_case("l3") {
            Ok(BgpvpnType::L3)
        } else {
            Err(DriverError::unsupported_type(OVN_DRIVER_NAME, s))
        }
    }
}

/// A BGPVPN resource snapshot as delivered by the API layer.
///
/// `vpn_type` is kept as the raw string received so that an unsupported
/// value can be reported instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bgpvpn {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub vpn_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vni: Option<u32>,
    #[serde(default)]
    pub route_targets: Vec<String>,
    #[serde(default)]
    pub import_targets: Vec<String>,
    #[serde(default)]
    pub export_targets: Vec<String>,
    #[serde(default)]
    pub route_distinguishers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_pref: Option<u32>,
    /// Networks currently associated
    #[serde(default)]
    pub networks: Vec<String>,
    /// Routers currently associated
    #[serde(default)]
    pub routers: Vec<String>,
    /// Ports currently associated
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub tenant_id: String,
}

impl Bgpvpn {
    /// Create a new BGPVPN snapshot with no attributes besides its type
    pub fn new(id: impl Into<String>, vpn_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            vpn_type: vpn_type.into(),
            vni: None,
            route_targets: Vec::new(),
            import_targets: Vec::new(),
            export_targets: Vec::new(),
            route_distinguishers: Vec::new(),
            local_pref: None,
            networks: Vec::new(),
            routers: Vec::new(),
            ports: Vec::new(),
            project_id: String::new(),
            tenant_id: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_vni(mut self, vni: u32) -> Self {
        self.vni = Some(vni);
        self
    }

    pub fn with_route_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.route_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_import_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.import_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_export_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.export_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_route_distinguishers<I, S>(mut self, rds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.route_distinguishers = rds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_local_pref(mut self, local_pref: u32) -> Self {
        self.local_pref = Some(local_pref);
        self
    }

    pub fn with_network(mut self, network_id: impl Into<String>) -> Self {
        self.networks.push(network_id.into());
        self
    }

    pub fn with_router(mut self, router_id: impl Into<String>) -> Self {
        self.routers.push(router_id.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        self.tenant_id = project_id.clone();
        self.project_id = project_id;
        self
    }

    /// Parse the raw type string
    pub fn bgpvpn_type(&self) -> Result<BgpvpnType, DriverError> {
        self.vpn_type.parse()
    }

    /// Returns true if the network is directly associated
    pub fn has_network(&self, network_id: &str) -> bool {
        self.networks.iter().any(|n| n == network_id)
    }

    /// Returns true if the router is associated
    pub fn has_router(&self, router_id: &str) -> bool {
        self.routers.iter().any(|r| r == router_id)
    }
}

/// Links a BGPVPN to a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAssociation {
    #[serde(default)]
    pub id: String,
    pub bgpvpn_id: String,
    pub network_id: String,
}

impl NetworkAssociation {
    pub fn new(bgpvpn_id: impl Into<String>, network_id: impl Into<String>) -> Self {
        let bgpvpn_id = bgpvpn_id.into();
        let network_id = network_id.into();
        Self {
            id: format!("{}-{}", bgpvpn_id, network_id),
            bgpvpn_id,
            network_id,
        }
    }
}

/// Links a BGPVPN to a router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterAssociation {
    #[serde(default)]
    pub id: String,
    pub bgpvpn_id: String,
    pub router_id: String,
    /// Consumed by the data-plane agent, carried through unchanged
    #[serde(default)]
    pub advertise_extra_routes: bool,
}

impl RouterAssociation {
    pub fn new(bgpvpn_id: impl Into<String>, router_id: impl Into<String>) -> Self {
        let bgpvpn_id = bgpvpn_id.into();
        let router_id = router_id.into();
        Self {
            id: format!("{}-{}", bgpvpn_id, router_id),
            bgpvpn_id,
            router_id,
            advertise_extra_routes: false,
        }
    }
}

/// Links a BGPVPN to a port (routes-control extension)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAssociation {
    #[serde(default)]
    pub id: String,
    pub bgpvpn_id: String,
    pub port_id: String,
    #[serde(default)]
    pub advertise_fixed_ips: bool,
}

/// Router as exposed by the topology store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Port as exposed by the topology store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub network_id: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_owner: String,
    /// Subnets of the port's fixed IPs
    #[serde(default)]
    pub subnet_ids: Vec<String>,
}

impl Port {
    /// Create a router interface port
    pub fn router_interface(
        id: impl Into<String>,
        router_id: impl Into<String>,
        network_id: impl Into<String>,
        subnet_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            network_id: network_id.into(),
            device_id: router_id.into(),
            device_owner: DEVICE_OWNER_ROUTER_INTF.to_string(),
            subnet_ids: vec![subnet_id.into()],
        }
    }

    pub fn is_router_interface(&self) -> bool {
        self.device_owner == DEVICE_OWNER_ROUTER_INTF
    }

    /// Returns true if the port carries an address on `subnet_id`.
    ///
    /// A port without fixed IP information matches every subnet.
    pub fn on_subnet(&self, subnet_id: &str) -> bool {
        self.subnet_ids.is_empty() || self.subnet_ids.iter().any(|s| s == subnet_id)
    }
}

/// Subnet as exposed by the topology store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub network_id: String,
}
