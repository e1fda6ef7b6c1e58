//! External-id keys carrying EVPN configuration on a logical switch

/// BGPVPN type (`l2` / `l3`)
pub const EVPN_TYPE: &str = "type";

/// VXLAN Network Identifier
pub const EVPN_VNI: &str = "vni";

/// BGP AS, taken from the first route target
pub const EVPN_BGP_AS: &str = "bgp_as";

/// Route targets (JSON array)
pub const EVPN_ROUTE_TARGETS: &str = "route_targets";

/// Import route targets (JSON array)
pub const EVPN_IMPORT_TARGETS: &str = "import_targets";

/// Export route targets (JSON array)
pub const EVPN_EXPORT_TARGETS: &str = "export_targets";

/// Route distinguishers (JSON array)
pub const EVPN_ROUTE_DISTINGUISHERS: &str = "route_distinguishers";

/// BGP local preference (decimal)
pub const EVPN_LOCAL_PREF: &str = "local_pref";

/// Every key the codec may emit.
pub const EVPN_KEYS: [&str; 8] = [
    EVPN_TYPE,
    EVPN_VNI,
    EVPN_BGP_AS,
    EVPN_ROUTE_TARGETS,
    EVPN_IMPORT_TARGETS,
    EVPN_EXPORT_TARGETS,
    EVPN_ROUTE_DISTINGUISHERS,
    EVPN_LOCAL_PREF,
];
