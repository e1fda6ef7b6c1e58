//! Database table name constants for bgpvpn-ovnd

// Metadata store
/// Logical switch table
pub const LOGICAL_SWITCH_TABLE_NAME: &str = "LOGICAL_SWITCH";

/// Prefix of a logical switch name derived from a network id
pub const LOGICAL_SWITCH_PREFIX: &str = "neutron-";

/// Suffix of the hash holding a row's external_ids
pub const EXTERNAL_IDS_SUFFIX: &str = "external_ids";

/// Separator between table name and key
pub const TABLE_SEPARATOR: char = '|';

// Topology mirror
/// BGPVPN table
pub const TOPO_BGPVPN_TABLE_NAME: &str = "BGPVPN";

/// Router table
pub const TOPO_ROUTER_TABLE_NAME: &str = "ROUTER";

/// Port table
pub const TOPO_PORT_TABLE_NAME: &str = "PORT";

/// Subnet table
pub const TOPO_SUBNET_TABLE_NAME: &str = "SUBNET";

// Event delivery
/// List holding JSON-encoded lifecycle events
pub const EVENT_QUEUE_KEY: &str = "BGPVPN_EVENTS";

/// Field names used in the metadata store and topology mirror
pub mod fields {
    /// Row uuid column of a logical switch
    pub const UUID: &str = "_uuid";

    /// Row name column of a logical switch
    pub const NAME: &str = "name";

    /// Network of a port or subnet
    pub const NETWORK_ID: &str = "network_id";

    /// Owning device of a port
    pub const DEVICE_ID: &str = "device_id";

    /// Owner role of a port
    pub const DEVICE_OWNER: &str = "device_owner";

    /// Subnets of a port (JSON array)
    pub const SUBNET_IDS: &str = "subnet_ids";

    /// Associated networks of a BGPVPN (JSON array)
    pub const NETWORKS: &str = "networks";

    /// Associated routers of a BGPVPN (JSON array)
    pub const ROUTERS: &str = "routers";

    /// Associated ports of a BGPVPN (JSON array)
    pub const PORTS: &str = "ports";

    /// Owning project
    pub const PROJECT_ID: &str = "project_id";

    /// Owning tenant
    pub const TENANT_ID: &str = "tenant_id";
}
