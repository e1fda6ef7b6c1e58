//! BGPVPN driver for OVN-style logical switches
//!
//! Propagates BGPVPN EVPN configuration (type, VNI, route targets, ...) into
//! the `external_ids` metadata of the logical switches backing associated
//! networks, where a data-plane agent picks it up.

pub mod config;
pub mod events;
pub mod queue;
pub mod reconciler;
pub mod store;
pub mod tables;
pub mod topology;

pub use config::DriverConfig;
pub use events::{EventBus, EventHandler, LifecycleEvent, Phase};
pub use queue::RedisEventQueue;
pub use reconciler::{validate_bgpvpn, AssociationReconciler, Departing, ReconcileReport};
pub use store::{
    ExternalIdsOp, LogicalSwitch, MemoryBackend, MetadataBackend, MetadataStoreClient,
    RedisBackend,
};
pub use topology::{BgpvpnFilter, MemoryTopology, PortFilter, RedisTopology, TopologyQuery};
