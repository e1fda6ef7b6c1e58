//! Test fixtures for BGPVPN driver scenarios
//!
//! Provides reusable BGPVPNs, lifecycle events and an in-memory scenario
//! wiring topology, metadata store, reconciler and event bus together.

use std::sync::Arc;

use bgpvpn_common::{Bgpvpn, DriverResult, Port};
use bgpvpn_ovnd::{
    AssociationReconciler, EventBus, LifecycleEvent, MemoryBackend, MemoryTopology,
    MetadataBackend, MetadataStoreClient,
};

use crate::fakes::{CountingBackend, FailingBackend};
use crate::verification::MetadataVerifier;

/// Common BGPVPN fixtures
pub mod bgpvpn_fixtures {
    use super::*;

    /// L3 BGPVPN with a single route target `<asn>:<vni>`
    pub fn l3(id: &str, asn: u32, vni: u32) -> Bgpvpn {
        Bgpvpn::new(id, "l3")
            .with_vni(vni)
            .with_route_targets([format!("{}:{}", asn, vni)])
    }

    /// L2 BGPVPN without route targets
    pub fn l2(id: &str, vni: u32) -> Bgpvpn {
        Bgpvpn::new(id, "l2").with_vni(vni)
    }

    /// L3 BGPVPN carrying every optional attribute
    pub fn l3_full(id: &str) -> Bgpvpn {
        Bgpvpn::new(id, "l3")
            .with_name("full")
            .with_vni(4242)
            .with_route_targets(["64512:1", "64512:2"])
            .with_import_targets(["64512:10"])
            .with_export_targets(["64512:20"])
            .with_route_distinguishers(["10.0.0.1:100"])
            .with_local_pref(150)
    }

    /// `{id: v1, type: L3, vni: 5000, route_targets: [65000:1]}`
    pub fn v1() -> Bgpvpn {
        Bgpvpn::new("v1", "L3")
            .with_vni(5000)
            .with_route_targets(["65000:1"])
    }
}

/// Lifecycle event fixtures
pub mod event_fixtures {
    use super::*;
    use bgpvpn_common::{NetworkAssociation, RouterAssociation};
    use bgpvpn_ovnd::Phase;

    pub fn create_bgpvpn(phase: Phase, bgpvpn: &Bgpvpn) -> LifecycleEvent {
        LifecycleEvent::BgpvpnCreate {
            phase,
            bgpvpn: bgpvpn.clone(),
        }
    }

    pub fn update_bgpvpn(phase: Phase, old: &Bgpvpn, new: &Bgpvpn) -> LifecycleEvent {
        LifecycleEvent::BgpvpnUpdate {
            phase,
            old: old.clone(),
            new: new.clone(),
        }
    }

    pub fn delete_bgpvpn(phase: Phase, bgpvpn: &Bgpvpn) -> LifecycleEvent {
        LifecycleEvent::BgpvpnDelete {
            phase,
            bgpvpn: bgpvpn.clone(),
        }
    }

    pub fn associate_network(phase: Phase, bgpvpn_id: &str, network_id: &str) -> LifecycleEvent {
        LifecycleEvent::NetworkAssociationCreate {
            phase,
            association: NetworkAssociation::new(bgpvpn_id, network_id),
        }
    }

    pub fn dissociate_network(phase: Phase, bgpvpn_id: &str, network_id: &str) -> LifecycleEvent {
        LifecycleEvent::NetworkAssociationDelete {
            phase,
            association: NetworkAssociation::new(bgpvpn_id, network_id),
        }
    }

    pub fn associate_router(phase: Phase, bgpvpn_id: &str, router_id: &str) -> LifecycleEvent {
        LifecycleEvent::RouterAssociationCreate {
            phase,
            association: RouterAssociation::new(bgpvpn_id, router_id),
        }
    }

    pub fn dissociate_router(phase: Phase, bgpvpn_id: &str, router_id: &str) -> LifecycleEvent {
        LifecycleEvent::RouterAssociationDelete {
            phase,
            association: RouterAssociation::new(bgpvpn_id, router_id),
        }
    }

    pub fn interface_added(router_id: &str, port: &Port) -> LifecycleEvent {
        LifecycleEvent::RouterInterfaceCreated {
            router_id: router_id.to_string(),
            port: port.clone(),
        }
    }

    pub fn interface_removed(router_id: &str, subnet_id: &str) -> LifecycleEvent {
        LifecycleEvent::RouterInterfaceDeleted {
            router_id: router_id.to_string(),
            subnet_id: subnet_id.to_string(),
        }
    }
}

/// In-memory driver deployment.
///
/// Store chain: reconciler -> [`CountingBackend`] -> [`FailingBackend`] -> [`MemoryBackend`],
/// so failed transactions are still counted as write calls.
pub struct Scenario {
    topology: Arc<MemoryTopology>,
    memory: Arc<MemoryBackend>,
    counting: Arc<CountingBackend>,
    failing: Arc<FailingBackend>,
    reconciler: Arc<AssociationReconciler>,
    bus: EventBus,
}

impl Scenario {
    pub fn new() -> Self {
        let topology = Arc::new(MemoryTopology::new());
        let memory = Arc::new(MemoryBackend::new());
        let failing = Arc::new(FailingBackend::new(memory.clone()));
        let counting = Arc::new(CountingBackend::new(failing.clone()));

        let store = MetadataStoreClient::new(counting.clone() as Arc<dyn MetadataBackend>);
        let reconciler = Arc::new(AssociationReconciler::new(topology.clone(), store));

        let mut bus = EventBus::new();
        bus.register(reconciler.clone());

        Self {
            topology,
            memory,
            counting,
            failing,
            reconciler,
            bus,
        }
    }

    /// Logical switch name of a network
    pub fn logical_name(&self, network_id: &str) -> String {
        self.reconciler.store().logical_name(network_id)
    }

    /// Materializes the logical switch of a network
    pub fn with_network(self, network_id: &str) -> Self {
        self.memory.add_logical_switch(&self.logical_name(network_id));
        self
    }

    /// Records a BGPVPN (with its associations) in the topology
    pub fn with_bgpvpn(self, bgpvpn: Bgpvpn) -> Self {
        self.topology.put_bgpvpn(bgpvpn);
        self
    }

    /// Connects a router to a network through a subnet
    pub fn with_router_interface(self, router_id: &str, network_id: &str, subnet_id: &str) -> Self {
        self.add_router_interface(router_id, network_id, subnet_id);
        self
    }

    /// Connects a router to a network and returns the interface port
    pub fn add_router_interface(&self, router_id: &str, network_id: &str, subnet_id: &str) -> Port {
        self.topology.add_router(router_id);
        self.topology.add_subnet(subnet_id, network_id);
        let port = Port::router_interface(
            format!("{}-{}", router_id, subnet_id),
            router_id,
            network_id,
            subnet_id,
        );
        self.topology.add_port(port.clone());
        port
    }

    /// Sets a key on a network's switch outside the driver
    pub fn set_foreign_key(&self, network_id: &str, key: &str, value: &str) {
        self.memory
            .set_external_id(&self.logical_name(network_id), key, value);
    }

    pub async fn dispatch(&self, event: &LifecycleEvent) -> DriverResult<()> {
        self.bus.dispatch(event).await
    }

    pub fn topology(&self) -> &MemoryTopology {
        &self.topology
    }

    pub fn memory(&self) -> &MemoryBackend {
        &self.memory
    }

    pub fn counting(&self) -> &CountingBackend {
        &self.counting
    }

    pub fn failing(&self) -> &FailingBackend {
        &self.failing
    }

    pub fn reconciler(&self) -> &AssociationReconciler {
        &self.reconciler
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn verifier(&self) -> MetadataVerifier<'_> {
        MetadataVerifier::new(&self.memory, self.reconciler.store())
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}
