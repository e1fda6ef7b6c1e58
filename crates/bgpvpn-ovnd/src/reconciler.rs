//! Association Reconciler - BGPVPN lifecycle hooks
//!
//! Keeps the EVPN metadata of every logical switch in line with the BGPVPNs
//! its network is associated with, directly or through a router.
//!
//! No association state is kept here. Each hook re-derives what it needs from
//! the topology at call time, so redelivering an event converges to the same
//! metadata. A direct network association always takes precedence over one
//! derived through a router, and no hook clears metadata without first
//! checking the other source.

use std::collections::BTreeSet;
use std::sync::Arc;

use bgpvpn_common::types::{OVN_DRIVER_NAME, VNI_MAX};
use bgpvpn_common::{
    Bgpvpn, BgpvpnDiff, BgpvpnType, DriverError, DriverResult, NetworkAssociation, Port,
    PortAssociation, RouterAssociation,
};
use tracing::{debug, error, info, instrument, warn};

use crate::store::MetadataStoreClient;
use crate::topology::{BgpvpnFilter, PortFilter, TopologyQuery};

/// Object a precommit hook is about to remove.
///
/// During precommit the topology still contains it, so resolution must skip it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departing {
    Nothing,
    Bgpvpn(String),
    NetworkAssociation {
        bgpvpn_id: String,
        network_id: String,
    },
    RouterAssociation {
        bgpvpn_id: String,
        router_id: String,
    },
    RouterInterface {
        router_id: String,
        subnet_id: String,
    },
}

impl Departing {
    fn drops_bgpvpn(&self, bgpvpn_id: &str) -> bool {
        matches!(self, Departing::Bgpvpn(id) if id == bgpvpn_id)
    }

    /// True if the direct association `bgpvpn_id` <-> `network_id` is leaving
    fn drops_direct(&self, bgpvpn_id: &str, network_id: &str) -> bool {
        self.drops_bgpvpn(bgpvpn_id)
            || matches!(
                self,
                Departing::NetworkAssociation { bgpvpn_id: b, network_id: n }
                    if b == bgpvpn_id && n == network_id
            )
    }

    /// True if the router association `bgpvpn_id` <-> `router_id` is leaving
    fn drops_router_bgpvpn(&self, bgpvpn_id: &str, router_id: &str) -> bool {
        self.drops_bgpvpn(bgpvpn_id)
            || matches!(
                self,
                Departing::RouterAssociation { bgpvpn_id: b, router_id: r }
                    if b == bgpvpn_id && r == router_id
            )
    }

    /// True if `port` is the router interface being detached
    fn drops_port(&self, port: &Port) -> bool {
        matches!(
            self,
            Departing::RouterInterface { router_id, subnet_id }
                if port.device_id == *router_id && port.on_subnet(subnet_id)
        )
    }
}

/// Outcome of a full reconciliation sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Networks whose effective BGPVPN was (re)applied
    pub applied: Vec<String>,
    /// Networks whose stale EVPN metadata was removed
    pub cleared: Vec<String>,
    /// Networks with an effective BGPVPN but no logical switch yet
    pub missing: Vec<String>,
    /// Networks that failed, with the error
    pub failed: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum SweepOutcome {
    Applied,
    Missing,
    Cleared,
}

/// Validates the attributes every BGPVPN handled by this driver must carry.
pub fn validate_bgpvpn(bgpvpn: &Bgpvpn) -> DriverResult<BgpvpnType> {
    let vpn_type = bgpvpn.bgpvpn_type()?;
    match bgpvpn.vni {
        None | Some(0) => Err(DriverError::missing_attribute(OVN_DRIVER_NAME, "vni")),
        Some(vni) if vni > VNI_MAX => Err(DriverError::invalid_attribute(
            "vni",
            format!("{} is outside 1..={}", vni, VNI_MAX),
        )),
        Some(_) => Ok(vpn_type),
    }
}

fn require_l3(bgpvpn: &Bgpvpn) -> DriverResult<()> {
    match bgpvpn.bgpvpn_type()? {
        BgpvpnType::L3 => Ok(()),
        BgpvpnType::L2 => Err(DriverError::invalid_association_type(
            "router",
            &bgpvpn.id,
            &bgpvpn.vpn_type,
        )),
    }
}

/// Association Reconciler
pub struct AssociationReconciler {
    topology: Arc<dyn TopologyQuery>,
    store: MetadataStoreClient,
}

impl AssociationReconciler {
    pub fn new(topology: Arc<dyn TopologyQuery>, store: MetadataStoreClient) -> Self {
        Self { topology, store }
    }

    pub fn store(&self) -> &MetadataStoreClient {
        &self.store
    }

    // ===== Resolution =====

    async fn resolve_bgpvpn(&self, bgpvpn_id: &str) -> DriverResult<Bgpvpn> {
        self.topology
            .get_bgpvpn(bgpvpn_id)
            .await?
            .ok_or_else(|| DriverError::bgpvpn_not_found(bgpvpn_id))
    }

    /// BGPVPNs directly associated with a network
    async fn direct_bgpvpns(
        &self,
        network_id: &str,
        departing: &Departing,
    ) -> DriverResult<Vec<Bgpvpn>> {
        let mut bgpvpns = self
            .topology
            .list_bgpvpns(&BgpvpnFilter::network(network_id))
            .await?;
        bgpvpns.retain(|b| !departing.drops_direct(&b.id, network_id));
        Ok(bgpvpns)
    }

    /// BGPVPN associated with a router, first match
    async fn router_bgpvpn(
        &self,
        router_id: &str,
        departing: &Departing,
    ) -> DriverResult<Option<Bgpvpn>> {
        let mut bgpvpns = self
            .topology
            .list_bgpvpns(&BgpvpnFilter::router(router_id))
            .await?;
        bgpvpns.retain(|b| !departing.drops_router_bgpvpn(&b.id, router_id));
        if bgpvpns.len() > 1 {
            warn!(
                router_id,
                count = bgpvpns.len(),
                "Router associated with several BGPVPNs, using {}",
                bgpvpns[0].id
            );
        }
        Ok(bgpvpns.into_iter().next())
    }

    /// Routers with an interface on a network, in listing order
    async fn routers_of_network(
        &self,
        network_id: &str,
        departing: &Departing,
    ) -> DriverResult<Vec<String>> {
        let ports = self
            .topology
            .list_ports(&PortFilter::router_interfaces_on(network_id))
            .await?;
        let mut seen = BTreeSet::new();
        Ok(ports
            .into_iter()
            .filter(|p| !departing.drops_port(p))
            .filter(|p| seen.insert(p.device_id.clone()))
            .map(|p| p.device_id)
            .collect())
    }

    /// BGPVPN reaching a network through one of its routers
    async fn router_derived_bgpvpn(
        &self,
        network_id: &str,
        departing: &Departing,
    ) -> DriverResult<Option<Bgpvpn>> {
        let mut found: Vec<Bgpvpn> = Vec::new();
        for router_id in self.routers_of_network(network_id, departing).await? {
            if let Some(bgpvpn) = self.router_bgpvpn(&router_id, departing).await? {
                if !found.iter().any(|b| b.id == bgpvpn.id) {
                    found.push(bgpvpn);
                }
            }
        }
        if found.len() > 1 {
            let ids: Vec<&str> = found.iter().map(|b| b.id.as_str()).collect();
            warn!(
                network_id,
                "Network reachable from BGPVPNs {:?} through different routers, using {}",
                ids,
                ids[0]
            );
        }
        Ok(found.into_iter().next())
    }

    /// BGPVPN whose configuration a network should carry. Direct wins.
    pub async fn effective_bgpvpn(
        &self,
        network_id: &str,
        departing: &Departing,
    ) -> DriverResult<Option<Bgpvpn>> {
        if let Some(direct) = self.direct_bgpvpns(network_id, departing).await?.into_iter().next() {
            return Ok(Some(direct));
        }
        self.router_derived_bgpvpn(network_id, departing).await
    }

    /// Networks with an interface of the router, deduplicated
    pub async fn connected_networks(&self, router_id: &str) -> DriverResult<Vec<String>> {
        let ports = self
            .topology
            .list_ports(&PortFilter::router_interfaces_of(router_id))
            .await?;
        let mut seen = BTreeSet::new();
        Ok(ports
            .into_iter()
            .map(|p| p.network_id)
            .filter(|n| seen.insert(n.clone()))
            .collect())
    }

    // ===== Convergence =====

    /// Applies the network's effective BGPVPN, or clears it if there is none
    async fn converge(&self, network_id: &str, departing: &Departing) -> DriverResult<()> {
        match self.effective_bgpvpn(network_id, departing).await? {
            Some(bgpvpn) => {
                debug!("Network {} keeps BGPVPN {}", network_id, bgpvpn.id);
                self.store.apply_evpn_config(network_id, &bgpvpn).await?;
            }
            None => {
                self.store.clear_evpn_config(network_id).await?;
            }
        }
        Ok(())
    }

    /// Re-derives router-provided metadata, leaving directly associated networks alone
    async fn converge_router_network(
        &self,
        network_id: &str,
        departing: &Departing,
    ) -> DriverResult<()> {
        if !self.direct_bgpvpns(network_id, departing).await?.is_empty() {
            debug!("Network {} has a direct association, left in place", network_id);
            return Ok(());
        }
        match self.router_derived_bgpvpn(network_id, departing).await? {
            Some(bgpvpn) => {
                self.store.apply_evpn_config(network_id, &bgpvpn).await?;
            }
            None => {
                self.store.clear_evpn_config(network_id).await?;
            }
        }
        Ok(())
    }

    /// Writes router-derived metadata unless a direct association owns the network
    async fn apply_router_derived(&self, network_id: &str, bgpvpn: &Bgpvpn) -> DriverResult<()> {
        if !self
            .direct_bgpvpns(network_id, &Departing::Nothing)
            .await?
            .is_empty()
        {
            debug!(
                "Network {} has a direct association, skipping router-derived BGPVPN {}",
                network_id, bgpvpn.id
            );
            return Ok(());
        }
        self.store.apply_evpn_config(network_id, bgpvpn).await?;
        Ok(())
    }

    // ===== BGPVPN =====

    #[instrument(skip(self, bgpvpn), fields(bgpvpn_id = %bgpvpn.id))]
    pub async fn create_bgpvpn_precommit(&self, bgpvpn: &Bgpvpn) -> DriverResult<()> {
        validate_bgpvpn(bgpvpn)?;
        Ok(())
    }

    pub async fn create_bgpvpn_postcommit(&self, bgpvpn: &Bgpvpn) -> DriverResult<()> {
        debug!(
            "BGPVPN {} created, metadata follows its associations",
            bgpvpn.id
        );
        Ok(())
    }

    /// Validates the new snapshot; `type` and a set `vni` cannot change.
    #[instrument(skip(self, old, new), fields(bgpvpn_id = %new.id))]
    pub async fn update_bgpvpn_precommit(&self, old: &Bgpvpn, new: &Bgpvpn) -> DriverResult<()> {
        let new_type = validate_bgpvpn(new)?;
        if let Ok(old_type) = old.bgpvpn_type() {
            if old_type != new_type {
                return Err(DriverError::invalid_attribute(
                    "type",
                    format!("cannot change from {} to {}", old_type, new_type),
                ));
            }
        }
        if let Some(old_vni) = old.vni {
            if new.vni != Some(old_vni) {
                return Err(DriverError::invalid_attribute(
                    "vni",
                    format!("cannot change from {} to {:?}", old_vni, new.vni),
                ));
            }
        }
        Ok(())
    }

    /// Re-propagates the new snapshot to every network it reaches.
    #[instrument(skip(self, old, new), fields(bgpvpn_id = %new.id))]
    pub async fn update_bgpvpn_postcommit(&self, old: &Bgpvpn, new: &Bgpvpn) -> DriverResult<()> {
        let diff = BgpvpnDiff::between(old, new)?;
        if diff.is_cosmetic() {
            debug!("No significant change on BGPVPN {}, skipping", new.id);
            return Ok(());
        }
        info!(
            "BGPVPN {} changed {:?}, updating associated networks",
            new.id,
            diff.significant_keys()
        );

        for network_id in &new.networks {
            self.store.apply_evpn_config(network_id, new).await?;
        }
        for router_id in &new.routers {
            for network_id in self.connected_networks(router_id).await? {
                if new.has_network(&network_id) {
                    continue;
                }
                self.apply_router_derived(&network_id, new).await?;
            }
        }
        Ok(())
    }

    /// Clears the BGPVPN's metadata before deletion is allowed to commit.
    #[instrument(skip(self, bgpvpn), fields(bgpvpn_id = %bgpvpn.id))]
    pub async fn delete_bgpvpn_precommit(&self, bgpvpn: &Bgpvpn) -> DriverResult<()> {
        let mut networks: Vec<String> = bgpvpn.networks.clone();
        for router_id in &bgpvpn.routers {
            for network_id in self.connected_networks(router_id).await? {
                if !networks.contains(&network_id) {
                    networks.push(network_id);
                }
            }
        }

        let departing = Departing::Bgpvpn(bgpvpn.id.clone());
        for network_id in &networks {
            self.converge(network_id, &departing).await?;
        }
        info!(
            "Removed BGPVPN {} from {} networks",
            bgpvpn.id,
            networks.len()
        );
        Ok(())
    }

    pub async fn delete_bgpvpn_postcommit(&self, _bgpvpn: &Bgpvpn) -> DriverResult<()> {
        Ok(())
    }

    // ===== Network association =====

    pub async fn create_net_assoc_precommit(
        &self,
        _assoc: &NetworkAssociation,
    ) -> DriverResult<()> {
        Ok(())
    }

    #[instrument(skip(self, assoc), fields(association = %assoc.id))]
    pub async fn create_net_assoc_postcommit(
        &self,
        assoc: &NetworkAssociation,
    ) -> DriverResult<()> {
        let bgpvpn = self.resolve_bgpvpn(&assoc.bgpvpn_id).await?;
        self.store
            .apply_evpn_config(&assoc.network_id, &bgpvpn)
            .await?;
        Ok(())
    }

    /// Falls back to router-derived metadata, or clears if there is none.
    #[instrument(skip(self, assoc), fields(association = %assoc.id))]
    pub async fn delete_net_assoc_precommit(&self, assoc: &NetworkAssociation) -> DriverResult<()> {
        let departing = Departing::NetworkAssociation {
            bgpvpn_id: assoc.bgpvpn_id.clone(),
            network_id: assoc.network_id.clone(),
        };
        self.converge(&assoc.network_id, &departing).await
    }

    pub async fn delete_net_assoc_postcommit(
        &self,
        _assoc: &NetworkAssociation,
    ) -> DriverResult<()> {
        Ok(())
    }

    // ===== Router association =====

    #[instrument(skip(self, assoc), fields(association = %assoc.id))]
    pub async fn create_router_assoc_precommit(
        &self,
        assoc: &RouterAssociation,
    ) -> DriverResult<()> {
        let bgpvpn = self.resolve_bgpvpn(&assoc.bgpvpn_id).await?;
        require_l3(&bgpvpn)
    }

    #[instrument(skip(self, assoc), fields(association = %assoc.id))]
    pub async fn create_router_assoc_postcommit(
        &self,
        assoc: &RouterAssociation,
    ) -> DriverResult<()> {
        self.propagate_router_assoc(assoc).await
    }

    /// Re-writes every connected network; association attributes are consumed downstream.
    #[instrument(skip(self, _old, new), fields(association = %new.id))]
    pub async fn update_router_assoc_postcommit(
        &self,
        _old: &RouterAssociation,
        new: &RouterAssociation,
    ) -> DriverResult<()> {
        self.propagate_router_assoc(new).await
    }

    async fn propagate_router_assoc(&self, assoc: &RouterAssociation) -> DriverResult<()> {
        let bgpvpn = self.resolve_bgpvpn(&assoc.bgpvpn_id).await?;
        require_l3(&bgpvpn)?;

        if self.topology.get_router(&assoc.router_id).await?.is_none() {
            warn!("Router {} not found, nothing to update", assoc.router_id);
            return Ok(());
        }

        let networks = self.connected_networks(&assoc.router_id).await?;
        info!(
            "Propagating BGPVPN {} to {} networks of router {}",
            bgpvpn.id,
            networks.len(),
            assoc.router_id
        );
        for network_id in &networks {
            self.apply_router_derived(network_id, &bgpvpn).await?;
        }
        Ok(())
    }

    /// Clears router-derived metadata, keeping networks with a direct association.
    #[instrument(skip(self, assoc), fields(association = %assoc.id))]
    pub async fn delete_router_assoc_precommit(
        &self,
        assoc: &RouterAssociation,
    ) -> DriverResult<()> {
        let departing = Departing::RouterAssociation {
            bgpvpn_id: assoc.bgpvpn_id.clone(),
            router_id: assoc.router_id.clone(),
        };
        for network_id in self.connected_networks(&assoc.router_id).await? {
            self.converge_router_network(&network_id, &departing).await?;
        }
        Ok(())
    }

    pub async fn delete_router_assoc_postcommit(
        &self,
        _assoc: &RouterAssociation,
    ) -> DriverResult<()> {
        Ok(())
    }

    // ===== Port association =====

    pub async fn create_port_assoc_postcommit(&self, assoc: &PortAssociation) -> DriverResult<()> {
        info!(
            "Port association {} created for port {}, no metadata to write",
            assoc.id, assoc.port_id
        );
        Ok(())
    }

    pub async fn update_port_assoc_postcommit(
        &self,
        _old: &PortAssociation,
        new: &PortAssociation,
    ) -> DriverResult<()> {
        info!(
            "Port association {} updated for port {}, no metadata to write",
            new.id, new.port_id
        );
        Ok(())
    }

    pub async fn delete_port_assoc_postcommit(&self, assoc: &PortAssociation) -> DriverResult<()> {
        info!(
            "Port association {} deleted for port {}, no metadata to write",
            assoc.id, assoc.port_id
        );
        Ok(())
    }

    // ===== Router interfaces =====

    /// Extends the router's BGPVPN to a newly attached network.
    #[instrument(skip(self, port), fields(network_id = %port.network_id))]
    pub async fn on_router_interface_created(
        &self,
        router_id: &str,
        port: &Port,
    ) -> DriverResult<()> {
        let Some(bgpvpn) = self.router_bgpvpn(router_id, &Departing::Nothing).await? else {
            debug!("Router {} has no BGPVPN", router_id);
            return Ok(());
        };
        info!(
            "Router {} attached to network {}, applying BGPVPN {}",
            router_id, port.network_id, bgpvpn.id
        );
        self.apply_router_derived(&port.network_id, &bgpvpn).await
    }

    /// Re-derives the detached network's metadata, clearing it if no BGPVPN remains.
    #[instrument(skip(self))]
    pub async fn on_router_interface_deleted(
        &self,
        router_id: &str,
        subnet_id: &str,
    ) -> DriverResult<()> {
        let Some(subnet) = self.topology.get_subnet(subnet_id).await? else {
            warn!("Subnet {} not found, cannot resolve detached network", subnet_id);
            return Ok(());
        };
        let departing = Departing::RouterInterface {
            router_id: router_id.to_string(),
            subnet_id: subnet_id.to_string(),
        };
        info!(
            "Router {} detached from network {}",
            router_id, subnet.network_id
        );
        self.converge(&subnet.network_id, &departing).await
    }

    // ===== Sweep =====

    /// Recomputes the metadata of every network known to carry or need EVPN config.
    ///
    /// Failures are recorded per network and do not stop the sweep.
    pub async fn reconcile_all(&self) -> DriverResult<ReconcileReport> {
        let bgpvpns = self.topology.list_bgpvpns(&BgpvpnFilter::All).await?;
        let tagged: BTreeSet<String> = self.store.evpn_networks().await?.into_iter().collect();

        let mut networks: BTreeSet<String> = tagged.clone();
        for bgpvpn in &bgpvpns {
            networks.extend(bgpvpn.networks.iter().cloned());
            for router_id in &bgpvpn.routers {
                networks.extend(self.connected_networks(router_id).await?);
            }
        }

        let mut report = ReconcileReport::default();
        for network_id in networks {
            let outcome = match self.effective_bgpvpn(&network_id, &Departing::Nothing).await {
                Ok(Some(bgpvpn)) => self
                    .store
                    .apply_evpn_config(&network_id, &bgpvpn)
                    .await
                    .map(|written| {
                        if written {
                            SweepOutcome::Applied
                        } else {
                            SweepOutcome::Missing
                        }
                    }),
                Ok(None) if tagged.contains(&network_id) => self
                    .store
                    .clear_evpn_config(&network_id)
                    .await
                    .map(|_| SweepOutcome::Cleared),
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(SweepOutcome::Applied) => report.applied.push(network_id),
                Ok(SweepOutcome::Missing) => report.missing.push(network_id),
                Ok(SweepOutcome::Cleared) => report.cleared.push(network_id),
                Err(e) => {
                    error!("Reconciliation of network {} failed: {}", network_id, e);
                    report.failed.push((network_id, e.to_string()));
                }
            }
        }

        info!(
            "Reconciliation done: {} applied, {} cleared, {} missing, {} failed",
            report.applied.len(),
            report.cleared.len(),
            report.missing.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use crate::topology::MemoryTopology;
    use bgpvpn_common::codec;
    use pretty_assertions::assert_eq;

    struct Harness {
        topology: Arc<MemoryTopology>,
        backend: Arc<MemoryBackend>,
        reconciler: AssociationReconciler,
    }

    impl Harness {
        fn new() -> Self {
            let topology = Arc::new(MemoryTopology::new());
            let backend = Arc::new(MemoryBackend::new());
            let reconciler = AssociationReconciler::new(
                topology.clone(),
                MetadataStoreClient::new(backend.clone()),
            );
            Self {
                topology,
                backend,
                reconciler,
            }
        }

        fn network(&self, network_id: &str) {
            self.backend
                .add_logical_switch(&format!("neutron-{}", network_id));
        }

        fn attach(&self, router_id: &str, network_id: &str, subnet_id: &str) -> Port {
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

        fn evpn(&self, network_id: &str) -> codec::ExternalIds {
            codec::evpn_subset(
                &self
                    .backend
                    .external_ids(&format!("neutron-{}", network_id))
                    .unwrap_or_default(),
            )
        }
    }

    fn vpn_a() -> Bgpvpn {
        Bgpvpn::new("a", "l3")
            .with_vni(100)
            .with_route_targets(["65000:100"])
    }

    fn vpn_b() -> Bgpvpn {
        Bgpvpn::new("b", "l3")
            .with_vni(200)
            .with_route_targets(["65001:200"])
            .with_import_targets(["65001:201"])
    }

    #[test]
    fn test_validate_bgpvpn() {
        assert_eq!(validate_bgpvpn(&vpn_a()).unwrap(), BgpvpnType::L3);
        assert!(matches!(
            validate_bgpvpn(&Bgpvpn::new("x", "l1").with_vni(1)),
            Err(DriverError::UnsupportedType { .. })
        ));
        assert!(matches!(
            validate_bgpvpn(&Bgpvpn::new("x", "l2")),
            Err(DriverError::MissingRequiredAttribute { .. })
        ));
        assert!(matches!(
            validate_bgpvpn(&Bgpvpn::new("x", "l2").with_vni(0)),
            Err(DriverError::MissingRequiredAttribute { .. })
        ));
        assert!(matches!(
            validate_bgpvpn(&Bgpvpn::new("x", "l2").with_vni(VNI_MAX + 1)),
            Err(DriverError::InvalidAttribute { .. })
        ));
        assert!(validate_bgpvpn(&Bgpvpn::new("x", "L2").with_vni(VNI_MAX)).is_ok());
    }

    #[tokio::test]
    async fn test_create_precommit_writes_nothing() {
        let h = Harness::new();
        h.network("n1");
        let err = h
            .reconciler
            .create_bgpvpn_precommit(&Bgpvpn::new("v1", "L1").with_vni(5000))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.backend.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_network_association_lifecycle() {
        let h = Harness::new();
        h.network("n1");
        h.topology.put_bgpvpn(vpn_a().with_network("n1"));

        let assoc = NetworkAssociation::new("a", "n1");
        h.reconciler.create_net_assoc_postcommit(&assoc).await.unwrap();
        assert_eq!(h.evpn("n1"), codec::build(&vpn_a()).unwrap());

        h.reconciler.delete_net_assoc_precommit(&assoc).await.unwrap();
        assert!(h.evpn("n1").is_empty());
    }

    #[tokio::test]
    async fn test_network_association_unknown_bgpvpn() {
        let h = Harness::new();
        h.network("n1");
        let err = h
            .reconciler
            .create_net_assoc_postcommit(&NetworkAssociation::new("ghost", "n1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::BgpvpnNotFound { .. }));
    }

    #[tokio::test]
    async fn test_network_association_before_switch_exists() {
        let h = Harness::new();
        h.topology.put_bgpvpn(vpn_a().with_network("n1"));
        h.reconciler
            .create_net_assoc_postcommit(&NetworkAssociation::new("a", "n1"))
            .await
            .unwrap();
        assert_eq!(h.backend.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_direct_wins_over_router() {
        let h = Harness::new();
        h.network("n1");
        h.attach("r1", "n1", "s1");
        h.topology.put_bgpvpn(vpn_a().with_network("n1"));
        h.topology.put_bgpvpn(vpn_b().with_router("r1"));

        h.reconciler
            .create_net_assoc_postcommit(&NetworkAssociation::new("a", "n1"))
            .await
            .unwrap();
        h.reconciler
            .create_router_assoc_postcommit(&RouterAssociation::new("b", "r1"))
            .await
            .unwrap();
        assert_eq!(h.evpn("n1"), codec::build(&vpn_a()).unwrap());

        h.reconciler
            .delete_net_assoc_precommit(&NetworkAssociation::new("a", "n1"))
            .await
            .unwrap();
        assert_eq!(h.evpn("n1"), codec::build(&vpn_b()).unwrap());
    }

    #[tokio::test]
    async fn test_router_assoc_delete_keeps_direct() {
        let h = Harness::new();
        h.network("n1");
        h.network("n2");
        h.attach("r1", "n1", "s1");
        h.attach("r1", "n2", "s2");
        h.topology.put_bgpvpn(vpn_a().with_network("n1"));
        h.topology.put_bgpvpn(vpn_b().with_router("r1"));

        h.reconciler
            .create_net_assoc_postcommit(&NetworkAssociation::new("a", "n1"))
            .await
            .unwrap();
        h.reconciler
            .create_router_assoc_postcommit(&RouterAssociation::new("b", "r1"))
            .await
            .unwrap();
        assert_eq!(h.evpn("n2"), codec::build(&vpn_b()).unwrap());

        h.reconciler
            .delete_router_assoc_precommit(&RouterAssociation::new("b", "r1"))
            .await
            .unwrap();
        assert_eq!(h.evpn("n1"), codec::build(&vpn_a()).unwrap());
        assert!(h.evpn("n2").is_empty());
    }

    #[tokio::test]
    async fn test_router_assoc_requires_l3() {
        let h = Harness::new();
        h.network("n1");
        h.attach("r1", "n1", "s1");
        h.topology
            .put_bgpvpn(Bgpvpn::new("l2vpn", "l2").with_vni(7).with_router("r1"));

        let assoc = RouterAssociation::new("l2vpn", "r1");
        assert!(matches!(
            h.reconciler.create_router_assoc_precommit(&assoc).await,
            Err(DriverError::InvalidAssociationType { .. })
        ));
        assert!(matches!(
            h.reconciler.create_router_assoc_postcommit(&assoc).await,
            Err(DriverError::InvalidAssociationType { .. })
        ));
        assert_eq!(h.backend.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_router_assoc_unknown_router() {
        let h = Harness::new();
        h.topology.put_bgpvpn(vpn_b().with_router("r9"));
        h.reconciler
            .create_router_assoc_postcommit(&RouterAssociation::new("b", "r9"))
            .await
            .unwrap();
        assert_eq!(h.backend.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_router_interface_attach_and_detach() {
        let h = Harness::new();
        h.network("n1");
        h.topology.add_router("r1");
        h.topology.put_bgpvpn(vpn_b().with_router("r1"));

        let port = h.attach("r1", "n1", "s1");
        h.reconciler
            .on_router_interface_created("r1", &port)
            .await
            .unwrap();
        assert_eq!(h.evpn("n1"), codec::build(&vpn_b()).unwrap());

        h.reconciler
            .on_router_interface_deleted("r1", "s1")
            .await
            .unwrap();
        assert!(h.evpn("n1").is_empty());
    }

    #[tokio::test]
    async fn test_detach_keeps_other_router() {
        let h = Harness::new();
        h.network("n1");
        h.attach("r1", "n1", "s1");
        h.attach("r2", "n1", "s2");
        h.topology.put_bgpvpn(vpn_b().with_router("r1").with_router("r2"));

        h.reconciler
            .create_router_assoc_postcommit(&RouterAssociation::new("b", "r1"))
            .await
            .unwrap();
        h.reconciler
            .on_router_interface_deleted("r1", "s1")
            .await
            .unwrap();
        assert_eq!(h.evpn("n1"), codec::build(&vpn_b()).unwrap());
    }

    #[tokio::test]
    async fn test_detach_unknown_subnet() {
        let h = Harness::new();
        h.reconciler
            .on_router_interface_deleted("r1", "s404")
            .await
            .unwrap();
        assert_eq!(h.backend.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_update_rename_skips_writes() {
        let h = Harness::new();
        h.network("n1");
        let old = vpn_a().with_name("blue").with_network("n1");
        h.topology.put_bgpvpn(old.clone());
        h.reconciler
            .create_net_assoc_postcommit(&NetworkAssociation::new("a", "n1"))
            .await
            .unwrap();
        let before = h.backend.transaction_count();

        let new = old.clone().with_name("green");
        h.reconciler
            .update_bgpvpn_postcommit(&old, &new)
            .await
            .unwrap();
        assert_eq!(h.backend.transaction_count(), before);
    }

    #[tokio::test]
    async fn test_update_precommit_rejects_type_change() {
        let h = Harness::new();
        h.network("n1");
        h.attach("r1", "n1", "s1");
        let old = vpn_b().with_router("r1");
        h.topology.put_bgpvpn(old.clone());
        h.reconciler
            .create_router_assoc_postcommit(&RouterAssociation::new("b", "r1"))
            .await
            .unwrap();
        let before = h.evpn("n1");

        let mut new = old.clone();
        new.vpn_type = "l2".to_string();
        let err = h
            .reconciler
            .update_bgpvpn_precommit(&old, &new)
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            DriverError::InvalidAttribute { attribute, .. } if attribute == "type"
        ));
        assert!(err.is_validation());
        assert_eq!(h.evpn("n1"), before);

        // same type, different spelling
        let mut new = old.clone();
        new.vpn_type = "L3".to_string();
        h.reconciler
            .update_bgpvpn_precommit(&old, &new)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_precommit_rejects_vni_change() {
        let h = Harness::new();
        let old = vpn_b();
        let vni = old.vni.unwrap();

        let err = h
            .reconciler
            .update_bgpvpn_precommit(&old, &old.clone().with_vni(vni + 1))
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            DriverError::InvalidAttribute { attribute, .. } if attribute == "vni"
        ));

        let mut unset = old.clone();
        unset.vni = None;
        h.reconciler
            .update_bgpvpn_precommit(&unset, &old)
            .await
            .unwrap();
        h.reconciler
            .update_bgpvpn_precommit(&old, &old.clone().with_local_pref(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_propagates_and_drops_stale_keys() {
        let h = Harness::new();
        h.network("n1");
        h.network("n2");
        h.attach("r1", "n2", "s2");
        let old = vpn_b().with_network("n1").with_router("r1");
        h.topology.put_bgpvpn(old.clone());
        h.reconciler
            .create_net_assoc_postcommit(&NetworkAssociation::new("b", "n1"))
            .await
            .unwrap();

        let mut new = old.clone().with_local_pref(300);
        new.import_targets.clear();
        h.topology.put_bgpvpn(new.clone());
        h.reconciler
            .update_bgpvpn_postcommit(&old, &new)
            .await
            .unwrap();

        let expected = codec::build(&new).unwrap();
        assert_eq!(h.evpn("n1"), expected);
        assert_eq!(h.evpn("n2"), expected);
    }

    #[tokio::test]
    async fn test_delete_bgpvpn_clears_all() {
        let h = Harness::new();
        h.network("n1");
        h.network("n2");
        h.attach("r1", "n2", "s2");
        let vpn = vpn_a().with_network("n1").with_router("r1");
        h.topology.put_bgpvpn(vpn.clone());
        h.reconciler
            .create_net_assoc_postcommit(&NetworkAssociation::new("a", "n1"))
            .await
            .unwrap();
        h.reconciler
            .create_router_assoc_postcommit(&RouterAssociation::new("a", "r1"))
            .await
            .unwrap();

        h.reconciler.delete_bgpvpn_precommit(&vpn).await.unwrap();
        assert!(h.evpn("n1").is_empty());
        assert!(h.evpn("n2").is_empty());
    }

    #[tokio::test]
    async fn test_delete_bgpvpn_falls_back_to_router() {
        let h = Harness::new();
        h.network("n1");
        h.attach("r1", "n1", "s1");
        let direct = vpn_a().with_network("n1");
        h.topology.put_bgpvpn(direct.clone());
        h.topology.put_bgpvpn(vpn_b().with_router("r1"));
        h.reconciler
            .create_net_assoc_postcommit(&NetworkAssociation::new("a", "n1"))
            .await
            .unwrap();

        h.reconciler.delete_bgpvpn_precommit(&direct).await.unwrap();
        assert_eq!(h.evpn("n1"), codec::build(&vpn_b()).unwrap());
    }

    #[tokio::test]
    async fn test_reconcile_all() {
        let h = Harness::new();
        h.network("n1");
        h.network("n2");
        h.network("stale");
        h.backend.set_external_id("neutron-stale", "vni", "9");
        h.backend.set_external_id("neutron-stale", "type", "l2");
        h.attach("r1", "n2", "s2");
        h.topology.put_bgpvpn(vpn_a().with_network("n1").with_network("n3"));
        h.topology.put_bgpvpn(vpn_b().with_router("r1"));

        let report = h.reconciler.reconcile_all().await.unwrap();
        assert_eq!(report.applied, vec!["n1".to_string(), "n2".to_string()]);
        assert_eq!(report.cleared, vec!["stale".to_string()]);
        assert_eq!(report.missing, vec!["n3".to_string()]);
        assert!(report.is_clean());

        assert_eq!(h.evpn("n1"), codec::build(&vpn_a()).unwrap());
        assert_eq!(h.evpn("n2"), codec::build(&vpn_b()).unwrap());
        assert!(h.evpn("stale").is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_all_keeps_unconfigured_type_key() {
        let h = Harness::new();
        h.network("n1");
        h.backend.set_external_id("neutron-n1", "type", "localnet");

        let report = h.reconciler.reconcile_all().await.unwrap();
        assert!(report.cleared.is_empty());
        assert_eq!(h.backend.transaction_count(), 0);
        assert_eq!(
            h.backend
                .external_ids("neutron-n1")
                .unwrap()
                .get("type")
                .map(String::as_str),
            Some("localnet")
        );
    }
}
