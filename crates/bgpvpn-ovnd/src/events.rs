//! Typed lifecycle events and the bus dispatching them.
//!
//! Handlers are registered explicitly at process start. The bus hands each
//! event to every handler in registration order and stops at the first
//! failure, which is returned to the caller so a precommit error can abort
//! the triggering mutation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bgpvpn_common::{
    Bgpvpn, DriverResult, NetworkAssociation, Port, PortAssociation, RouterAssociation,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::reconciler::AssociationReconciler;

/// Hook phase of a lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Inside the resource transaction; a failure aborts it
    Precommit,
    /// After the resource transaction committed
    Postcommit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Precommit => f.write_str("precommit"),
            Phase::Postcommit => f.write_str("postcommit"),
        }
    }
}

/// Inbound BGPVPN, association and topology events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    BgpvpnCreate {
        phase: Phase,
        bgpvpn: Bgpvpn,
    },
    BgpvpnUpdate {
        phase: Phase,
        old: Bgpvpn,
        new: Bgpvpn,
    },
    BgpvpnDelete {
        phase: Phase,
        bgpvpn: Bgpvpn,
    },
    NetworkAssociationCreate {
        phase: Phase,
        association: NetworkAssociation,
    },
    NetworkAssociationDelete {
        phase: Phase,
        association: NetworkAssociation,
    },
    RouterAssociationCreate {
        phase: Phase,
        association: RouterAssociation,
    },
    RouterAssociationUpdate {
        phase: Phase,
        old: RouterAssociation,
        new: RouterAssociation,
    },
    RouterAssociationDelete {
        phase: Phase,
        association: RouterAssociation,
    },
    PortAssociationCreate {
        phase: Phase,
        association: PortAssociation,
    },
    PortAssociationUpdate {
        phase: Phase,
        old: PortAssociation,
        new: PortAssociation,
    },
    PortAssociationDelete {
        phase: Phase,
        association: PortAssociation,
    },
    /// A router gained an interface on a network
    RouterInterfaceCreated { router_id: String, port: Port },
    /// A router lost its interface on a subnet
    RouterInterfaceDeleted { router_id: String, subnet_id: String },
}

impl LifecycleEvent {
    /// Event name as used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BgpvpnCreate { .. } => "bgpvpn_create",
            Self::BgpvpnUpdate { .. } => "bgpvpn_update",
            Self::BgpvpnDelete { .. } => "bgpvpn_delete",
            Self::NetworkAssociationCreate { .. } => "network_association_create",
            Self::NetworkAssociationDelete { .. } => "network_association_delete",
            Self::RouterAssociationCreate { .. } => "router_association_create",
            Self::RouterAssociationUpdate { .. } => "router_association_update",
            Self::RouterAssociationDelete { .. } => "router_association_delete",
            Self::PortAssociationCreate { .. } => "port_association_create",
            Self::PortAssociationUpdate { .. } => "port_association_update",
            Self::PortAssociationDelete { .. } => "port_association_delete",
            Self::RouterInterfaceCreated { .. } => "router_interface_created",
            Self::RouterInterfaceDeleted { .. } => "router_interface_deleted",
        }
    }

    /// Topology events are delivered after the change, so they count as postcommit
    pub fn phase(&self) -> Phase {
        match self {
            Self::BgpvpnCreate { phase, .. }
            | Self::BgpvpnUpdate { phase, .. }
            | Self::BgpvpnDelete { phase, .. }
            | Self::NetworkAssociationCreate { phase, .. }
            | Self::NetworkAssociationDelete { phase, .. }
            | Self::RouterAssociationCreate { phase, .. }
            | Self::RouterAssociationUpdate { phase, .. }
            | Self::RouterAssociationDelete { phase, .. }
            | Self::PortAssociationCreate { phase, .. }
            | Self::PortAssociationUpdate { phase, .. }
            | Self::PortAssociationDelete { phase, .. } => *phase,
            Self::RouterInterfaceCreated { .. } | Self::RouterInterfaceDeleted { .. } => {
                Phase::Postcommit
            }
        }
    }
}

/// Receiver of lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name, for logging
    fn name(&self) -> &str;

    async fn handle(&self, event: &LifecycleEvent) -> DriverResult<()>;
}

#[async_trait]
impl EventHandler for AssociationReconciler {
    fn name(&self) -> &str {
        "bgpvpn-ovn"
    }

    async fn handle(&self, event: &LifecycleEvent) -> DriverResult<()> {
        use LifecycleEvent::*;
        use Phase::*;

        match event {
            BgpvpnCreate { phase: Precommit, bgpvpn } => self.create_bgpvpn_precommit(bgpvpn).await,
            BgpvpnCreate { phase: Postcommit, bgpvpn } => {
                self.create_bgpvpn_postcommit(bgpvpn).await
            }
            BgpvpnUpdate { phase: Precommit, old, new } => {
                self.update_bgpvpn_precommit(old, new).await
            }
            BgpvpnUpdate { phase: Postcommit, old, new } => {
                self.update_bgpvpn_postcommit(old, new).await
            }
            BgpvpnDelete { phase: Precommit, bgpvpn } => self.delete_bgpvpn_precommit(bgpvpn).await,
            BgpvpnDelete { phase: Postcommit, bgpvpn } => {
                self.delete_bgpvpn_postcommit(bgpvpn).await
            }
            NetworkAssociationCreate { phase: Precommit, association } => {
                self.create_net_assoc_precommit(association).await
            }
            NetworkAssociationCreate { phase: Postcommit, association } => {
                self.create_net_assoc_postcommit(association).await
            }
            NetworkAssociationDelete { phase: Precommit, association } => {
                self.delete_net_assoc_precommit(association).await
            }
            NetworkAssociationDelete { phase: Postcommit, association } => {
                self.delete_net_assoc_postcommit(association).await
            }
            RouterAssociationCreate { phase: Precommit, association } => {
                self.create_router_assoc_precommit(association).await
            }
            RouterAssociationCreate { phase: Postcommit, association } => {
                self.create_router_assoc_postcommit(association).await
            }
            RouterAssociationUpdate { phase: Precommit, .. } => Ok(()),
            RouterAssociationUpdate { phase: Postcommit, old, new } => {
                self.update_router_assoc_postcommit(old, new).await
            }
            RouterAssociationDelete { phase: Precommit, association } => {
                self.delete_router_assoc_precommit(association).await
            }
            RouterAssociationDelete { phase: Postcommit, association } => {
                self.delete_router_assoc_postcommit(association).await
            }
            PortAssociationCreate { phase: Postcommit, association } => {
                self.create_port_assoc_postcommit(association).await
            }
            PortAssociationUpdate { phase: Postcommit, old, new } => {
                self.update_port_assoc_postcommit(old, new).await
            }
            PortAssociationDelete { phase: Postcommit, association } => {
                self.delete_port_assoc_postcommit(association).await
            }
            PortAssociationCreate { phase: Precommit, .. }
            | PortAssociationUpdate { phase: Precommit, .. }
            | PortAssociationDelete { phase: Precommit, .. } => Ok(()),
            RouterInterfaceCreated { router_id, port } => {
                self.on_router_interface_created(router_id, port).await
            }
            RouterInterfaceDeleted { router_id, subnet_id } => {
                self.on_router_interface_deleted(router_id, subnet_id).await
            }
        }
    }
}

/// Fans lifecycle events out to registered handlers.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler; handlers run in registration order
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        info!("Registered event handler {}", handler.name());
        self.handlers.push(handler);
    }

    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Delivers `event` to every handler, returning the first error.
    pub async fn dispatch(&self, event: &LifecycleEvent) -> DriverResult<()> {
        debug!("Dispatching {} ({})", event.kind(), event.phase());
        for handler in &self.handlers {
            if let Err(e) = handler.handle(event).await {
                error!(
                    "Handler {} failed on {} ({}): {}",
                    handler.name(),
                    event.kind(),
                    event.phase(),
                    e
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Dispatches events from a channel until it closes.
    ///
    /// Returns the number of events that failed.
    pub async fn run(&self, mut events: mpsc::Receiver<LifecycleEvent>) -> usize {
        let mut failed = 0;
        while let Some(event) = events.recv().await {
            if self.dispatch(&event).await.is_err() {
                failed += 1;
            }
        }
        failed
    }
}
