//! Metadata store client.
//!
//! Wraps the external key/value store holding logical switches. Every mutation
//! of a logical switch's `external_ids` is one atomic transaction on one row:
//! either every key operation is applied or none is.
//!
//! The store is reached through the [`MetadataBackend`] trait so the driver can
//! run against Redis ([`RedisBackend`]) or an in-process map ([`MemoryBackend`]).

mod memory;
mod redis;

pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

use std::sync::Arc;

use async_trait::async_trait;
use bgpvpn_common::codec::{self, EvpnConfig, ExternalIds};
use bgpvpn_common::{Bgpvpn, DriverError, DriverResult};
use tracing::{debug, error, info, instrument, warn};

use crate::tables::LOGICAL_SWITCH_PREFIX;

/// A logical switch row as seen at lookup time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalSwitch {
    pub uuid: String,
    pub name: String,
    pub external_ids: ExternalIds,
}

/// One key operation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalIdsOp {
    /// Merge `key = value` into the bag, leaving other keys untouched
    Set { key: String, value: String },
    /// Remove `key` if present
    Remove { key: String },
}

impl ExternalIdsOp {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self::Remove { key: key.into() }
    }
}

/// Transaction interface of the external metadata store.
#[async_trait]
pub trait MetadataBackend: Send + Sync {
    /// Looks up a row by logical name.
    async fn lookup(&self, logical_name: &str) -> DriverResult<Option<LogicalSwitch>>;

    /// Applies `ops` to the row's external_ids in one atomic transaction.
    ///
    /// Fails with [`DriverError::StoreTransaction`] if the transaction aborts,
    /// including when the row disappeared since lookup.
    async fn transact(&self, row: &LogicalSwitch, ops: &[ExternalIdsOp]) -> DriverResult<()>;

    /// Lists every row.
    async fn list_rows(&self) -> DriverResult<Vec<LogicalSwitch>>;
}

/// Client addressing logical switches by the network they back.
#[derive(Clone)]
pub struct MetadataStoreClient {
    backend: Arc<dyn MetadataBackend>,
    name_prefix: String,
}

impl MetadataStoreClient {
    pub fn new(backend: Arc<dyn MetadataBackend>) -> Self {
        Self {
            backend,
            name_prefix: LOGICAL_SWITCH_PREFIX.to_string(),
        }
    }

    /// Overrides the logical switch name prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Logical switch name of a network
    pub fn logical_name(&self, network_id: &str) -> String {
        format!("{}{}", self.name_prefix, network_id)
    }

    /// Network id of a logical switch name, if it follows the naming scheme
    pub fn network_id<'a>(&self, logical_name: &'a str) -> Option<&'a str> {
        logical_name.strip_prefix(self.name_prefix.as_str())
    }

    /// Looks up a logical switch; `None` if it does not exist (yet).
    pub async fn get(&self, logical_name: &str) -> DriverResult<Option<LogicalSwitch>> {
        self.backend.lookup(logical_name).await
    }

    /// Merges every key of `ids` into the switch in one transaction.
    pub async fn write(&self, ls: &LogicalSwitch, ids: &ExternalIds) -> DriverResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ops: Vec<_> = ids
            .iter()
            .map(|(k, v)| ExternalIdsOp::set(k.as_str(), v.as_str()))
            .collect();
        self.commit(ls, &ops).await
    }

    /// Removes every key of `keys` that is present, in one transaction.
    pub async fn clear(&self, ls: &LogicalSwitch, keys: &[&str]) -> DriverResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let ops: Vec<_> = keys.iter().map(|k| ExternalIdsOp::remove(*k)).collect();
        self.commit(ls, &ops).await
    }

    /// Merges `ids` and removes every other EVPN key, in one transaction.
    ///
    /// After success the EVPN subset of the bag equals `ids`.
    pub async fn replace(&self, ls: &LogicalSwitch, ids: &ExternalIds) -> DriverResult<()> {
        let ops: Vec<_> = ids
            .iter()
            .map(|(k, v)| ExternalIdsOp::set(k.as_str(), v.as_str()))
            .chain(
                codec::key_set()
                    .iter()
                    .filter(|k| !ids.contains_key(**k))
                    .map(|k| ExternalIdsOp::remove(*k)),
            )
            .collect();
        self.commit(ls, &ops).await
    }

    /// Returns the current attribute bag of the switch, EVPN and unrelated keys.
    pub async fn read(&self, ls: &LogicalSwitch) -> DriverResult<ExternalIds> {
        self.backend
            .lookup(&ls.name)
            .await?
            .map(|row| row.external_ids)
            .ok_or_else(|| DriverError::target_not_found(&ls.name))
    }

    async fn commit(&self, ls: &LogicalSwitch, ops: &[ExternalIdsOp]) -> DriverResult<()> {
        debug!(logical_switch = %ls.name, ops = ops.len(), "Committing external_ids transaction");
        self.backend.transact(ls, ops).await.inspect_err(|e| {
            error!(logical_switch = %ls.name, error = %e, "external_ids transaction failed");
        })
    }

    /// Writes the EVPN configuration of `bgpvpn` onto a network's switch.
    ///
    /// Returns `Ok(false)` if the switch does not exist yet.
    #[instrument(skip(self, bgpvpn), fields(bgpvpn_id = %bgpvpn.id))]
    pub async fn apply_evpn_config(&self, network_id: &str, bgpvpn: &Bgpvpn) -> DriverResult<bool> {
        let name = self.logical_name(network_id);
        let Some(ls) = self.get(&name).await? else {
            warn!(
                network_id,
                logical_switch = %name,
                "Cannot update EVPN config: logical switch not found"
            );
            return Ok(false);
        };

        let ids = codec::build(bgpvpn)?;
        info!(
            network_id,
            logical_switch = %ls.name,
            vpn_type = %bgpvpn.vpn_type,
            vni = ?bgpvpn.vni,
            "Updating EVPN config"
        );
        self.replace(&ls, &ids).await?;
        Ok(true)
    }

    /// Removes all EVPN keys from a network's switch.
    ///
    /// Returns `Ok(false)` if the switch does not exist.
    #[instrument(skip(self))]
    pub async fn clear_evpn_config(&self, network_id: &str) -> DriverResult<bool> {
        let name = self.logical_name(network_id);
        let Some(ls) = self.get(&name).await? else {
            warn!(
                network_id,
                logical_switch = %name,
                "Cannot clear EVPN config: logical switch not found"
            );
            return Ok(false);
        };

        info!(network_id, logical_switch = %ls.name, "Clearing EVPN config");
        self.clear(&ls, codec::key_set()).await?;
        Ok(true)
    }

    /// Reads and decodes a network's EVPN configuration.
    pub async fn evpn_config(&self, network_id: &str) -> DriverResult<Option<EvpnConfig>> {
        match self.get(&self.logical_name(network_id)).await? {
            Some(ls) => codec::parse(&ls.external_ids),
            None => Ok(None),
        }
    }

    /// Network ids of every switch currently carrying EVPN configuration (a VNI).
    pub async fn evpn_networks(&self) -> DriverResult<Vec<String>> {
        Ok(self
            .backend
            .list_rows()
            .await?
            .iter()
            .filter(|row| codec::is_configured(&row.external_ids))
            .filter_map(|row| self.network_id(&row.name).map(str::to_string))
            .collect())
    }
}
