//! In-process metadata backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bgpvpn_common::codec::ExternalIds;
use bgpvpn_common::{DriverError, DriverResult};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{ExternalIdsOp, LogicalSwitch, MetadataBackend};

/// Metadata backend keeping logical switches in a map.
///
/// Transactions run under the write lock, so every transaction is atomic with
/// respect to all other operations on the backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: RwLock<BTreeMap<String, LogicalSwitch>>,
    transactions: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty logical switch and returns its uuid.
    ///
    /// An existing switch of that name is kept as is.
    pub fn add_logical_switch(&self, name: &str) -> String {
        self.rows
            .write()
            .entry(name.to_string())
            .or_insert_with(|| LogicalSwitch {
                uuid: Uuid::new_v4().to_string(),
                name: name.to_string(),
                external_ids: ExternalIds::new(),
            })
            .uuid
            .clone()
    }

    /// Sets a key outside of any driver transaction
    pub fn set_external_id(&self, name: &str, key: &str, value: &str) {
        if let Some(row) = self.rows.write().get_mut(name) {
            row.external_ids.insert(key.to_string(), value.to_string());
        }
    }

    pub fn remove_logical_switch(&self, name: &str) -> bool {
        self.rows.write().remove(name).is_some()
    }

    /// Current bag of a switch, `None` if it does not exist
    pub fn external_ids(&self, name: &str) -> Option<ExternalIds> {
        self.rows.read().get(name).map(|row| row.external_ids.clone())
    }

    /// Number of committed transactions
    pub fn transaction_count(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataBackend for MemoryBackend {
    async fn lookup(&self, logical_name: &str) -> DriverResult<Option<LogicalSwitch>> {
        Ok(self.rows.read().get(logical_name).cloned())
    }

    async fn transact(&self, row: &LogicalSwitch, ops: &[ExternalIdsOp]) -> DriverResult<()> {
        let mut rows = self.rows.write();
        let current = rows
            .get_mut(&row.name)
            .filter(|current| current.uuid == row.uuid)
            .ok_or_else(|| DriverError::store_transaction(&row.name, "row no longer exists"))?;

        for op in ops {
            match op {
                ExternalIdsOp::Set { key, value } => {
                    current.external_ids.insert(key.clone(), value.clone());
                }
                ExternalIdsOp::Remove { key } => {
                    current.external_ids.remove(key);
                }
            }
        }
        self.transactions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_rows(&self) -> DriverResult<Vec<LogicalSwitch>> {
        Ok(self.rows.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let backend = MemoryBackend::new();
        let first = backend.add_logical_switch("neutron-n1");
        let second = backend.add_logical_switch("neutron-n1");
        assert_eq!(first, second);
        assert_eq!(backend.list_rows().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transact_applies_in_order() {
        let backend = MemoryBackend::new();
        backend.add_logical_switch("neutron-n1");
        let row = backend.lookup("neutron-n1").await.unwrap().unwrap();

        backend
            .transact(
                &row,
                &[
                    ExternalIdsOp::set("vni", "1"),
                    ExternalIdsOp::remove("vni"),
                    ExternalIdsOp::set("type", "l2"),
                ],
            )
            .await
            .unwrap();

        let ids = backend.external_ids("neutron-n1").unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids["type"], "l2");
        assert_eq!(backend.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_transact_on_recreated_row_fails() {
        let backend = MemoryBackend::new();
        backend.add_logical_switch("neutron-n1");
        let stale = backend.lookup("neutron-n1").await.unwrap().unwrap();
        backend.remove_logical_switch("neutron-n1");
        backend.add_logical_switch("neutron-n1");

        let err = backend
            .transact(&stale, &[ExternalIdsOp::set("vni", "1")])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(backend.external_ids("neutron-n1").unwrap().is_empty());
    }
}
