//! Metadata backend wrappers for observing and breaking the store

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bgpvpn_common::{DriverError, DriverResult};
use bgpvpn_ovnd::store::{ExternalIdsOp, LogicalSwitch, MetadataBackend};
use parking_lot::Mutex;

/// Records every transaction before forwarding it
pub struct CountingBackend {
    inner: Arc<dyn MetadataBackend>,
    transactions: Mutex<Vec<(String, Vec<ExternalIdsOp>)>>,
}

impl CountingBackend {
    pub fn new(inner: Arc<dyn MetadataBackend>) -> Self {
        Self {
            inner,
            transactions: Mutex::new(Vec::new()),
        }
    }

    /// Number of transactions attempted
    pub fn write_calls(&self) -> usize {
        self.transactions.lock().len()
    }

    /// Attempted transactions as (logical name, ops)
    pub fn transactions(&self) -> Vec<(String, Vec<ExternalIdsOp>)> {
        self.transactions.lock().clone()
    }

    pub fn reset(&self) {
        self.transactions.lock().clear();
    }
}

#[async_trait]
impl MetadataBackend for CountingBackend {
    async fn lookup(&self, logical_name: &str) -> DriverResult<Option<LogicalSwitch>> {
        self.inner.lookup(logical_name).await
    }

    async fn transact(&self, row: &LogicalSwitch, ops: &[ExternalIdsOp]) -> DriverResult<()> {
        self.transactions
            .lock()
            .push((row.name.clone(), ops.to_vec()));
        self.inner.transact(row, ops).await
    }

    async fn list_rows(&self) -> DriverResult<Vec<LogicalSwitch>> {
        self.inner.list_rows().await
    }
}

/// Aborts transactions on demand
pub struct FailingBackend {
    inner: Arc<dyn MetadataBackend>,
    fail_all: AtomicBool,
    fail_next: AtomicUsize,
}

impl FailingBackend {
    pub fn new(inner: Arc<dyn MetadataBackend>) -> Self {
        Self {
            inner,
            fail_all: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
        }
    }

    /// Abort every transaction until cleared
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Abort the next `count` transactions
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    fn should_fail(&self) -> bool {
        if self.fail_all.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MetadataBackend for FailingBackend {
    async fn lookup(&self, logical_name: &str) -> DriverResult<Option<LogicalSwitch>> {
        self.inner.lookup(logical_name).await
    }

    async fn transact(&self, row: &LogicalSwitch, ops: &[ExternalIdsOp]) -> DriverResult<()> {
        if self.should_fail() {
            return Err(DriverError::store_transaction(
                &row.name,
                "injected transaction abort",
            ));
        }
        self.inner.transact(row, ops).await
    }

    async fn list_rows(&self) -> DriverResult<Vec<LogicalSwitch>> {
        self.inner.list_rows().await
    }
}
