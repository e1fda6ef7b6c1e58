//! Verification helpers for logical switch metadata
//!
//! Provides assertion helpers reading the in-memory store directly, so checks
//! never go through the client under test.

use bgpvpn_common::codec::{self, ExternalIds};
use bgpvpn_common::{Bgpvpn, DriverError};
use bgpvpn_ovnd::{MemoryBackend, MetadataStoreClient};
use thiserror::Error;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Logical switch '{name}' not found")]
    SwitchNotFound { name: String },

    #[error("Expected key '{key}' not found on '{name}'")]
    KeyNotFound { name: String, key: String },

    #[error("Value mismatch for {name}:{key}: expected '{expected}', got '{actual}'")]
    ValueMismatch {
        name: String,
        key: String,
        expected: String,
        actual: String,
    },

    #[error("EVPN metadata mismatch on '{name}': expected {expected:?}, got {actual:?}")]
    EvpnMismatch {
        name: String,
        expected: ExternalIds,
        actual: ExternalIds,
    },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Logical switch metadata verifier
pub struct MetadataVerifier<'a> {
    memory: &'a MemoryBackend,
    client: &'a MetadataStoreClient,
}

impl<'a> MetadataVerifier<'a> {
    pub fn new(memory: &'a MemoryBackend, client: &'a MetadataStoreClient) -> Self {
        Self { memory, client }
    }

    /// Full attribute bag of a network's switch
    pub fn bag(&self, network_id: &str) -> VerifyResult<ExternalIds> {
        let name = self.client.logical_name(network_id);
        self.memory
            .external_ids(&name)
            .ok_or(VerificationError::SwitchNotFound { name })
    }

    /// EVPN subset of a network's switch
    pub fn evpn(&self, network_id: &str) -> VerifyResult<ExternalIds> {
        Ok(codec::evpn_subset(&self.bag(network_id)?))
    }

    /// Verify that a key has a specific value
    pub fn assert_key(&self, network_id: &str, key: &str, expected: &str) -> VerifyResult<()> {
        let name = self.client.logical_name(network_id);
        match self.bag(network_id)?.remove(key) {
            None => Err(VerificationError::KeyNotFound {
                name,
                key: key.to_string(),
            }),
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(VerificationError::ValueMismatch {
                name,
                key: key.to_string(),
                expected: expected.to_string(),
                actual,
            }),
        }
    }

    /// Verify that the EVPN subset equals `expected` exactly
    pub fn assert_evpn(&self, network_id: &str, expected: &ExternalIds) -> VerifyResult<()> {
        let actual = self.evpn(network_id)?;
        if &actual != expected {
            return Err(VerificationError::EvpnMismatch {
                name: self.client.logical_name(network_id),
                expected: expected.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Verify that a network carries exactly the metadata built from `bgpvpn`
    pub fn assert_carries(&self, network_id: &str, bgpvpn: &Bgpvpn) -> VerifyResult<()> {
        self.assert_evpn(network_id, &codec::build(bgpvpn)?)
    }

    /// Verify that a network carries no EVPN key
    pub fn assert_no_evpn(&self, network_id: &str) -> VerifyResult<()> {
        self.assert_evpn(network_id, &ExternalIds::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_verifier() {
        let memory = Arc::new(MemoryBackend::new());
        let client = MetadataStoreClient::new(memory.clone());
        memory.add_logical_switch("neutron-n1");
        memory.set_external_id("neutron-n1", "vni", "10");
        memory.set_external_id("neutron-n1", "neutron:network_name", "x");

        let verifier = MetadataVerifier::new(&memory, &client);
        verifier.assert_key("n1", "vni", "10").unwrap();
        assert!(matches!(
            verifier.assert_key("n1", "vni", "11"),
            Err(VerificationError::ValueMismatch { .. })
        ));
        assert!(matches!(
            verifier.assert_key("n1", "type", "l3"),
            Err(VerificationError::KeyNotFound { .. })
        ));
        assert!(verifier.assert_no_evpn("n1").is_err());
        assert!(matches!(
            verifier.bag("n2"),
            Err(VerificationError::SwitchNotFound { .. })
        ));
        assert_eq!(verifier.evpn("n1").unwrap().len(), 1);
    }
}
