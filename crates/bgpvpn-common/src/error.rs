//! Error types for the BGPVPN EVPN driver.
//!
//! This module defines the error taxonomy shared by the codec, the metadata
//! store client, the topology facade and the reconciler. All errors implement
//! `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors that can occur while propagating BGPVPN configuration.
#[derive(Debug, Error)]
pub enum DriverError {
    /// BGPVPN type is not handled by this driver.
    #[error("BGPVPN type '{vpn_type}' not supported by driver '{driver}'")]
    UnsupportedType {
        /// Driver name reporting the error.
        driver: String,
        /// The rejected type string.
        vpn_type: String,
    },

    /// A required BGPVPN attribute is absent.
    #[error("Driver '{driver}' requires attribute '{attribute}' to be specified")]
    MissingRequiredAttribute {
        /// Driver name reporting the error.
        driver: String,
        /// The missing attribute.
        attribute: String,
    },

    /// An attribute is present but outside its accepted domain.
    #[error("Invalid value for attribute '{attribute}': {message}")]
    InvalidAttribute {
        /// The offending attribute.
        attribute: String,
        /// Error message.
        message: String,
    },

    /// Association kind is not compatible with the BGPVPN type.
    #[error("{association} associations require an L3 BGPVPN (BGPVPN {bgpvpn_id} is '{vpn_type}')")]
    InvalidAssociationType {
        /// Association kind (e.g. "router").
        association: String,
        /// The BGPVPN being associated.
        bgpvpn_id: String,
        /// The BGPVPN type found.
        vpn_type: String,
    },

    /// The metadata object backing a topology object does not exist (yet).
    #[error("Metadata object '{logical_name}' not found")]
    TargetObjectNotFound {
        /// Logical name that was looked up.
        logical_name: String,
    },

    /// The atomic metadata transaction aborted.
    #[error("Metadata transaction on '{logical_name}' failed: {message}")]
    StoreTransaction {
        /// Logical name of the target object.
        logical_name: String,
        /// Error message.
        message: String,
    },

    /// Persisted metadata cannot be decoded.
    #[error("Malformed metadata value for key '{key}': {message}")]
    MalformedMetadata {
        /// The metadata key holding the bad value.
        key: String,
        /// Error message.
        message: String,
    },

    /// A BGPVPN referenced by an association does not exist.
    #[error("BGPVPN '{id}' not found")]
    BgpvpnNotFound {
        /// BGPVPN id.
        id: String,
    },

    /// Topology query failed.
    #[error("Topology query failed: {operation}: {message}")]
    Topology {
        /// The query that failed (e.g. "list_ports").
        operation: String,
        /// Error message.
        message: String,
    },

    /// Configuration file or command line error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    /// Creates an unsupported type error.
    pub fn unsupported_type(driver: impl Into<String>, vpn_type: impl Into<String>) -> Self {
        Self::UnsupportedType {
            driver: driver.into(),
            vpn_type: vpn_type.into(),
        }
    }

    /// Creates a missing attribute error.
    pub fn missing_attribute(driver: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingRequiredAttribute {
            driver: driver.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates an invalid attribute error.
    pub fn invalid_attribute(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid association type error.
    pub fn invalid_association_type(
        association: impl Into<String>,
        bgpvpn_id: impl Into<String>,
        vpn_type: impl Into<String>,
    ) -> Self {
        Self::InvalidAssociationType {
            association: association.into(),
            bgpvpn_id: bgpvpn_id.into(),
            vpn_type: vpn_type.into(),
        }
    }

    /// Creates a target object not found error.
    pub fn target_not_found(logical_name: impl Into<String>) -> Self {
        Self::TargetObjectNotFound {
            logical_name: logical_name.into(),
        }
    }

    /// Creates a store transaction error.
    pub fn store_transaction(logical_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreTransaction {
            logical_name: logical_name.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed metadata error.
    pub fn malformed(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a BGPVPN not found error.
    pub fn bgpvpn_not_found(id: impl Into<String>) -> Self {
        Self::BgpvpnNotFound { id: id.into() }
    }

    /// Creates a topology query error.
    pub fn topology(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Topology {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error is raised by precommit validation and
    /// must abort the enclosing resource mutation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DriverError::UnsupportedType { .. }
                | DriverError::MissingRequiredAttribute { .. }
                | DriverError::InvalidAttribute { .. }
                | DriverError::InvalidAssociationType { .. }
        )
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::StoreTransaction { .. } | DriverError::Topology { .. }
        )
    }
}
