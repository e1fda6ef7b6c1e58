//! Integration test infrastructure for the BGPVPN EVPN driver
//!
//! Provides:
//! - BGPVPN and association fixtures
//! - A scenario builder wiring topology, store and reconciler in memory
//! - Metadata verification helpers
//! - Store wrappers counting or failing transactions

pub mod fakes;
pub mod fixtures;
mod verification;

pub use fakes::{CountingBackend, FailingBackend};
pub use fixtures::*;
pub use verification::*;
